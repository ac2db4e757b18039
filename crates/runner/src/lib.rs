//! gatesync runner: keeps the IR planes and status stores in step with the
//! provider's whole-state snapshots.
//!
//! Snapshots arrive through a [`gatesync_store::Watchable`] subscription and
//! are handled one at a time. Each generation is translated bundle by bundle;
//! valid IR entries are published to both planes, status opinions are written
//! to the per-kind stores, and everything that was present before the
//! generation but not seen during it is deleted.

#![forbid(unsafe_code)]

pub mod bootstrap;
pub mod config;
pub mod diff;
pub mod reconcile;
pub mod runner;

pub use bootstrap::{BootstrapError, CacheSlot};
pub use config::{ConfigError, ServerConfig};
pub use reconcile::{policy_status_from_unstructured, GenerationSummary, Reconciler, StatusesToDelete};
pub use runner::{Runner, RunnerConfig, RunnerTasks, RUNNER_NAME};
