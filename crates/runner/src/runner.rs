use std::sync::Arc;

use gatesync_ir::{InfraIr, XdsIr};
use gatesync_store::{handle_subscription, Metadata, ProviderResources, Watchable};
use gatesync_translate::Translator;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bootstrap::{start_artifact_cache, CacheSlot};
use crate::config::ServerConfig;
use crate::reconcile::Reconciler;

pub const RUNNER_NAME: &str = "gateway-api";

/// Stores and collaborators the runner is wired to.
pub struct RunnerConfig {
    pub server: ServerConfig,
    pub provider_resources: Arc<ProviderResources>,
    pub xds_ir: Arc<Watchable<String, XdsIr>>,
    pub infra_ir: Arc<Watchable<String, InfraIr>>,
    pub translator: Arc<dyn Translator>,
    pub cache: CacheSlot,
}

/// Tasks spawned by [`Runner::start`].
pub struct RunnerTasks {
    pub cache: Option<JoinHandle<()>>,
    pub subscription: JoinHandle<()>,
}

impl RunnerTasks {
    pub async fn join(self) {
        if let Some(cache) = self.cache {
            if let Err(e) = cache.await {
                warn!(error = %e, "artifact cache task failed");
            }
        }
        if let Err(e) = self.subscription.await {
            warn!(error = %e, "subscription task failed");
        }
    }
}

/// Turns provider snapshots into IR and status records.
pub struct Runner {
    cfg: RunnerConfig,
    reconciler: Arc<Reconciler>,
}

impl Runner {
    pub fn new(cfg: RunnerConfig) -> Self {
        let reconciler = Arc::new(Reconciler::new(
            RUNNER_NAME,
            Arc::clone(&cfg.provider_resources),
            Arc::clone(&cfg.xds_ir),
            Arc::clone(&cfg.infra_ir),
            Arc::clone(&cfg.translator),
        ));
        Self { cfg, reconciler }
    }

    pub fn name(&self) -> &'static str {
        RUNNER_NAME
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Spawn the cache bootstrap (when enabled) and the subscription loop.
    ///
    /// The subscription is taken before this returns, so snapshots stored
    /// afterwards are never missed.
    pub fn start(&self, cancel: CancellationToken) -> RunnerTasks {
        let cache = self.cfg.server.artifact_cache.enabled.then(|| {
            tokio::spawn(start_artifact_cache(self.cfg.server.clone(), self.cfg.cache.clone()))
        });

        let subscription = self.cfg.provider_resources.gateway_api_resources.subscribe();
        let meta = Metadata::new(RUNNER_NAME, "provider-resources");
        let reconciler = Arc::clone(&self.reconciler);
        let server = self.cfg.server.clone();
        let slot = self.cfg.cache.clone();
        let task = tokio::spawn(async move {
            handle_subscription(meta, subscription, cancel, move |update, errors| {
                reconciler.on_update(update, &server.flags(), slot.resolver(), errors);
            })
            .await;
        });

        info!(runner = RUNNER_NAME, "started");
        RunnerTasks { cache, subscription: task }
    }
}
