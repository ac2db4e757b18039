//! Capabilities acquired once at startup for the wasm artifact cache: the
//! path salt, the mutual-TLS server configuration and the cache directory.
//!
//! Failure here only disables the cache; reconciliation keeps running and
//! artifact references stay unresolved.

use std::path::PathBuf;

use tracing::{error, info};

use crate::config::ServerConfig;

pub mod cache;
pub mod hmac;
pub mod tls;

pub use cache::{CacheHandle, CacheSlot, FileArtifactCache};
pub use hmac::{hmac_salt, salt_from_secret};
pub use tls::load_server_tls;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("kube client: {0}")]
    Client(#[source] kube::Error),
    #[error("get secret {namespace}/{name}: {source}")]
    Secret {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },
    #[error("secret {namespace}/{name} has no non-empty key {key:?}")]
    MissingSecretKey { namespace: String, name: String, key: String },
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("tls: {0}")]
    Tls(String),
    #[error("create cache dir {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Acquire every cache capability and install it into `slot`.
pub async fn acquire_artifact_cache(cfg: &ServerConfig, slot: &CacheSlot) -> Result<(), BootstrapError> {
    let ac = &cfg.artifact_cache;
    let client = kube::Client::try_default().await.map_err(BootstrapError::Client)?;
    let salt = hmac_salt(client, &cfg.namespace, &ac.hmac_secret_name, &ac.hmac_secret_key).await?;
    let server_tls = load_server_tls(&ac.tls)?;
    let artifacts = FileArtifactCache::create(&ac.cache_dir, salt)?;
    info!(dir = %artifacts.dir().display(), "artifact cache ready");
    slot.install(CacheHandle::new(artifacts, server_tls));
    Ok(())
}

/// Like [`acquire_artifact_cache`], logging instead of returning the failure.
pub async fn start_artifact_cache(cfg: ServerConfig, slot: CacheSlot) {
    if let Err(e) = acquire_artifact_cache(&cfg, &slot).await {
        error!(error = %e, "failed to start artifact cache; wasm references stay unresolved");
    }
}
