use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use gatesync_translate::ArtifactResolver;
use sha2::{Digest, Sha256};

use super::BootstrapError;

/// Wasm modules on local disk under salted, unguessable file names.
pub struct FileArtifactCache {
    dir: PathBuf,
    salt: Vec<u8>,
}

impl fmt::Debug for FileArtifactCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileArtifactCache").field("dir", &self.dir).finish_non_exhaustive()
    }
}

impl FileArtifactCache {
    /// Open the cache at `dir`, creating the directory when missing.
    pub fn create(dir: impl Into<PathBuf>, salt: Vec<u8>) -> Result<Self, BootstrapError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| BootstrapError::CacheDir { path: dir.clone(), source })?;
        Ok(Self { dir, salt })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the module for `url` lives: hex sha256 of salt and url.
    pub fn path_for(&self, url: &str) -> PathBuf {
        let mut h = Sha256::new();
        h.update(&self.salt);
        h.update(url.as_bytes());
        self.dir.join(format!("{}.wasm", hex::encode(h.finalize())))
    }
}

impl ArtifactResolver for FileArtifactCache {
    fn resolve(&self, url: &str) -> Option<String> {
        let path = self.path_for(url);
        path.is_file().then(|| path.to_string_lossy().into_owned())
    }
}

/// Everything the artifact cache needs once bootstrap succeeded.
pub struct CacheHandle {
    pub artifacts: Arc<FileArtifactCache>,
    pub server_tls: Arc<rustls::ServerConfig>,
}

impl CacheHandle {
    pub fn new(artifacts: FileArtifactCache, server_tls: Arc<rustls::ServerConfig>) -> Self {
        Self { artifacts: Arc::new(artifacts), server_tls }
    }
}

/// Shared, initially empty slot the reconciler reads the cache through.
#[derive(Clone, Default)]
pub struct CacheSlot {
    inner: Arc<ArcSwapOption<CacheHandle>>,
}

impl CacheSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, handle: CacheHandle) {
        self.inner.store(Some(Arc::new(handle)));
    }

    pub fn current(&self) -> Option<Arc<CacheHandle>> {
        self.inner.load_full()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.load().is_some()
    }

    /// Resolver for the translator, if the cache is up.
    pub fn resolver(&self) -> Option<Arc<dyn ArtifactResolver>> {
        self.current().map(|h| Arc::clone(&h.artifacts) as Arc<dyn ArtifactResolver>)
    }
}
