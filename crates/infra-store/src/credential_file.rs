// JSON File Credential Store
// One JSON object on disk mapping target identity -> cached credential.
// Corruption policy: a missing or unreadable file degrades to an empty
// cache with a warning; individually malformed entries are skipped so one
// bad record cannot poison the rest.

use async_trait::async_trait;
use provisor_core::port::credential_store::{CacheError, CachedCredential, CredentialStore};
use provisor_core::port::time_provider::TimeProvider;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct JsonFileCredentialStore {
    path: PathBuf,
    time_provider: Arc<dyn TimeProvider>,
    // Guards both the in-memory map and the file write; writes to the same
    // key are thereby serialized while disjoint-key readers just queue
    // briefly on the map.
    entries: Mutex<HashMap<String, CachedCredential>>,
}

impl JsonFileCredentialStore {
    /// Open a store at `path`. Never fails: any unreadable state is
    /// reported and treated as an empty cache.
    pub async fn open(path: impl Into<PathBuf>, time_provider: Arc<dyn TimeProvider>) -> Self {
        let path = path.into();
        let entries = load_entries(&path).await;
        Self {
            path,
            time_provider,
            entries: Mutex::new(entries),
        }
    }

    async fn persist(&self, entries: &HashMap<String, CachedCredential>) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| CacheError::WriteFailed(e.to_string()))?;
            }
        }
        let serialized = serde_json::to_vec_pretty(entries)
            .map_err(|e| CacheError::WriteFailed(e.to_string()))?;

        // Write-then-rename so a crash mid-write never leaves a truncated
        // cache file behind.
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &serialized)
            .await
            .map_err(|e| CacheError::WriteFailed(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| CacheError::WriteFailed(e.to_string()))
    }
}

async fn load_entries(path: &Path) -> HashMap<String, CachedCredential> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No credential cache file, starting empty");
            return HashMap::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Credential cache unreadable, starting empty");
            return HashMap::new();
        }
    };

    let values: HashMap<String, serde_json::Value> = match serde_json::from_slice(&raw) {
        Ok(values) => values,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Credential cache malformed, starting empty");
            return HashMap::new();
        }
    };

    let mut entries = HashMap::new();
    for (key, value) in values {
        match serde_json::from_value::<CachedCredential>(value) {
            Ok(credential) => {
                entries.insert(key, credential);
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping malformed credential cache entry");
            }
        }
    }
    entries
}

#[async_trait]
impl CredentialStore for JsonFileCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<CachedCredential>, CacheError> {
        let now = self.time_provider.now_millis();
        let entries = self.entries.lock().await;
        Ok(entries.get(key).filter(|c| c.is_valid_at(now)).cloned())
    }

    async fn put(&self, key: &str, credential: CachedCredential) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), credential);
        self.persist(&entries).await
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.persist(&entries).await
    }
}
