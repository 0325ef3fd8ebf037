// Credential Store Port
// Persisted token cache shared across runs. Corruption is recovered at the
// store boundary; callers treat errors as a degraded cache, never a run
// failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A cached authentication token for one target identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCredential {
    pub token: String,
    /// Issue time, epoch ms.
    pub issued_at: i64,
    /// Lifetime in ms. Valid iff `now < issued_at + ttl_ms`.
    pub ttl_ms: i64,
}

impl CachedCredential {
    pub fn new(token: impl Into<String>, issued_at: i64, ttl_ms: i64) -> Self {
        Self {
            token: token.into(),
            issued_at,
            ttl_ms,
        }
    }

    pub fn is_valid_at(&self, now_millis: i64) -> bool {
        now_millis < self.issued_at.saturating_add(self.ttl_ms)
    }
}

/// Store errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache store unreadable: {0}")]
    Unreadable(String),

    #[error("Cache write failed: {0}")]
    WriteFailed(String),
}

/// Credential Store trait
///
/// Keys are target identities (`Target::cache_key`). Writes to the same key
/// are serialized by the implementation; disjoint keys never interfere.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch the credential for a target identity. Returns `None` when
    /// absent or expired.
    async fn get(&self, key: &str) -> Result<Option<CachedCredential>, CacheError>;

    /// Insert or replace the credential for a target identity.
    async fn put(&self, key: &str, credential: CachedCredential) -> Result<(), CacheError>;

    /// Drop the credential for a target identity, if any.
    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::port::time_provider::TimeProvider;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// In-memory store for pipeline tests. Honors expiry via the injected
    /// time provider, like the production file store.
    pub struct MemoryCredentialStore {
        entries: Mutex<HashMap<String, CachedCredential>>,
        time_provider: Arc<dyn TimeProvider>,
    }

    impl MemoryCredentialStore {
        pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
                time_provider,
            }
        }

        pub fn with_entry(self, key: impl Into<String>, credential: CachedCredential) -> Self {
            self.entries
                .lock()
                .unwrap()
                .insert(key.into(), credential);
            self
        }
    }

    #[async_trait]
    impl CredentialStore for MemoryCredentialStore {
        async fn get(&self, key: &str) -> Result<Option<CachedCredential>, CacheError> {
            let now = self.time_provider.now_millis();
            let entries = self.entries.lock().unwrap();
            Ok(entries
                .get(key)
                .filter(|c| c.is_valid_at(now))
                .cloned())
        }

        async fn put(&self, key: &str, credential: CachedCredential) -> Result<(), CacheError> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), credential);
            Ok(())
        }

        async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
    }

    /// Store whose every operation fails, for degraded-cache paths.
    pub struct BrokenCredentialStore;

    #[async_trait]
    impl CredentialStore for BrokenCredentialStore {
        async fn get(&self, _key: &str) -> Result<Option<CachedCredential>, CacheError> {
            Err(CacheError::Unreadable("mock: store offline".into()))
        }

        async fn put(&self, _key: &str, _credential: CachedCredential) -> Result<(), CacheError> {
            Err(CacheError::WriteFailed("mock: store offline".into()))
        }

        async fn invalidate(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::WriteFailed("mock: store offline".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_window() {
        let credential = CachedCredential::new("tok", 1_000, 500);
        assert!(credential.is_valid_at(1_000));
        assert!(credential.is_valid_at(1_499));
        assert!(!credential.is_valid_at(1_500));
        assert!(!credential.is_valid_at(2_000));
    }

    #[test]
    fn test_validity_saturates_on_huge_ttl() {
        let credential = CachedCredential::new("tok", i64::MAX - 10, i64::MAX);
        assert!(credential.is_valid_at(0));
    }
}
