// Target Domain Model
// Immutable once a run begins: host, the service ports to verify,
// and optionally pre-supplied device credentials.

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Device credentials for the authentication exchange.
///
/// The password is intentionally excluded from `Debug` output so that
/// credentials never leak into logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A provisioning target: host address plus the set of service ports that
/// must come up for the run to count as successful.
#[derive(Debug, Clone)]
pub struct Target {
    host: String,
    service_ports: Vec<u16>,
    credentials: Option<Credentials>,
}

impl Target {
    /// Create a target. Ports are deduplicated and stored in ascending order
    /// so downstream reporting is deterministic.
    pub fn new(
        host: impl Into<String>,
        service_ports: impl IntoIterator<Item = u16>,
        credentials: Option<Credentials>,
    ) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(DomainError::InvalidTarget("host must not be empty".into()));
        }

        let mut ports: Vec<u16> = service_ports.into_iter().collect();
        ports.sort_unstable();
        ports.dedup();
        if ports.is_empty() {
            return Err(DomainError::InvalidTarget(
                "at least one service port is required".into(),
            ));
        }

        Ok(Self {
            host,
            service_ports: ports,
            credentials,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn service_ports(&self) -> &[u16] {
        &self.service_ports
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Identity under which credentials for this target are cached:
    /// `user@host` when an account name is known, bare host otherwise.
    pub fn cache_key(&self) -> String {
        match &self.credentials {
            Some(creds) => format!("{}@{}", creds.username, self.host),
            None => self.host.clone(),
        }
    }
}
