// Run Settings
// One immutable value constructed per run and passed explicitly to each
// component. Named presets are factory functions, never process-wide state.

use crate::domain::error::{DomainError, Result};
use std::time::Duration;

/// Timing and resilience knobs for a single run.
///
/// Backoff between probe rounds follows
/// `min(probe_base_delay * 2^round, probe_delay_cap)` with ±20% jitter.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Overall budget for one request or one probe round.
    pub timeout: Duration,
    /// Budget for establishing a single connection (also the per-port probe
    /// attempt timeout).
    pub connect_timeout: Duration,
    /// Budget for reading a response once connected.
    pub read_timeout: Duration,
    /// Transport retry attempts after the initial try.
    pub retries: u32,
    /// Fixed delay between transport retry attempts.
    pub retry_delay: Duration,
    /// Total time to wait for all service ports to come up.
    pub max_service_wait: Duration,
    /// Upper bound on simultaneous in-flight probe attempts.
    pub max_concurrency: usize,
    /// First inter-round probe delay.
    pub probe_base_delay: Duration,
    /// Ceiling on the inter-round probe delay.
    pub probe_delay_cap: Duration,
    /// Lifetime assigned to freshly-issued credentials in the cache.
    pub credential_ttl: Duration,
}

impl Settings {
    /// Balanced defaults suited to a typical consumer router.
    pub fn standard() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(15),
            retries: 3,
            retry_delay: Duration::from_secs(2),
            max_service_wait: Duration::from_secs(180),
            max_concurrency: 4,
            probe_base_delay: Duration::from_millis(500),
            probe_delay_cap: Duration::from_secs(8),
            credential_ttl: Duration::from_secs(600),
        }
    }

    /// Short timeouts, more retries, wider fan-out. For fast local links.
    pub fn aggressive() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(8),
            retries: 5,
            retry_delay: Duration::from_secs(1),
            max_service_wait: Duration::from_secs(120),
            max_concurrency: 8,
            probe_base_delay: Duration::from_millis(250),
            probe_delay_cap: Duration::from_secs(4),
            credential_ttl: Duration::from_secs(600),
        }
    }

    /// Long timeouts, narrow fan-out. For congested links or devices that
    /// rate-limit under probe pressure.
    pub fn conservative() -> Self {
        Self {
            timeout: Duration::from_secs(45),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            retries: 2,
            retry_delay: Duration::from_secs(5),
            max_service_wait: Duration::from_secs(600),
            max_concurrency: 2,
            probe_base_delay: Duration::from_secs(1),
            probe_delay_cap: Duration::from_secs(15),
            credential_ttl: Duration::from_secs(600),
        }
    }

    /// Start an override builder seeded from this preset.
    pub fn builder(self) -> SettingsBuilder {
        SettingsBuilder {
            settings: self,
            retries_override: None,
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("timeout", self.timeout),
            ("connect_timeout", self.connect_timeout),
            ("read_timeout", self.read_timeout),
            ("max_service_wait", self.max_service_wait),
            ("probe_base_delay", self.probe_base_delay),
            ("probe_delay_cap", self.probe_delay_cap),
            ("credential_ttl", self.credential_ttl),
        ] {
            if value.is_zero() {
                return Err(DomainError::InvalidSettings(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if self.max_concurrency < 1 {
            return Err(DomainError::InvalidSettings(
                "max_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Override builder for [`Settings`].
///
/// Accepts a signed retry count so that a negative value surfaces as a
/// validation error rather than being unrepresentable at the call site.
#[derive(Debug, Clone)]
pub struct SettingsBuilder {
    settings: Settings,
    retries_override: Option<i64>,
}

impl SettingsBuilder {
    pub fn timeout(mut self, value: Duration) -> Self {
        self.settings.timeout = value;
        self
    }

    pub fn connect_timeout(mut self, value: Duration) -> Self {
        self.settings.connect_timeout = value;
        self
    }

    pub fn read_timeout(mut self, value: Duration) -> Self {
        self.settings.read_timeout = value;
        self
    }

    pub fn retries(mut self, value: i64) -> Self {
        self.retries_override = Some(value);
        self
    }

    pub fn retry_delay(mut self, value: Duration) -> Self {
        self.settings.retry_delay = value;
        self
    }

    pub fn max_service_wait(mut self, value: Duration) -> Self {
        self.settings.max_service_wait = value;
        self
    }

    pub fn max_concurrency(mut self, value: usize) -> Self {
        self.settings.max_concurrency = value;
        self
    }

    pub fn probe_base_delay(mut self, value: Duration) -> Self {
        self.settings.probe_base_delay = value;
        self
    }

    pub fn probe_delay_cap(mut self, value: Duration) -> Self {
        self.settings.probe_delay_cap = value;
        self
    }

    pub fn credential_ttl(mut self, value: Duration) -> Self {
        self.settings.credential_ttl = value;
        self
    }

    pub fn build(mut self) -> Result<Settings> {
        if let Some(retries) = self.retries_override {
            if retries < 0 {
                return Err(DomainError::InvalidSettings(format!(
                    "retries must be >= 0, got {retries}"
                )));
            }
            self.settings.retries = u32::try_from(retries).map_err(|_| {
                DomainError::InvalidSettings(format!("retries out of range: {retries}"))
            })?;
        }
        self.settings.validate()?;
        Ok(self.settings)
    }
}
