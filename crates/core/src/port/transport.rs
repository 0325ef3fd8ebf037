// Transport Port
// Abstraction over the pooled, retrying request client. The production
// implementation (provisor-infra-net) wraps an HTTP client; tests script
// responses in-process.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Request method. The gateway only needs these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One request through the transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Overrides the settings-level total timeout for this call.
    pub timeout: Option<Duration>,
    /// Non-idempotent requests are only retried when the failure occurred
    /// before any request body bytes were acknowledged sent.
    pub idempotent: bool,
}

impl TransportRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
            idempotent: true,
        }
    }

    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            headers: Vec::new(),
            body: Some(body),
            timeout: None,
            idempotent: false,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }
}

/// Response from the transport. 2xx statuses are returned as-is; 5xx are
/// converted to `TransportError::ServerStatus` by the implementation so the
/// retry policy can treat them as transient.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection refused: {0}")]
    ConnectRefused(String),

    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Read timed out")]
    ReadTimeout,

    #[error("Server error: HTTP {0}")]
    ServerStatus(u16),

    #[error("Unexpected response: HTTP {0}")]
    UnexpectedStatus(u16),

    #[error("Request failed after body was sent: {0}")]
    Interrupted(String),

    #[error("Request failed: {0}")]
    Other(String),

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<TransportError>,
    },
}

impl TransportError {
    /// Faults worth another attempt under the retry policy.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectRefused(_)
                | TransportError::ConnectTimeout(_)
                | TransportError::ReadTimeout
                | TransportError::ServerStatus(_)
        )
    }

    /// Whether the failure happened before any request body bytes could have
    /// been acknowledged sent. Only these faults are safe to retry for
    /// non-idempotent requests.
    pub fn before_body_sent(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectRefused(_) | TransportError::ConnectTimeout(_)
        )
    }
}

/// Transport trait
///
/// Implementations:
/// - HttpTransport (provisor-infra-net): reqwest-backed, pooled, retrying
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request, applying the retry policy internally.
    ///
    /// # Errors
    /// - the last underlying cause wrapped in `RetriesExhausted` once the
    ///   retry budget is spent
    /// - the original error immediately when it is not safe to retry
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted transport: pops one outcome per `send` call, repeating the
    /// last one once the script is exhausted.
    pub struct MockTransport {
        script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
        fallback_status: u16,
        calls: Mutex<Vec<TransportRequest>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback_status: 200,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn push_ok(&self, status: u16, body: impl Into<Vec<u8>>) {
            self.script.lock().unwrap().push_back(Ok(TransportResponse {
                status,
                body: body.into(),
            }));
        }

        pub fn push_err(&self, err: TransportError) {
            self.script.lock().unwrap().push_back(Err(err));
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn requests(&self) -> Vec<TransportRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(
            &self,
            request: TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            self.calls.lock().unwrap().push(request);
            match self.script.lock().unwrap().pop_front() {
                Some(outcome) => outcome,
                None => Ok(TransportResponse {
                    status: self.fallback_status,
                    body: Vec::new(),
                }),
            }
        }
    }
}
