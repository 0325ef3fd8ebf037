// Device Gateway Port
// Narrow interface to the device-side authentication/injection endpoint.
// The exact request shapes live in the adapter; the pipeline only needs
// "authenticate" and "deliver and trigger".

use crate::domain::target::Credentials;
use crate::port::transport::TransportError;
use async_trait::async_trait;
use thiserror::Error;

/// Authentication errors. Rejected credentials are not transient and are
/// never retried by the pipeline.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Credentials rejected by device")]
    Rejected,

    #[error("No credentials available for target")]
    MissingCredentials,

    #[error("Malformed authentication response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Device Gateway trait
///
/// Implementations:
/// - HttpDeviceGateway (provisor-infra-net): web login + artifact upload
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Exchange credentials for an opaque session token.
    async fn authenticate(&self, credentials: &Credentials) -> Result<String, AuthError>;

    /// Upload the payload artifact and trigger remote execution.
    ///
    /// # Errors
    /// - `TransportError` once the transport's retry budget is spent, or
    ///   immediately when a retry would risk duplicate side effects
    async fn deliver_and_trigger(
        &self,
        token: &str,
        artifact: &[u8],
    ) -> Result<(), TransportError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted gateway behavior
    #[derive(Debug, Clone)]
    pub enum MockAuth {
        /// Always issue this token
        Token(String),
        /// Always reject credentials
        Reject,
        /// Fail with a transport-level cause
        Unreachable,
    }

    /// Mock Device Gateway for pipeline tests
    pub struct MockDeviceGateway {
        auth: Mutex<MockAuth>,
        deliver_ok: Mutex<bool>,
        auth_calls: AtomicUsize,
        deliver_calls: AtomicUsize,
        delivered: Mutex<Vec<Vec<u8>>>,
    }

    impl MockDeviceGateway {
        pub fn new(auth: MockAuth) -> Self {
            Self {
                auth: Mutex::new(auth),
                deliver_ok: Mutex::new(true),
                auth_calls: AtomicUsize::new(0),
                deliver_calls: AtomicUsize::new(0),
                delivered: Mutex::new(Vec::new()),
            }
        }

        pub fn new_issuing(token: impl Into<String>) -> Self {
            Self::new(MockAuth::Token(token.into()))
        }

        pub fn new_rejecting() -> Self {
            Self::new(MockAuth::Reject)
        }

        pub fn fail_delivery(&self) {
            *self.deliver_ok.lock().unwrap() = false;
        }

        pub fn auth_call_count(&self) -> usize {
            self.auth_calls.load(Ordering::SeqCst)
        }

        pub fn deliver_call_count(&self) -> usize {
            self.deliver_calls.load(Ordering::SeqCst)
        }

        pub fn delivered_artifacts(&self) -> Vec<Vec<u8>> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeviceGateway for MockDeviceGateway {
        async fn authenticate(&self, _credentials: &Credentials) -> Result<String, AuthError> {
            self.auth_calls.fetch_add(1, Ordering::SeqCst);
            match self.auth.lock().unwrap().clone() {
                MockAuth::Token(token) => Ok(token),
                MockAuth::Reject => Err(AuthError::Rejected),
                MockAuth::Unreachable => Err(AuthError::Transport(
                    TransportError::ConnectRefused("mock: no route to device".into()),
                )),
            }
        }

        async fn deliver_and_trigger(
            &self,
            _token: &str,
            artifact: &[u8],
        ) -> Result<(), TransportError> {
            self.deliver_calls.fetch_add(1, Ordering::SeqCst);
            if *self.deliver_ok.lock().unwrap() {
                self.delivered.lock().unwrap().push(artifact.to_vec());
                Ok(())
            } else {
                Err(TransportError::RetriesExhausted {
                    attempts: 3,
                    last: Box::new(TransportError::ServerStatus(502)),
                })
            }
        }
    }
}
