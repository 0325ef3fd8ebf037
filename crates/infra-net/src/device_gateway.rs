// HTTP Device Gateway
// Narrow adapter over the Transport port for the device's web endpoints:
// a JSON login exchange and an opaque artifact upload that triggers remote
// execution. Request shapes live entirely in this file.

use async_trait::async_trait;
use provisor_core::domain::target::Credentials;
use provisor_core::port::gateway::{AuthError, DeviceGateway};
use provisor_core::port::transport::{Transport, TransportError, TransportRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const LOGIN_PATH: &str = "/api/auth/login";
const DELIVER_PATH: &str = "/api/provision/execute";

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

pub struct HttpDeviceGateway {
    transport: Arc<dyn Transport>,
}

impl HttpDeviceGateway {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl DeviceGateway for HttpDeviceGateway {
    async fn authenticate(&self, credentials: &Credentials) -> Result<String, AuthError> {
        let body = serde_json::to_vec(&LoginRequest {
            username: &credentials.username,
            password: &credentials.password,
        })
        .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        // The login exchange is safe to repeat, so let the transport retry
        // transient faults; a rejection comes back as a status, not an error.
        let request = TransportRequest::post(LOGIN_PATH, body)
            .header("content-type", "application/json")
            .idempotent(true);

        let response = self.transport.send(request).await?;
        match response.status {
            status if (200..300).contains(&status) => {
                let parsed: LoginResponse = serde_json::from_slice(&response.body)
                    .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
                debug!("Login accepted");
                Ok(parsed.token)
            }
            401 | 403 => Err(AuthError::Rejected),
            status => Err(AuthError::Transport(TransportError::UnexpectedStatus(
                status,
            ))),
        }
    }

    async fn deliver_and_trigger(
        &self,
        token: &str,
        artifact: &[u8],
    ) -> Result<(), TransportError> {
        // State-changing upload: the transport only retries this while the
        // failure is provably pre-body.
        let request = TransportRequest::post(DELIVER_PATH, artifact.to_vec())
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", "application/gzip");

        let response = self.transport.send(request).await?;
        if response.is_success() {
            debug!(artifact_bytes = artifact.len(), "Delivery acknowledged");
            Ok(())
        } else {
            Err(TransportError::UnexpectedStatus(response.status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisor_core::port::transport::mocks::MockTransport;

    #[tokio::test]
    async fn test_authenticate_parses_token() {
        let transport = Arc::new(MockTransport::new());
        transport.push_ok(200, br#"{"token":"stok-abc123"}"#.to_vec());
        let gateway = HttpDeviceGateway::new(Arc::clone(&transport) as Arc<dyn Transport>);

        let token = gateway
            .authenticate(&Credentials::new("root", "secret"))
            .await
            .unwrap();
        assert_eq!(token, "stok-abc123");

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].path, LOGIN_PATH);
        assert!(sent[0].idempotent);
    }

    #[tokio::test]
    async fn test_authenticate_maps_unauthorized_to_rejected() {
        let transport = Arc::new(MockTransport::new());
        transport.push_ok(401, Vec::new());
        let gateway = HttpDeviceGateway::new(Arc::clone(&transport) as Arc<dyn Transport>);

        let result = gateway
            .authenticate(&Credentials::new("root", "wrong"))
            .await;
        assert!(matches!(result, Err(AuthError::Rejected)));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_garbage_body() {
        let transport = Arc::new(MockTransport::new());
        transport.push_ok(200, b"not json".to_vec());
        let gateway = HttpDeviceGateway::new(Arc::clone(&transport) as Arc<dyn Transport>);

        let result = gateway.authenticate(&Credentials::new("root", "pw")).await;
        assert!(matches!(result, Err(AuthError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_deliver_marks_request_non_idempotent() {
        let transport = Arc::new(MockTransport::new());
        transport.push_ok(200, Vec::new());
        let gateway = HttpDeviceGateway::new(Arc::clone(&transport) as Arc<dyn Transport>);

        gateway
            .deliver_and_trigger("stok-abc123", &[1, 2, 3])
            .await
            .unwrap();

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].path, DELIVER_PATH);
        assert!(!sent[0].idempotent);
        assert_eq!(sent[0].body.as_deref(), Some(&[1u8, 2, 3][..]));
    }
}
