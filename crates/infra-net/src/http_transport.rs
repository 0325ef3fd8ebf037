// HTTP Transport Adapter
// reqwest-backed implementation of the Transport port. Connection reuse
// comes from the client's internal pool (one client per target host);
// transient failures are retried with a fixed delay between attempts.

use async_trait::async_trait;
use provisor_core::domain::settings::Settings;
use provisor_core::port::transport::{
    Method, Transport, TransportError, TransportRequest, TransportResponse,
};
use std::time::Duration;
use tracing::{debug, warn};

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    settings: Settings,
}

impl HttpTransport {
    /// Build a pooled client for one target host. Opening connections is
    /// left to the pool: a new one is only established when none is idle.
    pub fn new(host: &str, settings: Settings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .timeout(settings.timeout)
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self {
            client,
            base_url: format!("http://{host}"),
            settings,
        })
    }

    fn classify(&self, error: reqwest::Error) -> TransportError {
        if error.is_connect() {
            if error.is_timeout() {
                TransportError::ConnectTimeout(self.settings.connect_timeout)
            } else {
                TransportError::ConnectRefused(error.to_string())
            }
        } else if error.is_timeout() {
            TransportError::ReadTimeout
        } else if error.is_body() || error.is_request() {
            TransportError::Interrupted(error.to_string())
        } else {
            TransportError::Other(error.to_string())
        }
    }
}

/// Single-attempt request execution, separated from the retry policy so the
/// policy can be exercised against scripted outcomes.
#[async_trait]
trait Dispatch: Send + Sync {
    async fn dispatch(
        &self,
        request: &TransportRequest,
    ) -> Result<TransportResponse, TransportError>;
}

#[async_trait]
impl Dispatch for HttpTransport {
    async fn dispatch(
        &self,
        request: &TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;
        let status = response.status().as_u16();
        if (500..600).contains(&status) {
            return Err(TransportError::ServerStatus(status));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| self.classify(e))?
            .to_vec();
        Ok(TransportResponse { status, body })
    }
}

/// Whether a failed attempt may be repeated. Non-idempotent requests are
/// only retried when the failure happened during connection establishment,
/// before any body bytes could have been acknowledged sent; anything later
/// risks duplicate side effects on the device.
fn retry_allowed(idempotent: bool, error: &TransportError) -> bool {
    error.is_transient() && (idempotent || error.before_body_sent())
}

/// The retry loop: retryable failures are repeated up to `retries` extra
/// attempts with a fixed delay between them; the final failure wraps the
/// last underlying cause.
async fn send_with_retries(
    dispatcher: &dyn Dispatch,
    retries: u32,
    retry_delay: Duration,
    request: &TransportRequest,
) -> Result<TransportResponse, TransportError> {
    let mut attempt: u32 = 0;
    loop {
        match dispatcher.dispatch(request).await {
            Ok(response) => {
                debug!(
                    path = %request.path,
                    status = response.status,
                    attempt,
                    "Request completed"
                );
                return Ok(response);
            }
            Err(e) => {
                if !retry_allowed(request.idempotent, &e) {
                    return Err(e);
                }
                if attempt >= retries {
                    return Err(TransportError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: Box::new(e),
                    });
                }
                warn!(
                    path = %request.path,
                    attempt,
                    retry_delay_ms = retry_delay.as_millis() as u64,
                    error = %e,
                    "Transient transport failure, retrying"
                );
                tokio::time::sleep(retry_delay).await;
                attempt += 1;
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        send_with_retries(
            self,
            self.settings.retries,
            self.settings.retry_delay,
            &request,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted single-attempt dispatcher: pops one outcome per call,
    /// succeeding with 200 once the script is exhausted.
    struct ScriptedDispatch {
        script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedDispatch {
        fn new(script: impl IntoIterator<Item = Result<TransportResponse, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Dispatch for ScriptedDispatch {
        async fn dispatch(
            &self,
            _request: &TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.lock().unwrap().pop_front() {
                Some(outcome) => outcome,
                None => Ok(TransportResponse {
                    status: 200,
                    body: Vec::new(),
                }),
            }
        }
    }

    fn refused() -> TransportError {
        TransportError::ConnectRefused("refused".into())
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_preserves_last_cause_and_count() {
        let dispatcher = ScriptedDispatch::new([
            Err(refused()),
            Err(refused()),
            Err(refused()),
            Err(TransportError::ServerStatus(503)),
        ]);
        let delay = Duration::from_millis(250);
        let started = tokio::time::Instant::now();

        let err = send_with_retries(&dispatcher, 3, delay, &TransportRequest::get("/ping"))
            .await
            .unwrap_err();

        // Initial try plus three retries, each preceded by the fixed delay.
        assert_eq!(dispatcher.call_count(), 4);
        assert!(started.elapsed() >= delay * 3);
        assert!(matches!(
            err,
            TransportError::RetriesExhausted { attempts: 4, ref last }
                if matches!(**last, TransportError::ServerStatus(503))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers_within_budget() {
        let dispatcher = ScriptedDispatch::new([
            Err(refused()),
            Err(TransportError::ReadTimeout),
            Ok(TransportResponse {
                status: 204,
                body: Vec::new(),
            }),
        ]);

        let response = send_with_retries(
            &dispatcher,
            3,
            Duration::from_millis(100),
            &TransportRequest::get("/ping"),
        )
        .await
        .unwrap();

        assert_eq!(response.status, 204);
        assert_eq!(dispatcher.call_count(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_returned_unwrapped() {
        // Non-idempotent POST failing after the body may have been sent:
        // surfaced immediately, no RetriesExhausted wrapper.
        let dispatcher = ScriptedDispatch::new([Err(TransportError::ReadTimeout)]);

        let err = send_with_retries(
            &dispatcher,
            3,
            Duration::from_millis(100),
            &TransportRequest::post("/execute", vec![1, 2, 3]),
        )
        .await
        .unwrap_err();

        assert_eq!(dispatcher.call_count(), 1);
        assert!(matches!(err, TransportError::ReadTimeout));
    }

    #[tokio::test]
    async fn test_stalled_response_hits_read_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the connection open without ever responding.
            if let Ok((stream, _)) = listener.accept().await {
                tokio::time::sleep(Duration::from_secs(10)).await;
                drop(stream);
            }
        });

        let settings = Settings::standard()
            .builder()
            .retries(0)
            .read_timeout(Duration::from_millis(200))
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let transport = HttpTransport::new(&addr.to_string(), settings).unwrap();

        let started = std::time::Instant::now();
        let err = transport
            .send(TransportRequest::get("/"))
            .await
            .unwrap_err();

        // The read timeout fired, well before the 5s total budget.
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(
            err,
            TransportError::RetriesExhausted { attempts: 1, ref last }
                if matches!(**last, TransportError::ReadTimeout)
        ));
    }

    #[test]
    fn test_transient_idempotent_failures_retryable() {
        for error in [
            TransportError::ConnectRefused("refused".into()),
            TransportError::ConnectTimeout(Duration::from_secs(1)),
            TransportError::ReadTimeout,
            TransportError::ServerStatus(503),
        ] {
            assert!(retry_allowed(true, &error), "{error} should be retryable");
        }
    }

    #[test]
    fn test_non_idempotent_only_retried_before_body_sent() {
        // Connection-phase failures: no body bytes acknowledged, safe.
        assert!(retry_allowed(
            false,
            &TransportError::ConnectRefused("refused".into())
        ));
        assert!(retry_allowed(
            false,
            &TransportError::ConnectTimeout(Duration::from_secs(1))
        ));
        // Read-phase / response failures: the body may have been applied.
        assert!(!retry_allowed(false, &TransportError::ReadTimeout));
        assert!(!retry_allowed(false, &TransportError::ServerStatus(502)));
    }

    #[test]
    fn test_non_transient_failures_never_retried() {
        for error in [
            TransportError::UnexpectedStatus(404),
            TransportError::Interrupted("reset mid-body".into()),
            TransportError::Other("tls handshake".into()),
        ] {
            assert!(!retry_allowed(true, &error));
            assert!(!retry_allowed(false, &error));
        }
    }
}
