// Orchestrator - The staged provisioning state machine
// Strictly sequential: one state active at a time. Concurrency lives below
// (prober fan-out, transport pool), cancellation is raced at every await.

use crate::application::cancel::CancelToken;
use crate::application::payload::PayloadBuilder;
use crate::application::probe::ServiceProber;
use crate::domain::pipeline::{FailureDetail, PipelineState, RunOutcome};
use crate::domain::probe::ProbeResult;
use crate::domain::settings::Settings;
use crate::domain::target::Target;
use crate::error::PipelineError;
use crate::port::credential_store::{CachedCredential, CredentialStore};
use crate::port::gateway::{AuthError, DeviceGateway};
use crate::port::observer::ProgressObserver;
use crate::port::time_provider::TimeProvider;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives one run of the pipeline:
/// Authenticate -> Build -> Deliver -> Wait-for-services.
///
/// A run consumes the orchestrator; terminal states are final. The gateway,
/// credential store, and prober are shared via `Arc` and survive the run, so
/// a fresh orchestrator for the next run reuses them.
pub struct Orchestrator {
    target: Target,
    settings: Settings,
    gateway: Arc<dyn DeviceGateway>,
    credential_store: Arc<dyn CredentialStore>,
    prober: ServiceProber,
    observer: Arc<dyn ProgressObserver>,
    time_provider: Arc<dyn TimeProvider>,
    state: PipelineState,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        target: Target,
        settings: Settings,
        gateway: Arc<dyn DeviceGateway>,
        credential_store: Arc<dyn CredentialStore>,
        prober: ServiceProber,
        observer: Arc<dyn ProgressObserver>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            target,
            settings,
            gateway,
            credential_store,
            prober,
            observer,
            time_provider,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Execute the full pipeline over the given payload file mapping.
    ///
    /// Always returns a `RunOutcome`; failures are folded into it with the
    /// state they occurred in. On cancellation, in-flight work is abandoned
    /// and the outcome reports a cancelled cause.
    pub async fn run(
        mut self,
        payload_files: Vec<(String, Vec<u8>)>,
        mut cancel: CancelToken,
    ) -> RunOutcome {
        let run_started = Instant::now();
        info!(host = %self.target.host(), ports = ?self.target.service_ports(), "Run starting");

        // Authenticating
        if let Err(e) = self.advance(PipelineState::Authenticating, run_started) {
            return self.fail(run_started, Vec::new(), e);
        }
        let token = match race(&mut cancel, self.obtain_token()).await {
            Ok(token) => token,
            Err(e) => return self.fail(run_started, Vec::new(), e),
        };

        // BuildingPayload
        if let Err(e) = self.advance(PipelineState::BuildingPayload, run_started) {
            return self.fail(run_started, Vec::new(), e);
        }
        let artifact = match self.build_artifact(payload_files) {
            Ok(artifact) => artifact,
            Err(e) => return self.fail(run_started, Vec::new(), e),
        };

        // Delivering
        if let Err(e) = self.advance(PipelineState::Delivering, run_started) {
            return self.fail(run_started, Vec::new(), e);
        }
        let delivery = race(
            &mut cancel,
            self.gateway.deliver_and_trigger(&token, &artifact),
        )
        .await;
        if let Err(e) = delivery {
            return self.fail(run_started, Vec::new(), e);
        }

        // WaitingForServices
        if let Err(e) = self.advance(PipelineState::WaitingForServices, run_started) {
            return self.fail(run_started, Vec::new(), e);
        }
        match race(&mut cancel, self.prober.wait_until_ready(&self.target)).await {
            Ok(ports) => {
                if let Err(e) = self.advance(PipelineState::Succeeded, run_started) {
                    return self.fail(run_started, ports, e);
                }
                info!(elapsed_ms = run_started.elapsed().as_millis() as u64, "Run succeeded");
                RunOutcome {
                    state: PipelineState::Succeeded,
                    elapsed: run_started.elapsed(),
                    ports,
                    failure: None,
                }
            }
            Err(e) => {
                // Timeout carries the partial per-port status; keep it in
                // the outcome instead of reporting an empty port list.
                let ports = match &e {
                    PipelineError::Timeout(timeout) => timeout.ports.clone(),
                    _ => Vec::new(),
                };
                self.fail(run_started, ports, e)
            }
        }
    }

    /// Cache-first token acquisition. A valid cached credential skips the
    /// network exchange entirely; a fresh one is written back before the
    /// pipeline advances.
    async fn obtain_token(&self) -> Result<String, PipelineError> {
        let key = self.target.cache_key();
        match self.credential_store.get(&key).await {
            Ok(Some(cached)) => {
                debug!(key = %key, "Using cached credential");
                return Ok(cached.token);
            }
            Ok(None) => {
                debug!(key = %key, "No valid cached credential");
            }
            Err(e) => {
                // Degraded cache is never a run failure.
                warn!(key = %key, error = %e, "Credential cache unavailable, re-authenticating");
            }
        }

        let credentials = self
            .target
            .credentials()
            .ok_or(PipelineError::Auth(AuthError::MissingCredentials))?;
        let token = self.gateway.authenticate(credentials).await?;
        info!(key = %key, "Authenticated against device");

        let credential = CachedCredential::new(
            token.clone(),
            self.time_provider.now_millis(),
            self.settings.credential_ttl.as_millis() as i64,
        );
        if let Err(e) = self.credential_store.put(&key, credential).await {
            warn!(key = %key, error = %e, "Failed to persist credential, continuing");
        }
        Ok(token)
    }

    fn build_artifact(&self, files: Vec<(String, Vec<u8>)>) -> Result<Vec<u8>, PipelineError> {
        let builder = PayloadBuilder::from_files(files)?;
        let artifact = builder.build()?;
        debug!(artifact_bytes = artifact.len(), "Payload artifact built");
        Ok(artifact)
    }

    fn advance(
        &mut self,
        next: PipelineState,
        run_started: Instant,
    ) -> Result<(), PipelineError> {
        self.state.validate_transition(&next)?;
        self.state = next;
        let elapsed = run_started.elapsed();
        info!(state = %self.state, elapsed_ms = elapsed.as_millis() as u64, "Pipeline transition");
        self.observer.on_transition(&self.state, elapsed);
        Ok(())
    }

    fn fail(
        mut self,
        run_started: Instant,
        ports: Vec<ProbeResult>,
        cause: PipelineError,
    ) -> RunOutcome {
        let failed_in = self.state.clone();
        warn!(failed_in = %failed_in, cause = %cause, "Run failed");
        // Terminal transition; legal from every active state.
        if self.state.validate_transition(&PipelineState::Failed).is_ok() {
            self.state = PipelineState::Failed;
            self.observer
                .on_transition(&self.state, run_started.elapsed());
        }
        RunOutcome {
            state: PipelineState::Failed,
            elapsed: run_started.elapsed(),
            ports,
            failure: Some(FailureDetail { failed_in, cause }),
        }
    }
}

/// Race a pipeline phase against the cancellation token. On cancellation the
/// phase future is dropped, which aborts any probe attempts it spawned.
async fn race<T, E>(
    cancel: &mut CancelToken,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, PipelineError>
where
    PipelineError: From<E>,
{
    tokio::select! {
        biased;
        _ = cancel.wait() => Err(PipelineError::Cancelled),
        result = fut => result.map_err(PipelineError::from),
    }
}
