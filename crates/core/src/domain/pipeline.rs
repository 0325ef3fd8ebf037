// Pipeline Domain Model
// State machine vocabulary for one provisioning run.

use crate::domain::error::{DomainError, Result};
use crate::domain::probe::ProbeResult;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stage of the provisioning pipeline. Transitions are one-directional;
/// `Succeeded` and `Failed` are terminal for a run instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Idle,
    Authenticating,
    BuildingPayload,
    Delivering,
    WaitingForServices,
    Succeeded,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Succeeded | PipelineState::Failed)
    }

    /// Check that `next` is a legal successor of `self`.
    pub fn validate_transition(&self, next: &PipelineState) -> Result<()> {
        use PipelineState::*;
        let legal = matches!(
            (self, next),
            (Idle, Authenticating)
                | (Authenticating, BuildingPayload)
                | (BuildingPayload, Delivering)
                | (Delivering, WaitingForServices)
                | (WaitingForServices, Succeeded)
                | (Authenticating, Failed)
                | (BuildingPayload, Failed)
                | (Delivering, Failed)
                | (WaitingForServices, Failed)
        );
        if legal {
            Ok(())
        } else {
            Err(DomainError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "IDLE"),
            PipelineState::Authenticating => write!(f, "AUTHENTICATING"),
            PipelineState::BuildingPayload => write!(f, "BUILDING_PAYLOAD"),
            PipelineState::Delivering => write!(f, "DELIVERING"),
            PipelineState::WaitingForServices => write!(f, "WAITING_FOR_SERVICES"),
            PipelineState::Succeeded => write!(f, "SUCCEEDED"),
            PipelineState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Where a run failed and why.
#[derive(Debug)]
pub struct FailureDetail {
    /// State the pipeline was in when the failure occurred.
    pub failed_in: PipelineState,
    pub cause: PipelineError,
}

/// Final report for one run: terminal state, elapsed wall time, the latest
/// per-port reachability (ascending by port), and failure detail if any.
#[derive(Debug)]
pub struct RunOutcome {
    pub state: PipelineState,
    pub elapsed: Duration,
    pub ports: Vec<ProbeResult>,
    pub failure: Option<FailureDetail>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Succeeded
    }

    pub fn reachable_ports(&self) -> Vec<u16> {
        self.ports
            .iter()
            .filter(|r| r.reachable)
            .map(|r| r.port)
            .collect()
    }
}
