// Central Error Type for the Pipeline

use thiserror::Error;

use crate::application::payload::BuildError;
use crate::application::probe::TimeoutError;
use crate::domain::DomainError;
use crate::port::{AuthError, TransportError};

/// Aggregated run-level error. Each variant maps to a distinct failure cause
/// in the run outcome (and a distinct exit code at the CLI boundary).
///
/// `CacheError` is deliberately absent: a broken credential store degrades to
/// an empty cache at the store boundary and never fails a run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Payload build error: {0}")]
    Build(#[from] BuildError),

    #[error("Service wait timed out: {0}")]
    Timeout(#[from] TimeoutError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Run cancelled")]
    Cancelled,
}

/// Result type alias using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;
