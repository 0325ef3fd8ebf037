// Domain Layer - Pure value types for one provisioning run

pub mod error;
pub mod pipeline;
pub mod probe;
pub mod settings;
pub mod target;

pub use error::DomainError;
pub use pipeline::{FailureDetail, PipelineState, RunOutcome};
pub use probe::ProbeResult;
pub use settings::{Settings, SettingsBuilder};
pub use target::{Credentials, Target};
