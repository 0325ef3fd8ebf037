// Application Layer - Services driving one provisioning run

pub mod cancel;
pub mod orchestrator;
pub mod payload;
pub mod probe;

pub use cancel::{cancel_channel, CancelHandle, CancelToken};
pub use orchestrator::Orchestrator;
pub use payload::{BuildError, PayloadBuilder};
pub use probe::{ServiceProber, TimeoutError};
