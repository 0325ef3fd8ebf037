// Provisor Core - Domain Logic & Ports
// NO infrastructure dependencies: network and filesystem adapters live in
// provisor-infra-net / provisor-infra-store.

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{PipelineError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
