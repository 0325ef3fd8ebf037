// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid pipeline state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
