// Port Layer - Interfaces for external dependencies

pub mod credential_store;
pub mod gateway;
pub mod observer;
pub mod prober;
pub mod time_provider;
pub mod transport;

// Re-exports
pub use credential_store::{CacheError, CachedCredential, CredentialStore};
pub use gateway::{AuthError, DeviceGateway};
pub use observer::{NullObserver, ProgressObserver};
pub use prober::PortProber;
pub use time_provider::TimeProvider;
pub use transport::{Method, Transport, TransportError, TransportRequest, TransportResponse};
