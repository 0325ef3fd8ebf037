// Provisor Infrastructure - Network Adapters
// Implements: Transport (pooled, retrying HTTP), DeviceGateway, PortProber

mod device_gateway;
mod http_transport;
mod tcp_prober;

pub use device_gateway::HttpDeviceGateway;
pub use http_transport::HttpTransport;
pub use tcp_prober::TcpProber;
