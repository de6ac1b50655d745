pub mod actor;
pub mod docker_cmd;
pub mod manager;
pub mod model;
pub mod relay;

pub use manager::{ProxyRegistry, TcpProxyManager};

use crate::database::models::ServiceDatabase;
use crate::error::ProxyError;
use async_trait::async_trait;

/// Contract for creating and destroying the network forwarding that makes a
/// database publicly reachable. Injected into the service so exposure logic
/// is testable without touching real sockets.
#[async_trait]
pub trait ProxyManager: Send + Sync {
    /// Start (or confirm running) the proxy mapping for the database.
    /// Callers have already checked the exposure preconditions.
    async fn start(&self, database: &ServiceDatabase) -> Result<(), ProxyError>;

    /// Stop the mapping. Idempotent: stopping an already-stopped proxy is Ok.
    async fn stop(&self, database: &ServiceDatabase) -> Result<(), ProxyError>;
}
