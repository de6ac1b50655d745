use crate::database::models::ServiceDatabase;
use crate::error::ProxyError;
use crate::proxy::model::{ProxyCommand, ProxyMetric, TcpProxyConfig};
use crate::proxy::{actor::ProxyActor, ProxyManager};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use uuid::Uuid;

pub struct ProxyHandle {
    pub cmd_tx: mpsc::Sender<ProxyCommand>,
    pub metric_rx: watch::Receiver<ProxyMetric>,
    pub config: TcpProxyConfig,
}

/// Book-keeping of live proxy actors, one per exposed database.
#[derive(Clone, Default)]
pub struct ProxyRegistry {
    proxies: Arc<RwLock<HashMap<Uuid, ProxyHandle>>>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self {
            proxies: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn add_proxy(&self, config: &TcpProxyConfig) {
        let (cmd_tx, cmd_rx) = mpsc::channel::<ProxyCommand>(32);
        let (metric_tx, metric_rx) = watch::channel(ProxyMetric::default());

        let id = config.id;

        let actor = ProxyActor::new(config.clone(), cmd_rx, metric_tx);
        tokio::task::spawn(actor.run());

        let handle = ProxyHandle {
            cmd_tx,
            metric_rx,
            config: config.clone(),
        };

        let mut proxies = self.proxies.write().await;
        proxies.insert(id, handle);
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.proxies.read().await.contains_key(&id)
    }

    pub async fn start_proxy(&self, id: Uuid) -> Result<(), ProxyError> {
        self.send_command_to_proxy(&id, ProxyCommand::Start).await
    }

    /// Stopping a proxy that was never started is not an error.
    pub async fn stop_proxy(&self, id: Uuid) -> Result<(), ProxyError> {
        if !self.contains(id).await {
            debug!("Proxy {} not registered, stop is a no-op", id);
            return Ok(());
        }
        self.send_command_to_proxy(&id, ProxyCommand::Stop).await
    }

    pub async fn remove_proxy(&self, id: Uuid) -> Result<(), ProxyError> {
        let handle = {
            let mut proxies = self.proxies.write().await;
            proxies.remove(&id)
        };

        match handle {
            Some(handle) => handle
                .cmd_tx
                .send(ProxyCommand::Remove)
                .await
                .map_err(|_| ProxyError::ActorGone(id)),
            None => {
                debug!("Proxy {} not registered, remove is a no-op", id);
                Ok(())
            }
        }
    }

    pub async fn get_proxy_metric(&self, id: Uuid) -> Option<ProxyMetric> {
        let proxies = self.proxies.read().await;
        proxies
            .get(&id)
            .map(|handle| handle.metric_rx.borrow().clone())
    }

    pub async fn get_all_proxy_metrics(&self) -> HashMap<Uuid, ProxyMetric> {
        let proxies = self.proxies.read().await;
        proxies
            .iter()
            .map(|(id, handle)| (*id, handle.metric_rx.borrow().clone()))
            .collect()
    }

    async fn send_command_to_proxy(&self, id: &Uuid, cmd: ProxyCommand) -> Result<(), ProxyError> {
        let proxies = self.proxies.read().await;
        if let Some(handle) = proxies.get(id) {
            handle
                .cmd_tx
                .send(cmd)
                .await
                .map_err(|_| ProxyError::ActorGone(*id))?;

            Ok(())
        } else {
            Err(ProxyError::ActorGone(*id))
        }
    }
}

/// The crate's production [`ProxyManager`]: TCP relays on the deployment
/// host, driven through the registry.
#[derive(Clone)]
pub struct TcpProxyManager {
    registry: ProxyRegistry,
    bind_host: String,
    resolve_container_addr: bool,
}

impl TcpProxyManager {
    pub fn new(bind_host: impl Into<String>) -> Self {
        Self {
            registry: ProxyRegistry::new(),
            bind_host: bind_host.into(),
            resolve_container_addr: true,
        }
    }

    pub fn registry(&self) -> &ProxyRegistry {
        &self.registry
    }

    /// Dial the container name directly instead of resolving its address
    /// through docker first. Used by tests and single-network setups.
    pub fn with_direct_target(mut self) -> Self {
        self.resolve_container_addr = false;
        self
    }
}

#[async_trait]
impl ProxyManager for TcpProxyManager {
    async fn start(&self, database: &ServiceDatabase) -> Result<(), ProxyError> {
        let mut config = TcpProxyConfig::from_database(database, &self.bind_host)?;
        config.resolve_container_addr = self.resolve_container_addr;

        info!(
            "Starting proxy for database {}: {}:{} -> {}:{}",
            database.id, config.bind_host, config.bind_port, config.target_host, config.target_port
        );

        if !self.registry.contains(config.id).await {
            self.registry.add_proxy(&config).await;
        }
        let result = self.registry.start_proxy(config.id).await;
        match &result {
            Ok(()) => info!("Proxy for database {} started", database.id),
            Err(e) => warn!("Failed to start proxy for database {}: {}", database.id, e),
        }

        result
    }

    async fn stop(&self, database: &ServiceDatabase) -> Result<(), ProxyError> {
        let id = match Uuid::parse_str(&database.id) {
            Ok(id) => id,
            Err(_) => {
                warn!("Invalid database id {}, nothing to stop", database.id);
                return Ok(());
            }
        };

        self.registry.stop_proxy(id).await?;
        self.registry.remove_proxy(id).await
    }
}
