use crate::database::models::ServiceDatabase;
use crate::error::ProxyError;
use anyhow::anyhow;
use std::time::Duration;
use uuid::Uuid;

/// Everything the relay needs to publish one database port.
#[derive(Clone, Debug)]
pub struct TcpProxyConfig {
    pub id: Uuid,
    pub name: String, // container name, used in logs and for address resolution

    pub bind_host: String,
    pub bind_port: u16,

    pub target_host: String,
    pub target_port: u16,

    /// Resolve the container address through `docker inspect` before serving
    /// instead of dialing the container name directly.
    pub resolve_container_addr: bool,
}

impl TcpProxyConfig {
    pub fn from_database(database: &ServiceDatabase, bind_host: &str) -> Result<Self, ProxyError> {
        let id = Uuid::parse_str(&database.id)
            .map_err(|_| ProxyError::Other(anyhow!("Invalid database id: {}", database.id)))?;

        let bind_port = database
            .public_port
            .ok_or(ProxyError::MissingPublicPort(id))?;

        let kind = database
            .kind()
            .ok_or_else(|| ProxyError::UnsupportedImage(database.image.clone()))?;

        Ok(TcpProxyConfig {
            id,
            name: database.name.clone(),
            bind_host: bind_host.to_string(),
            bind_port,
            target_host: database.name.clone(),
            target_port: kind.internal_port(),
            resolve_container_addr: false,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub enum ProxyState {
    #[default]
    Stopped,
    Starting,
    Running(Duration),
    Stopping,
    Error(String),
}

#[derive(Debug, Clone, Default)]
pub enum RelayHealth {
    Healthy {
        latency: Duration,
    },
    Unstable {
        reason: String,
    },
    #[default]
    Disconnected,
}

impl From<&RelayHealth> for ProxyState {
    fn from(health: &RelayHealth) -> Self {
        match health {
            RelayHealth::Healthy { latency } => ProxyState::Running(*latency),
            RelayHealth::Unstable { reason } => ProxyState::Error(reason.clone()),
            RelayHealth::Disconnected => ProxyState::Stopped,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Traffic {
    pub send_bytes: u128,
    pub recv_bytes: u128,
}

impl Traffic {
    pub fn set(&mut self, send_bytes: u128, recv_bytes: u128) {
        self.send_bytes = send_bytes;
        self.recv_bytes = recv_bytes;
    }

    pub fn append_traffic(&mut self, send_bytes: u128, recv_bytes: u128) {
        self.send_bytes += send_bytes;
        self.recv_bytes += recv_bytes;
    }
}

/// Published by the relay on every health probe / finished connection.
#[derive(Debug, Clone, Default)]
pub struct RelayEvent {
    pub health: RelayHealth,
    pub traffic: Traffic,
}

/// Published by the actor for consumers of proxy state.
#[derive(Debug, Clone, Default)]
pub struct ProxyMetric {
    pub state: ProxyState,
    pub traffic: Traffic,
}

#[derive(Debug)]
pub enum ProxyCommand {
    Start,
    Stop,
    Remove,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{DatabaseStatus, HealthState};

    fn database() -> ServiceDatabase {
        ServiceDatabase {
            id: Uuid::new_v4().to_string(),
            service_id: "svc-1".to_string(),
            name: "postgres-main".to_string(),
            human_name: None,
            description: None,
            image: "postgres:16".to_string(),
            status: DatabaseStatus::Running(HealthState::Healthy),
            is_public: true,
            public_port: Some(5432),
            is_log_drain_enabled: false,
            exclude_from_status: false,
            public_url: None,
        }
    }

    #[test]
    fn config_from_database_targets_internal_port() {
        let config = TcpProxyConfig::from_database(&database(), "0.0.0.0").unwrap();
        assert_eq!(config.bind_port, 5432);
        assert_eq!(config.target_host, "postgres-main");
        assert_eq!(config.target_port, 5432);
    }

    #[test]
    fn config_requires_public_port() {
        let mut db = database();
        db.public_port = None;
        assert!(matches!(
            TcpProxyConfig::from_database(&db, "0.0.0.0"),
            Err(ProxyError::MissingPublicPort(_))
        ));
    }

    #[test]
    fn config_rejects_unknown_image() {
        let mut db = database();
        db.image = "ghost:5".to_string();
        assert!(matches!(
            TcpProxyConfig::from_database(&db, "0.0.0.0"),
            Err(ProxyError::UnsupportedImage(_))
        ));
    }
}
