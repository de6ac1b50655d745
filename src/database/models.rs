use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Container health as reported by the runtime, e.g. the `healthy` in
/// `running:healthy`. Containers without a healthcheck report `unknown`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Unknown,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
            HealthState::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

impl From<&str> for HealthState {
    fn from(value: &str) -> Self {
        match value {
            "healthy" => HealthState::Healthy,
            "unhealthy" => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// Lifecycle state of the underlying database container. Persisted and
/// exchanged as `status:health` strings ("running:healthy", "exited:unhealthy").
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseStatus {
    Starting,
    Running(HealthState),
    Restarting,
    Stopped,
    Exited(HealthState),
}

impl DatabaseStatus {
    /// Every `running:*` substate counts as running.
    pub fn is_running(&self) -> bool {
        matches!(self, DatabaseStatus::Running(_))
    }
}

impl Default for DatabaseStatus {
    fn default() -> Self {
        DatabaseStatus::Exited(HealthState::Unknown)
    }
}

impl fmt::Display for DatabaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseStatus::Starting => write!(f, "starting:unknown"),
            DatabaseStatus::Running(h) => write!(f, "running:{}", h),
            DatabaseStatus::Restarting => write!(f, "restarting:unknown"),
            DatabaseStatus::Stopped => write!(f, "stopped:unknown"),
            DatabaseStatus::Exited(h) => write!(f, "exited:{}", h),
        }
    }
}

impl FromStr for DatabaseStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (state, health) = match s.split_once(':') {
            Some((state, health)) => (state, HealthState::from(health)),
            None => (s, HealthState::Unknown),
        };

        let status = match state {
            "starting" => DatabaseStatus::Starting,
            "running" => DatabaseStatus::Running(health),
            "restarting" => DatabaseStatus::Restarting,
            "stopped" => DatabaseStatus::Stopped,
            _ => DatabaseStatus::Exited(health),
        };

        Ok(status)
    }
}

/// Database flavour derived from the container image. Source of the URL
/// scheme and of the container-internal port the proxy forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Postgres,
    Mysql,
    Mariadb,
    Redis,
    Mongo,
}

impl DatabaseKind {
    pub fn from_image(image: &str) -> Option<Self> {
        // "bitnami/postgresql:16" -> "postgresql"
        let name = image
            .rsplit('/')
            .next()
            .unwrap_or(image)
            .split(':')
            .next()
            .unwrap_or(image)
            .to_ascii_lowercase();

        if name.starts_with("postgres") {
            Some(DatabaseKind::Postgres)
        } else if name.starts_with("mariadb") {
            Some(DatabaseKind::Mariadb)
        } else if name.starts_with("mysql") {
            Some(DatabaseKind::Mysql)
        } else if name.starts_with("redis") {
            Some(DatabaseKind::Redis)
        } else if name.starts_with("mongo") {
            Some(DatabaseKind::Mongo)
        } else {
            None
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            DatabaseKind::Postgres => "postgres",
            DatabaseKind::Mysql | DatabaseKind::Mariadb => "mysql",
            DatabaseKind::Redis => "redis",
            DatabaseKind::Mongo => "mongodb",
        }
    }

    /// Port the database listens on inside its container.
    pub fn internal_port(&self) -> u16 {
        match self {
            DatabaseKind::Postgres => 5432,
            DatabaseKind::Mysql | DatabaseKind::Mariadb => 3306,
            DatabaseKind::Redis => 6379,
            DatabaseKind::Mongo => 27017,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceDatabase {
    pub id: String, // UUID
    pub service_id: String,
    pub name: String, // container name on the deployment network
    pub human_name: Option<String>,
    pub description: Option<String>,
    pub image: String,
    pub status: DatabaseStatus,

    // Public exposure
    pub is_public: bool,
    pub public_port: Option<u16>,

    pub is_log_drain_enabled: bool,
    pub exclude_from_status: bool,

    // Derived from is_public + a successful proxy start; never persisted.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl ServiceDatabase {
    pub fn kind(&self) -> Option<DatabaseKind> {
        DatabaseKind::from_image(&self.image)
    }

    /// External connection string, `scheme://fqdn:public_port`. Pure and
    /// deterministic; `None` when the image is unknown or no port is set.
    pub fn public_connection_url(&self, fqdn: &str) -> Option<String> {
        let port = self.public_port?;
        let kind = self.kind()?;
        Some(format!("{}://{}:{}", kind.scheme(), fqdn, port))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceApplication {
    pub id: String, // UUID
    pub service_id: String,
    pub name: String,
    pub human_name: Option<String>,
    pub description: Option<String>,
    pub image: String,
    pub exclude_from_status: bool,
    pub is_log_drain_enabled: bool,
    pub is_migrated: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InstanceSettings {
    pub fqdn: String,
    pub proxy_bind_host: String,
    pub log_drain_enabled: bool,
    pub connection_timeout: u32,
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self {
            fqdn: "localhost".to_string(),
            proxy_bind_host: "0.0.0.0".to_string(),
            log_drain_enabled: false,
            connection_timeout: 10,
        }
    }
}
