use thiserror::Error;
use uuid::Uuid;

/// Precondition failures of the public-exposure toggle. Recoverable by
/// construction: the service resets the toggle, surfaces the message and
/// returns. Display strings double as the user-facing notification text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExposureError {
    #[error("Public port is required.")]
    MissingPublicPort,

    #[error("Database must be started to be publicly accessible.")]
    NotRunning,
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no public port configured for database {0}")]
    MissingPublicPort(Uuid),

    #[error("unsupported database image: {0}")]
    UnsupportedImage(String),

    #[error("failed to bind proxy listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to resolve address of container {0}")]
    TargetResolve(String),

    #[error("proxy actor for database {0} is gone")]
    ActorGone(Uuid),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database pool is not initialized")]
    PoolUninitialized,

    #[error("database {0} not found")]
    NotFound(String),

    #[error("an application named {0} already exists in this service")]
    ApplicationNameTaken(String),

    #[error("{context}: {source}")]
    Query {
        context: String,
        #[source]
        source: sea_orm::DbErr,
    },
}

impl StorageError {
    pub fn query(context: impl Into<String>, source: sea_orm::DbErr) -> Self {
        Self::Query {
            context: context.into(),
            source,
        }
    }
}
