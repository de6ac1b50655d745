pub mod entity;
pub mod models;

use crate::error::StorageError;
use anyhow::Context;
use async_trait::async_trait;
use entity::{instance_settings, service_application, service_database};
use entity::{
    InstanceSettings, ServiceApplication as ServiceApplicationEntity,
    ServiceDatabase as ServiceDatabaseEntity,
};
use log::{debug, info, warn};
use models::{InstanceSettings as InstanceSettingsModel, ServiceApplication, ServiceDatabase};
use once_cell::sync::OnceCell;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, ConnectOptions, Database,
    DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, Set, TransactionTrait,
};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

pub static DB_POOL: OnceCell<DatabaseConnection> = OnceCell::new();

/// Persistence seam of the database service. Implemented by [`DB`] for
/// production and by in-memory stores in tests.
#[async_trait]
pub trait DatabaseStore: Send + Sync {
    async fn save_database(&self, database: &ServiceDatabase) -> Result<(), StorageError>;

    async fn get_database_by_id(&self, id: &str) -> Result<Option<ServiceDatabase>, StorageError>;

    async fn application_name_exists(
        &self,
        service_id: &str,
        name: &str,
    ) -> Result<bool, StorageError>;

    /// Atomically create the application copy and delete the database row.
    async fn convert_to_application(
        &self,
        database: &ServiceDatabase,
    ) -> Result<ServiceApplication, StorageError>;
}

#[derive(Clone, Debug)]
pub struct DB;

impl DB {
    pub async fn init(app_data_dir: PathBuf) -> anyhow::Result<()> {
        if DB_POOL.get().is_some() {
            return Ok(());
        }

        if !app_data_dir.exists() {
            std::fs::create_dir_all(&app_data_dir)
                .context("Failed to create app data directory")?;
        }

        let db_path = app_data_dir.join("sqlite.db");

        if !db_path.exists() {
            info!("Creating database file at: {}", db_path.display());
            std::fs::File::create(&db_path).context("Failed to create database file")?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        info!("Initializing SQLite database at: {}", db_url);

        let mut opt = ConnectOptions::new(&db_url);
        opt.max_connections(10)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let connection = Database::connect(opt)
            .await
            .context("Failed to connect to database")?;

        run_migrations(&db_path).await?;

        // If set() fails another thread won the race, which is fine.
        match DB_POOL.set(connection) {
            Ok(_) => info!("Global DB pool set successfully"),
            Err(_) => debug!("Global DB pool already initialized"),
        }

        Ok(())
    }

    fn conn() -> Result<&'static DatabaseConnection, StorageError> {
        DB_POOL.get().ok_or(StorageError::PoolUninitialized)
    }

    pub async fn load_settings() -> Result<Option<InstanceSettingsModel>, StorageError> {
        debug!("Loading instance settings");

        let connection = Self::conn()?;
        let settings = InstanceSettings::find_by_id(1)
            .one(connection)
            .await
            .map_err(|e| StorageError::query("Failed to query instance settings", e))?;

        Ok(settings.map(InstanceSettingsModel::from))
    }

    pub async fn save_settings(settings: &InstanceSettingsModel) -> Result<(), StorageError> {
        debug!("Saving instance settings (Upsert)");

        let connection = Self::conn()?;
        let active_model = instance_settings::ActiveModel {
            id: Set(1),
            fqdn: Set(settings.fqdn.clone()),
            proxy_bind_host: Set(settings.proxy_bind_host.clone()),
            log_drain_enabled: Set(settings.log_drain_enabled),
            connection_timeout: Set(settings.connection_timeout as i32),
        };

        InstanceSettings::insert(active_model)
            .on_conflict(
                OnConflict::column(instance_settings::Column::Id)
                    .update_columns([
                        instance_settings::Column::Fqdn,
                        instance_settings::Column::ProxyBindHost,
                        instance_settings::Column::LogDrainEnabled,
                        instance_settings::Column::ConnectionTimeout,
                    ])
                    .to_owned(),
            )
            .exec(connection)
            .await
            .map_err(|e| StorageError::query("Failed to upsert instance settings", e))?;

        Ok(())
    }

    pub async fn load_databases() -> Result<Vec<ServiceDatabase>, StorageError> {
        debug!("Loading service databases");

        let connection = Self::conn()?;
        let entities = ServiceDatabaseEntity::find()
            .all(connection)
            .await
            .map_err(|e| StorageError::query("Failed to load service databases", e))?;

        Ok(entities.into_iter().map(ServiceDatabase::from).collect())
    }

    pub async fn delete_database(id: &str) -> Result<(), StorageError> {
        debug!("Deleting service database: {}", id);

        let connection = Self::conn()?;
        let res = ServiceDatabaseEntity::delete_by_id(id)
            .exec(connection)
            .await
            .map_err(|e| StorageError::query("Failed to delete service database", e))?;

        if res.rows_affected == 0 {
            warn!("Service database {} not found", id);
            return Err(StorageError::NotFound(id.to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl DatabaseStore for DB {
    async fn save_database(&self, database: &ServiceDatabase) -> Result<(), StorageError> {
        debug!("Saving service database {} (Upsert)", database.id);

        let connection = Self::conn()?;
        let active_model = service_database::ActiveModel {
            id: Set(database.id.clone()),
            service_id: Set(database.service_id.clone()),
            name: Set(database.name.clone()),
            human_name: Set(database.human_name.clone()),
            description: Set(database.description.clone()),
            image: Set(database.image.clone()),
            status: Set(database.status.to_string()),
            is_public: Set(database.is_public),
            public_port: Set(database.public_port.map(i32::from)),
            is_log_drain_enabled: Set(database.is_log_drain_enabled),
            exclude_from_status: Set(database.exclude_from_status),
        };

        ServiceDatabaseEntity::insert(active_model)
            .on_conflict(
                OnConflict::column(service_database::Column::Id)
                    .update_columns([
                        service_database::Column::ServiceId,
                        service_database::Column::Name,
                        service_database::Column::HumanName,
                        service_database::Column::Description,
                        service_database::Column::Image,
                        service_database::Column::Status,
                        service_database::Column::IsPublic,
                        service_database::Column::PublicPort,
                        service_database::Column::IsLogDrainEnabled,
                        service_database::Column::ExcludeFromStatus,
                    ])
                    .to_owned(),
            )
            .exec(connection)
            .await
            .map_err(|e| {
                StorageError::query(format!("Failed to save service database {}", database.id), e)
            })?;

        Ok(())
    }

    async fn get_database_by_id(&self, id: &str) -> Result<Option<ServiceDatabase>, StorageError> {
        debug!("Getting service database by id: {}", id);

        let connection = Self::conn()?;
        let result = ServiceDatabaseEntity::find_by_id(id)
            .one(connection)
            .await
            .map_err(|e| StorageError::query("Failed to query service database", e))?;

        Ok(result.map(ServiceDatabase::from))
    }

    async fn application_name_exists(
        &self,
        service_id: &str,
        name: &str,
    ) -> Result<bool, StorageError> {
        let connection = Self::conn()?;
        let existing = ServiceApplicationEntity::find()
            .filter(service_application::Column::ServiceId.eq(service_id))
            .filter(service_application::Column::Name.eq(name))
            .one(connection)
            .await
            .map_err(|e| StorageError::query("Failed to query service applications", e))?;

        Ok(existing.is_some())
    }

    async fn convert_to_application(
        &self,
        database: &ServiceDatabase,
    ) -> Result<ServiceApplication, StorageError> {
        info!(
            "Converting service database {} into an application",
            database.id
        );

        if self
            .application_name_exists(&database.service_id, &database.name)
            .await?
        {
            return Err(StorageError::ApplicationNameTaken(database.name.clone()));
        }

        let connection = Self::conn()?;
        let application = ServiceApplication {
            id: Uuid::new_v4().to_string(),
            service_id: database.service_id.clone(),
            name: database.name.clone(),
            human_name: database.human_name.clone(),
            description: database.description.clone(),
            image: database.image.clone(),
            exclude_from_status: database.exclude_from_status,
            is_log_drain_enabled: database.is_log_drain_enabled,
            is_migrated: true,
        };

        let app_for_txn = application.clone();
        let database_id = database.id.clone();
        connection
            .transaction::<_, (), sea_orm::DbErr>(|txn| {
                Box::pin(async move {
                    let active_model = service_application::ActiveModel {
                        id: Set(app_for_txn.id.clone()),
                        service_id: Set(app_for_txn.service_id.clone()),
                        name: Set(app_for_txn.name.clone()),
                        human_name: Set(app_for_txn.human_name.clone()),
                        description: Set(app_for_txn.description.clone()),
                        image: Set(app_for_txn.image.clone()),
                        exclude_from_status: Set(app_for_txn.exclude_from_status),
                        is_log_drain_enabled: Set(app_for_txn.is_log_drain_enabled),
                        is_migrated: Set(app_for_txn.is_migrated),
                    };
                    active_model.insert(txn).await?;

                    if let Some(row) = ServiceDatabaseEntity::find_by_id(database_id.as_str())
                        .one(txn)
                        .await?
                    {
                        row.delete(txn).await?;
                    }

                    Ok(())
                })
            })
            .await
            .map_err(|e| match e {
                sea_orm::TransactionError::Connection(err)
                | sea_orm::TransactionError::Transaction(err) => {
                    StorageError::query("Failed to convert database to application", err)
                }
            })?;

        Ok(application)
    }
}

impl From<service_database::Model> for ServiceDatabase {
    fn from(entity: service_database::Model) -> Self {
        let status = entity.status.parse().unwrap_or_default();
        Self {
            id: entity.id,
            service_id: entity.service_id,
            name: entity.name,
            human_name: entity.human_name,
            description: entity.description,
            image: entity.image,
            status,
            is_public: entity.is_public,
            public_port: entity.public_port.and_then(|p| u16::try_from(p).ok()),
            is_log_drain_enabled: entity.is_log_drain_enabled,
            exclude_from_status: entity.exclude_from_status,
            public_url: None,
        }
    }
}

impl From<service_application::Model> for ServiceApplication {
    fn from(entity: service_application::Model) -> Self {
        Self {
            id: entity.id,
            service_id: entity.service_id,
            name: entity.name,
            human_name: entity.human_name,
            description: entity.description,
            image: entity.image,
            exclude_from_status: entity.exclude_from_status,
            is_log_drain_enabled: entity.is_log_drain_enabled,
            is_migrated: entity.is_migrated,
        }
    }
}

impl From<instance_settings::Model> for InstanceSettingsModel {
    fn from(entity: instance_settings::Model) -> Self {
        Self {
            fqdn: entity.fqdn,
            proxy_bind_host: entity.proxy_bind_host,
            log_drain_enabled: entity.log_drain_enabled,
            connection_timeout: entity.connection_timeout.max(0) as u32,
        }
    }
}

async fn run_migrations(db_path: &std::path::Path) -> anyhow::Result<()> {
    info!("Running database migrations");

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&db_url)
        .await
        .context("Failed to connect for migrations")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Migration failed")?;

    info!("Database migrations complete");
    Ok(())
}
