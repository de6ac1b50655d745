use crate::service::database::DatabaseService;
use crate::settings::SettingsManager;
use std::sync::Arc;

pub struct AppState {
    pub database_service: Arc<DatabaseService>,
    pub settings: Arc<SettingsManager>,
}

impl AppState {
    pub fn new(database_service: DatabaseService, settings: Arc<SettingsManager>) -> Self {
        let database_service = Arc::new(database_service);
        Self {
            database_service,
            settings,
        }
    }
}
