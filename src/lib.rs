pub mod compose;
pub mod database;
pub mod error;
pub mod notify;
pub mod proxy;
pub mod service;
pub mod settings;
pub mod state;

use crate::compose::ComposeRegenerator;
use crate::database::DB;
use crate::notify::LogNotifier;
use crate::proxy::TcpProxyManager;
use crate::service::database::DatabaseService;
use crate::settings::SettingsManager;
use crate::state::AppState;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// Wire the production collaborators and return the shared state the layer
/// above (commands, HTTP, whatever embeds the crate) hands around.
pub async fn bootstrap(app_data_dir: PathBuf) -> Result<AppState> {
    DB::init(app_data_dir.clone()).await?;

    let settings = Arc::new(SettingsManager::load().await?);
    let bind_host = settings.get_settings().proxy_bind_host;

    let store = Arc::new(DB);
    let proxy = Arc::new(TcpProxyManager::new(bind_host));
    let regenerator = Arc::new(ComposeRegenerator::new(app_data_dir.join("compose")));
    let notifier = Arc::new(LogNotifier);

    let database_service =
        DatabaseService::new(store, proxy, regenerator, notifier, settings.clone());

    Ok(AppState::new(database_service, settings))
}
