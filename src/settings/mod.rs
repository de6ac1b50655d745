pub use crate::database::models::InstanceSettings;
use crate::database::DB;
use crate::error::StorageError;
use log::debug;
use std::sync::Mutex;

pub struct SettingsManager {
    settings: Mutex<InstanceSettings>,
}

impl SettingsManager {
    pub fn new(initial_settings: InstanceSettings) -> Self {
        Self {
            settings: Mutex::new(initial_settings),
        }
    }

    /// Load from the database, falling back to defaults on a fresh instance.
    pub async fn load() -> Result<Self, StorageError> {
        let initial_settings = DB::load_settings().await?;
        Ok(Self::new(initial_settings.unwrap_or_default()))
    }

    pub fn get_settings(&self) -> InstanceSettings {
        self.settings.lock().unwrap().clone()
    }

    pub async fn save_settings(&self, new_settings: InstanceSettings) -> Result<(), StorageError> {
        DB::save_settings(&new_settings).await?;
        debug!("Settings saved to database successfully");
        *self.settings.lock().unwrap() = new_settings;

        Ok(())
    }
}
