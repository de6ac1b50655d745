use crate::compose::ConfigRegenerator;
use crate::database::models::{ServiceApplication, ServiceDatabase};
use crate::database::DatabaseStore;
use crate::error::ExposureError;
use crate::notify::{ErrorReporter, Notifier, NotifyLevel};
use crate::proxy::docker_cmd::{exec_local, GetContainerStatusCmd};
use crate::proxy::ProxyManager;
use crate::settings::SettingsManager;
use anyhow::{bail, Result};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// User-facing operations on a service database. Owns the public-exposure
/// decision; everything with a side effect goes through the injected
/// collaborators.
pub struct DatabaseService {
    store: Arc<dyn DatabaseStore>,
    proxy: Arc<dyn ProxyManager>,
    regenerator: Arc<dyn ConfigRegenerator>,
    notifier: Arc<dyn Notifier>,
    reporter: ErrorReporter,
    settings: Arc<SettingsManager>,
}

impl DatabaseService {
    pub fn new(
        store: Arc<dyn DatabaseStore>,
        proxy: Arc<dyn ProxyManager>,
        regenerator: Arc<dyn ConfigRegenerator>,
        notifier: Arc<dyn Notifier>,
        settings: Arc<SettingsManager>,
    ) -> Self {
        let reporter = ErrorReporter::new(notifier.clone());
        Self {
            store,
            proxy,
            regenerator,
            notifier,
            reporter,
            settings,
        }
    }

    /// Toggle public reachability. Precondition failures reset the toggle
    /// and notify the user; proxy failures are reported; nothing propagates
    /// out of this call. On the enable path the order is fixed: checks,
    /// proxy start, URL derivation, persistence attempt, config
    /// regeneration, then the success notification.
    pub async fn set_public_exposure(&self, database: &mut ServiceDatabase, desired: bool) {
        database.is_public = desired;

        if desired {
            if let Err(e) = Self::check_exposure_preconditions(database) {
                debug!("Refusing to expose database {}: {}", database.id, e);
                self.notifier.emit(NotifyLevel::Error, &e.to_string());
                database.is_public = false;
                return;
            }

            if let Err(e) = self.proxy.start(database).await {
                self.reporter.report("Failed to start database proxy", &e);
                return;
            }

            let fqdn = self.settings.get_settings().fqdn;
            database.public_url = database.public_connection_url(&fqdn);

            self.persist_and_regenerate(database).await;
            info!("Database {} is now publicly accessible", database.id);
            self.notifier
                .emit(NotifyLevel::Success, "Database is now publicly accessible.");
        } else {
            if let Err(e) = self.proxy.stop(database).await {
                self.reporter.report("Failed to stop database proxy", &e);
                return;
            }

            database.public_url = None;

            self.persist_and_regenerate(database).await;
            info!("Database {} is no longer publicly accessible", database.id);
            self.notifier.emit(
                NotifyLevel::Success,
                "Database is no longer publicly accessible.",
            );
        }
    }

    /// The save path behind every instant-save toggle: validate, persist,
    /// rewrite the compose fragment. Failures are swallowed; the
    /// regeneration hook fires in all cases.
    pub async fn submit(&self, database: &ServiceDatabase) {
        match self.try_submit(database).await {
            Ok(()) => self.notifier.emit(NotifyLevel::Success, "Database saved."),
            Err(e) => debug!("Submit for database {} failed: {:#}", database.id, e),
        }

        self.regenerator.regenerate(database);
    }

    pub async fn set_log_drain(&self, database: &mut ServiceDatabase, enabled: bool) {
        database.is_log_drain_enabled = enabled;

        if enabled && !self.settings.get_settings().log_drain_enabled {
            database.is_log_drain_enabled = false;
            self.notifier.emit(
                NotifyLevel::Error,
                "Log drain is not enabled on the server. Please enable it first.",
            );
            return;
        }

        self.submit(database).await;
        self.notifier.emit(
            NotifyLevel::Success,
            "You need to restart the database for the changes to take effect.",
        );
    }

    pub async fn set_exclude_from_status(&self, database: &mut ServiceDatabase, excluded: bool) {
        database.exclude_from_status = excluded;
        self.submit(database).await;
    }

    /// Turn the database record into an application record, deleting the
    /// original. Refused when the service already has an application with
    /// the same name.
    pub async fn convert_to_application(
        &self,
        database: &ServiceDatabase,
    ) -> Option<ServiceApplication> {
        match self
            .store
            .application_name_exists(&database.service_id, &database.name)
            .await
        {
            Ok(true) => {
                self.notifier.emit(
                    NotifyLevel::Error,
                    "An application with this name already exists.",
                );
                return None;
            }
            Ok(false) => {}
            Err(e) => {
                self.reporter.report("Failed to convert database", &e);
                return None;
            }
        }

        match self.store.convert_to_application(database).await {
            Ok(application) => {
                info!(
                    "Database {} converted to application {}",
                    database.id, application.id
                );
                self.notifier
                    .emit(NotifyLevel::Success, "Database converted to an application.");
                Some(application)
            }
            Err(e) => {
                self.reporter.report("Failed to convert database", &e);
                None
            }
        }
    }

    /// Refresh the status field from the container runtime.
    pub async fn refresh_status(&self, database: &mut ServiceDatabase) {
        let cmd = GetContainerStatusCmd {
            container_name: database.name.clone(),
        };

        match exec_local(&cmd, Duration::from_secs(10)).await {
            Ok(Some(status)) => {
                debug!("Container {} reports status {}", database.name, status);
                database.status = status;
            }
            Ok(None) => warn!("No status reported for container {}", database.name),
            Err(e) => warn!(
                "Failed to query status of container {}: {:#}",
                database.name, e
            ),
        }
    }

    fn check_exposure_preconditions(database: &ServiceDatabase) -> Result<(), ExposureError> {
        if database.public_port.is_none() {
            return Err(ExposureError::MissingPublicPort);
        }
        if !database.status.is_running() {
            return Err(ExposureError::NotRunning);
        }
        Ok(())
    }

    fn validate(&self, database: &ServiceDatabase) -> Result<()> {
        if database.image.trim().is_empty() {
            bail!("Image is required.");
        }
        Ok(())
    }

    async fn try_submit(&self, database: &ServiceDatabase) -> Result<()> {
        self.validate(database)?;
        self.store.save_database(database).await?;
        self.regenerator.update(database)?;
        Ok(())
    }

    // Best-effort save, then the unconditional regeneration hook. A failed
    // save is logged and swallowed; regeneration still runs so the derived
    // config converges on the next rebuild.
    async fn persist_and_regenerate(&self, database: &ServiceDatabase) {
        if let Err(e) = self.store.save_database(database).await {
            warn!("Failed to persist database {}: {}", database.id, e);
        }
        self.regenerator.regenerate(database);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{DatabaseStatus, HealthState, InstanceSettings};
    use crate::error::{ProxyError, StorageError};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct EventLog(Mutex<Vec<String>>);

    impl EventLog {
        fn push(&self, event: &str) {
            self.0.lock().unwrap().push(event.to_string());
        }

        fn events(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct MockProxy {
        log: Arc<EventLog>,
        starts: AtomicUsize,
        stops: AtomicUsize,
        fail_start: bool,
        fail_stop: bool,
    }

    #[async_trait]
    impl ProxyManager for MockProxy {
        async fn start(&self, _database: &ServiceDatabase) -> Result<(), ProxyError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(ProxyError::Other(anyhow!("bind refused")));
            }
            self.log.push("proxy.start");
            Ok(())
        }

        async fn stop(&self, _database: &ServiceDatabase) -> Result<(), ProxyError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail_stop {
                return Err(ProxyError::Other(anyhow!("actor wedged")));
            }
            self.log.push("proxy.stop");
            Ok(())
        }
    }

    struct MemoryStore {
        log: Arc<EventLog>,
        saved: Mutex<Vec<ServiceDatabase>>,
        existing_app_names: Vec<String>,
        converted: Mutex<Vec<ServiceApplication>>,
        fail_saves: bool,
    }

    #[async_trait]
    impl DatabaseStore for MemoryStore {
        async fn save_database(&self, database: &ServiceDatabase) -> Result<(), StorageError> {
            if self.fail_saves {
                return Err(StorageError::PoolUninitialized);
            }
            self.log.push("store.save");
            self.saved.lock().unwrap().push(database.clone());
            Ok(())
        }

        async fn get_database_by_id(
            &self,
            id: &str,
        ) -> Result<Option<ServiceDatabase>, StorageError> {
            let saved = self.saved.lock().unwrap();
            Ok(saved.iter().rev().find(|db| db.id == id).cloned())
        }

        async fn application_name_exists(
            &self,
            _service_id: &str,
            name: &str,
        ) -> Result<bool, StorageError> {
            Ok(self.existing_app_names.iter().any(|n| n == name))
        }

        async fn convert_to_application(
            &self,
            database: &ServiceDatabase,
        ) -> Result<ServiceApplication, StorageError> {
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
            self.log.push("store.convert");
            self.converted.lock().unwrap().push(application.clone());
            Ok(application)
        }
    }

    struct StubRegenerator {
        log: Arc<EventLog>,
        regenerations: AtomicUsize,
    }

    impl ConfigRegenerator for StubRegenerator {
        fn update(&self, _database: &ServiceDatabase) -> Result<()> {
            self.log.push("compose.update");
            Ok(())
        }

        fn regenerate(&self, _database: &ServiceDatabase) {
            self.regenerations.fetch_add(1, Ordering::SeqCst);
            self.log.push("regenerate");
        }
    }

    struct RecordingNotifier {
        log: Arc<EventLog>,
        events: Mutex<Vec<(NotifyLevel, String)>>,
    }

    impl Notifier for RecordingNotifier {
        fn emit(&self, level: NotifyLevel, message: &str) {
            match level {
                NotifyLevel::Success => self.log.push("notify.success"),
                NotifyLevel::Error => self.log.push("notify.error"),
            }
            self.events
                .lock()
                .unwrap()
                .push((level, message.to_string()));
        }
    }

    impl RecordingNotifier {
        fn messages(&self, level: NotifyLevel) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(l, _)| *l == level)
                .map(|(_, m)| m.clone())
                .collect()
        }
    }

    #[derive(Default)]
    struct Options {
        fail_start: bool,
        fail_stop: bool,
        fail_saves: bool,
        log_drain_enabled: bool,
        existing_app_names: Vec<String>,
    }

    struct Harness {
        service: DatabaseService,
        proxy: Arc<MockProxy>,
        store: Arc<MemoryStore>,
        regenerator: Arc<StubRegenerator>,
        notifier: Arc<RecordingNotifier>,
        log: Arc<EventLog>,
    }

    fn build(options: Options) -> Harness {
        let log = Arc::new(EventLog::default());
        let proxy = Arc::new(MockProxy {
            log: log.clone(),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            fail_start: options.fail_start,
            fail_stop: options.fail_stop,
        });
        let store = Arc::new(MemoryStore {
            log: log.clone(),
            saved: Mutex::new(Vec::new()),
            existing_app_names: options.existing_app_names,
            converted: Mutex::new(Vec::new()),
            fail_saves: options.fail_saves,
        });
        let regenerator = Arc::new(StubRegenerator {
            log: log.clone(),
            regenerations: AtomicUsize::new(0),
        });
        let notifier = Arc::new(RecordingNotifier {
            log: log.clone(),
            events: Mutex::new(Vec::new()),
        });
        let settings = Arc::new(SettingsManager::new(InstanceSettings {
            fqdn: "db.example.com".to_string(),
            log_drain_enabled: options.log_drain_enabled,
            ..InstanceSettings::default()
        }));

        let service = DatabaseService::new(
            store.clone(),
            proxy.clone(),
            regenerator.clone(),
            notifier.clone(),
            settings,
        );

        Harness {
            service,
            proxy,
            store,
            regenerator,
            notifier,
            log,
        }
    }

    fn running_database() -> ServiceDatabase {
        ServiceDatabase {
            id: Uuid::new_v4().to_string(),
            service_id: "svc-1".to_string(),
            name: "postgres-main".to_string(),
            human_name: None,
            description: None,
            image: "postgres:16".to_string(),
            status: DatabaseStatus::Running(HealthState::Healthy),
            is_public: false,
            public_port: Some(5432),
            is_log_drain_enabled: false,
            exclude_from_status: false,
            public_url: None,
        }
    }

    #[tokio::test]
    async fn enable_without_port_resets_toggle_and_skips_proxy() {
        let h = build(Options::default());
        let mut db = running_database();
        db.public_port = None;

        h.service.set_public_exposure(&mut db, true).await;

        assert!(!db.is_public);
        assert_eq!(h.proxy.starts.load(Ordering::SeqCst), 0);
        assert_eq!(
            h.notifier.messages(NotifyLevel::Error),
            vec!["Public port is required."]
        );
        assert!(h.store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn enable_when_not_running_resets_toggle_and_skips_proxy() {
        let h = build(Options::default());
        let mut db = running_database();
        db.status = "stopped".parse().unwrap();

        h.service.set_public_exposure(&mut db, true).await;

        assert!(!db.is_public);
        assert_eq!(h.proxy.starts.load(Ordering::SeqCst), 0);
        assert_eq!(
            h.notifier.messages(NotifyLevel::Error),
            vec!["Database must be started to be publicly accessible."]
        );
    }

    #[tokio::test]
    async fn enable_starts_proxy_derives_url_and_notifies_once() {
        let h = build(Options::default());
        let mut db = running_database();

        h.service.set_public_exposure(&mut db, true).await;

        assert!(db.is_public);
        assert_eq!(h.proxy.starts.load(Ordering::SeqCst), 1);
        assert_eq!(
            db.public_url.as_deref(),
            Some("postgres://db.example.com:5432")
        );
        assert_eq!(h.regenerator.regenerations.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.notifier.messages(NotifyLevel::Success),
            vec!["Database is now publicly accessible."]
        );
        assert!(h.notifier.messages(NotifyLevel::Error).is_empty());
    }

    // The substate string straight off the platform, end to end.
    #[tokio::test]
    async fn enable_accepts_running_healthy_substate() {
        let h = build(Options::default());
        let mut db = running_database();
        db.status = "running:healthy".parse().unwrap();

        h.service.set_public_exposure(&mut db, true).await;

        assert!(db.is_public);
        assert!(db.public_url.is_some());
        assert_eq!(h.proxy.starts.load(Ordering::SeqCst), 1);
        assert_eq!(h.regenerator.regenerations.load(Ordering::SeqCst), 1);
        assert_eq!(h.notifier.messages(NotifyLevel::Success).len(), 1);
    }

    #[tokio::test]
    async fn enable_path_keeps_the_specified_order() {
        let h = build(Options::default());
        let mut db = running_database();

        h.service.set_public_exposure(&mut db, true).await;

        assert_eq!(
            h.log.events(),
            vec!["proxy.start", "store.save", "regenerate", "notify.success"]
        );
    }

    #[tokio::test]
    async fn disable_stops_proxy_and_clears_url_idempotently() {
        let h = build(Options::default());
        let mut db = running_database();
        db.is_public = true;
        db.public_url = Some("postgres://db.example.com:5432".to_string());

        h.service.set_public_exposure(&mut db, false).await;
        assert!(!db.is_public);
        assert_eq!(db.public_url, None);

        // Second disable must not error
        h.service.set_public_exposure(&mut db, false).await;

        assert_eq!(h.proxy.stops.load(Ordering::SeqCst), 2);
        assert!(h.notifier.messages(NotifyLevel::Error).is_empty());
        assert_eq!(h.notifier.messages(NotifyLevel::Success).len(), 2);
    }

    #[tokio::test]
    async fn proxy_start_failure_is_reported_without_rollback() {
        let h = build(Options {
            fail_start: true,
            ..Options::default()
        });
        let mut db = running_database();

        h.service.set_public_exposure(&mut db, true).await;

        // No implicit rollback of the toggle on proxy failure
        assert!(db.is_public);
        assert_eq!(db.public_url, None);
        assert!(h.store.saved.lock().unwrap().is_empty());
        assert_eq!(h.regenerator.regenerations.load(Ordering::SeqCst), 0);
        let errors = h.notifier.messages(NotifyLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Failed to start database proxy"));
    }

    #[tokio::test]
    async fn proxy_stop_failure_is_reported_and_url_kept() {
        let h = build(Options {
            fail_stop: true,
            ..Options::default()
        });
        let mut db = running_database();
        db.is_public = true;
        db.public_url = Some("postgres://db.example.com:5432".to_string());

        h.service.set_public_exposure(&mut db, false).await;

        assert_eq!(
            db.public_url.as_deref(),
            Some("postgres://db.example.com:5432")
        );
        assert!(h.store.saved.lock().unwrap().is_empty());
        assert_eq!(h.notifier.messages(NotifyLevel::Error).len(), 1);
    }

    #[tokio::test]
    async fn save_failure_still_regenerates_and_notifies() {
        let h = build(Options {
            fail_saves: true,
            ..Options::default()
        });
        let mut db = running_database();

        h.service.set_public_exposure(&mut db, true).await;

        assert_eq!(h.regenerator.regenerations.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.notifier.messages(NotifyLevel::Success),
            vec!["Database is now publicly accessible."]
        );
    }

    #[tokio::test]
    async fn submit_validation_failure_still_regenerates() {
        let h = build(Options::default());
        let mut db = running_database();
        db.image = "".to_string();

        h.service.submit(&db).await;

        assert!(h.notifier.messages(NotifyLevel::Success).is_empty());
        assert!(h.store.saved.lock().unwrap().is_empty());
        assert_eq!(h.regenerator.regenerations.load(Ordering::SeqCst), 1);

        db.image = "postgres:16".to_string();
        h.service.submit(&db).await;
        assert_eq!(
            h.notifier.messages(NotifyLevel::Success),
            vec!["Database saved."]
        );
    }

    #[tokio::test]
    async fn log_drain_requires_server_capability() {
        let h = build(Options::default());
        let mut db = running_database();

        h.service.set_log_drain(&mut db, true).await;

        assert!(!db.is_log_drain_enabled);
        assert!(h.store.saved.lock().unwrap().is_empty());
        assert_eq!(
            h.notifier.messages(NotifyLevel::Error),
            vec!["Log drain is not enabled on the server. Please enable it first."]
        );
    }

    #[tokio::test]
    async fn log_drain_saves_and_asks_for_restart() {
        let h = build(Options {
            log_drain_enabled: true,
            ..Options::default()
        });
        let mut db = running_database();

        h.service.set_log_drain(&mut db, true).await;

        assert!(db.is_log_drain_enabled);
        assert_eq!(h.store.saved.lock().unwrap().len(), 1);
        let successes = h.notifier.messages(NotifyLevel::Success);
        assert_eq!(
            successes,
            vec![
                "Database saved.",
                "You need to restart the database for the changes to take effect."
            ]
        );
    }

    #[tokio::test]
    async fn exclude_from_status_submits() {
        let h = build(Options::default());
        let mut db = running_database();

        h.service.set_exclude_from_status(&mut db, true).await;

        assert!(db.exclude_from_status);
        let saved = h.store.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].exclude_from_status);
    }

    #[tokio::test]
    async fn convert_rejects_duplicate_application_name() {
        let h = build(Options {
            existing_app_names: vec!["postgres-main".to_string()],
            ..Options::default()
        });
        let db = running_database();

        let converted = h.service.convert_to_application(&db).await;

        assert!(converted.is_none());
        assert!(h.store.converted.lock().unwrap().is_empty());
        assert_eq!(
            h.notifier.messages(NotifyLevel::Error),
            vec!["An application with this name already exists."]
        );
    }

    #[tokio::test]
    async fn convert_creates_migrated_application() {
        let h = build(Options::default());
        let db = running_database();

        let converted = h.service.convert_to_application(&db).await.unwrap();

        assert!(converted.is_migrated);
        assert_eq!(converted.name, db.name);
        assert_eq!(h.store.converted.lock().unwrap().len(), 1);
    }
}
