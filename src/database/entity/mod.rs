pub mod instance_settings;
pub mod service_application;
pub mod service_database;

pub use instance_settings::Entity as InstanceSettings;
pub use service_application::Entity as ServiceApplication;
pub use service_database::Entity as ServiceDatabase;
