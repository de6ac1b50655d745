use crate::database::models::ServiceDatabase;
use anyhow::{Context, Result};
use log::{debug, warn};
use serde_json::json;
use std::path::PathBuf;

/// Rebuilds the derived deployment configuration for a database. `update` is
/// the fallible save-path write; `regenerate` is the fire-and-forget hook
/// that runs after every mutation, failures logged and never propagated.
pub trait ConfigRegenerator: Send + Sync {
    fn update(&self, database: &ServiceDatabase) -> Result<()>;

    fn regenerate(&self, database: &ServiceDatabase);
}

/// Writes one compose fragment per database (compose accepts JSON) with the
/// published port mapping when the database is public.
pub struct ComposeRegenerator {
    out_dir: PathBuf,
}

impl ComposeRegenerator {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }

    fn fragment(database: &ServiceDatabase) -> serde_json::Value {
        let mut service = json!({
            "image": database.image,
            "container_name": database.name,
            "restart": "always",
        });

        if database.is_public {
            if let (Some(public_port), Some(kind)) = (database.public_port, database.kind()) {
                service["ports"] = json!([format!("{}:{}", public_port, kind.internal_port())]);
            }
        }

        let mut services = serde_json::Map::new();
        services.insert(database.name.clone(), service);

        json!({ "services": services })
    }

    fn write_fragment(&self, database: &ServiceDatabase) -> Result<()> {
        std::fs::create_dir_all(&self.out_dir).context("Failed to create compose directory")?;

        let path = self.out_dir.join(format!("{}.json", database.name));
        let fragment = Self::fragment(database);
        let content =
            serde_json::to_string_pretty(&fragment).context("Failed to render compose fragment")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write compose fragment: {}", path.display()))?;

        debug!("Compose fragment written: {}", path.display());
        Ok(())
    }
}

impl ConfigRegenerator for ComposeRegenerator {
    fn update(&self, database: &ServiceDatabase) -> Result<()> {
        self.write_fragment(database)
    }

    fn regenerate(&self, database: &ServiceDatabase) {
        if let Err(e) = self.write_fragment(database) {
            warn!(
                "Failed to regenerate compose for database {}: {:#}",
                database.id, e
            );
        }
    }
}
