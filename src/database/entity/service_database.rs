use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "service_databases")]
pub struct Model {
    #[sea_orm(primary_key, column_type = "String(StringLen::N(255))")]
    pub id: String, // UUID
    pub service_id: String,
    pub name: String, // container name on the deployment network
    pub human_name: Option<String>,
    pub description: Option<String>,
    pub image: String,

    // "status:health", e.g. "running:healthy"
    pub status: String,

    // Public exposure
    pub is_public: bool,
    pub public_port: Option<i32>,

    pub is_log_drain_enabled: bool,
    pub exclude_from_status: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
