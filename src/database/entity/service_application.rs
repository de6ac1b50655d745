use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "service_applications")]
pub struct Model {
    #[sea_orm(primary_key, column_type = "String(StringLen::N(255))")]
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

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
