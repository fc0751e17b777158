//! In-app notification entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub message: String,

    /// announcement, system, booking, approval or direct
    #[sea_orm(column_type = "Text")]
    pub kind: String,

    pub sent_by: Uuid,

    #[sea_orm(column_type = "Text")]
    pub target_role: String,

    pub recipient: Option<Uuid>,

    pub read_by_recipient: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
