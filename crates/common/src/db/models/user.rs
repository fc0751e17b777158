//! User account entity (owned by the identity/profile service, read here)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub email: String,

    /// student, mentor or admin
    #[sea_orm(column_type = "Text")]
    pub role: String,

    /// pending, approved or rejected (mentors only)
    #[sea_orm(column_type = "Text")]
    pub approval_status: String,

    /// Legacy per-user session price
    pub session_price: Option<f64>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::mentor_profile::Entity")]
    MentorProfile,
}

impl Related<super::mentor_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MentorProfile.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
