//! RepoQuery entity - which search queries reported which repository.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A (repository, query) provenance pair. Both columns form the key.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "repo_queries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub full_name: String,
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub query: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    // No foreign key in the schema: provenance may be recorded before the
    // entry itself is written.
    #[sea_orm(
        belongs_to = "super::repo::Entity",
        from = "Column::FullName",
        to = "super::repo::Column::FullName"
    )]
    Repo,
}

impl Related<super::repo::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Repo.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
