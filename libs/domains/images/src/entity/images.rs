use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{ImageRecord, NewImage};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "images")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub filename: String,
    pub filepath: String,
    pub uploaded_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::embeddings::Entity")]
    Embedding,
}

impl Related<super::embeddings::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Embedding.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for ImageRecord {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            filename: model.filename,
            filepath: model.filepath,
            uploaded_at: model.uploaded_at.into(),
        }
    }
}

impl From<NewImage> for ActiveModel {
    fn from(input: NewImage) -> Self {
        ActiveModel {
            id: NotSet,
            filename: Set(input.filename),
            filepath: Set(input.filepath),
            uploaded_at: Set(chrono::Utc::now().into()),
        }
    }
}
