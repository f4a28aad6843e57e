use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::entity::prelude::*;

use crate::error::ImageError;
use crate::models::{NewSearchRecord, SearchHistoryEntry, SearchHit};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "search_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub query_id: Uuid,
    pub query_filename: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub results: Json,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for SearchHistoryEntry {
    type Error = ImageError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let results: Vec<SearchHit> = serde_json::from_value(model.results)?;
        Ok(Self {
            query_id: model.query_id,
            query_filename: model.query_filename,
            result_count: results.len(),
            results,
            created_at: model.created_at.into(),
        })
    }
}

impl TryFrom<NewSearchRecord> for ActiveModel {
    type Error = ImageError;

    fn try_from(input: NewSearchRecord) -> Result<Self, Self::Error> {
        Ok(ActiveModel {
            id: NotSet,
            query_id: Set(input.query_id),
            query_filename: Set(input.query_filename),
            results: Set(serde_json::to_value(&input.results)?),
            created_at: Set(chrono::Utc::now().into()),
        })
    }
}
