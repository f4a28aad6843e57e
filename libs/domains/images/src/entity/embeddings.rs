use sea_orm::entity::prelude::*;

use crate::error::ImageError;
use crate::models::EmbeddingRecord;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "embeddings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub image_id: i64,
    /// `REAL[]`
    pub vector: Vec<f32>,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::images::Entity",
        from = "Column::ImageId",
        to = "super::images::Column::Id",
        on_delete = "Cascade"
    )]
    Image,
}

impl Related<super::images::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Image.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for EmbeddingRecord {
    type Error = ImageError;

    /// A zero-length stored vector is a data-integrity fault
    fn try_from(model: Model) -> Result<Self, Self::Error> {
        if model.vector.is_empty() {
            return Err(ImageError::StorageFailure(format!(
                "embedding for image {} is empty",
                model.image_id
            )));
        }
        Ok(Self {
            image_id: model.image_id,
            vector: model.vector,
        })
    }
}
