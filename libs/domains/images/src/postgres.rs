use async_trait::async_trait;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Statement,
};

use crate::{
    entity::{embeddings, images, search_history},
    error::ImageResult,
    index::EntityId,
    models::{EmbeddingRecord, ImageRecord, NewImage, NewSearchRecord, SearchHistoryEntry},
    repository::{EmbeddingStore, ImageRepository, SearchHistoryRepository},
};

pub struct PgEmbeddingStore {
    db: DatabaseConnection,
}

impl PgEmbeddingStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EmbeddingStore for PgEmbeddingStore {
    async fn upsert(&self, record: EmbeddingRecord) -> ImageResult<()> {
        let image_id = record.image_id;
        let dimension = record.vector.len();
        let model = embeddings::ActiveModel {
            image_id: Set(record.image_id),
            vector: Set(record.vector),
            updated_at: Set(chrono::Utc::now().into()),
        };

        embeddings::Entity::insert(model)
            .on_conflict(
                OnConflict::column(embeddings::Column::ImageId)
                    .update_columns([embeddings::Column::Vector, embeddings::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        tracing::debug!(image_id, dimension, "Upserted embedding");
        Ok(())
    }

    async fn fetch_all(&self) -> ImageResult<Vec<EmbeddingRecord>> {
        let models = embeddings::Entity::find()
            .order_by_asc(embeddings::Column::ImageId)
            .all(&self.db)
            .await?;

        models.into_iter().map(EmbeddingRecord::try_from).collect()
    }
}

pub struct PgImageRepository {
    db: DatabaseConnection,
}

impl PgImageRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ImageRepository for PgImageRepository {
    async fn create(&self, image: NewImage) -> ImageResult<ImageRecord> {
        let active_model: images::ActiveModel = image.into();
        let model = images::Entity::insert(active_model)
            .exec_with_returning(&self.db)
            .await?;

        tracing::info!(image_id = model.id, filename = %model.filename, "Created image record");
        Ok(model.into())
    }

    async fn find_many(&self, ids: Vec<EntityId>) -> ImageResult<Vec<ImageRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let models = images::Entity::find()
            .filter(images::Column::Id.is_in(ids))
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn list_recent(&self, limit: u64) -> ImageResult<Vec<ImageRecord>> {
        let models = images::Entity::find()
            .order_by_desc(images::Column::UploadedAt)
            .order_by_desc(images::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn count(&self) -> ImageResult<u64> {
        Ok(images::Entity::find().count(&self.db).await?)
    }

    async fn delete(&self, id: EntityId) -> ImageResult<bool> {
        let result = images::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }

    async fn ping(&self) -> ImageResult<()> {
        let stmt = Statement::from_string(DatabaseBackend::Postgres, "SELECT 1".to_owned());
        self.db.query_one_raw(stmt).await?;
        Ok(())
    }
}

pub struct PgSearchHistoryRepository {
    db: DatabaseConnection,
}

impl PgSearchHistoryRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SearchHistoryRepository for PgSearchHistoryRepository {
    async fn append(&self, record: NewSearchRecord) -> ImageResult<()> {
        let active_model = search_history::ActiveModel::try_from(record)?;
        search_history::Entity::insert(active_model)
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn list_recent(&self, limit: u64) -> ImageResult<Vec<SearchHistoryEntry>> {
        let models = search_history::Entity::find()
            .order_by_desc(search_history::Column::CreatedAt)
            .order_by_desc(search_history::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;

        models.into_iter().map(SearchHistoryEntry::try_from).collect()
    }

    async fn count(&self) -> ImageResult<u64> {
        Ok(search_history::Entity::find().count(&self.db).await?)
    }
}
