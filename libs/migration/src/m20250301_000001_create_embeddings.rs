use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000000_create_images::Images;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One vector per image; the primary key doubles as the upsert conflict target
        manager
            .create_table(
                Table::create()
                    .table(Embeddings::Table)
                    .if_not_exists()
                    .col(big_integer(Embeddings::ImageId).primary_key())
                    .col(array(Embeddings::Vector, ColumnType::Float))
                    .col(
                        timestamp_with_time_zone(Embeddings::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_embeddings_image_id")
                            .from(Embeddings::Table, Embeddings::ImageId)
                            .to(Images::Table, Images::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Embeddings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Embeddings {
    Table,
    ImageId,
    Vector,
    UpdatedAt,
}
