use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Images::Table)
                    .if_not_exists()
                    .col(big_integer(Images::Id).auto_increment().primary_key())
                    .col(string(Images::Filename))
                    .col(string(Images::Filepath))
                    .col(
                        timestamp_with_time_zone(Images::UploadedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Upload history and the dashboard read newest first
        manager
            .create_index(
                Index::create()
                    .name("idx_images_uploaded_at")
                    .table(Images::Table)
                    .col(Images::UploadedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Images::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Images {
    Table,
    Id,
    Filename,
    Filepath,
    UploadedAt,
}
