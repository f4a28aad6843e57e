use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SearchHistory::Table)
                    .if_not_exists()
                    .col(big_integer(SearchHistory::Id).auto_increment().primary_key())
                    .col(uuid_uniq(SearchHistory::QueryId))
                    .col(string(SearchHistory::QueryFilename))
                    .col(json_binary(SearchHistory::Results).default("[]"))
                    .col(
                        timestamp_with_time_zone(SearchHistory::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_search_history_created_at")
                    .table(SearchHistory::Table)
                    .col(SearchHistory::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SearchHistory::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SearchHistory {
    Table,
    Id,
    QueryId,
    QueryFilename,
    Results,
    CreatedAt,
}
