pub use sea_orm_migration::prelude::*;

mod m20250301_000000_create_images;
mod m20250301_000001_create_embeddings;
mod m20250301_000002_create_search_history;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000000_create_images::Migration),
            Box::new(m20250301_000001_create_embeddings::Migration),
            Box::new(m20250301_000002_create_search_history::Migration),
        ]
    }
}
