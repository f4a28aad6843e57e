//! Request-scoped orchestration over the index and the collaborators

mod ingest;
mod search;

pub use ingest::{INGEST_CONCURRENCY, IngestPipeline};
pub use search::{QueryStage, SearchPipeline};
