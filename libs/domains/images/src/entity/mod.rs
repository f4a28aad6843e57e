//! sea-orm entities for the `images`, `embeddings` and `search_history` tables

pub mod embeddings;
pub mod images;
pub mod search_history;
