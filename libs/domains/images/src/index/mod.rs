//! In-memory exact nearest-neighbour index over image embeddings.
//!
//! [`FlatL2Index`] is the append-only arena, [`VectorIndex`] adds the absent
//! state of a deployment with no embeddings yet, and [`IndexManager`] owns the
//! index for the process lifetime and is the only writer.

mod flat;
mod manager;

pub use flat::{FlatL2Index, Neighbor};
pub use manager::{IndexManager, InsertOutcome};

use thiserror::Error;

/// Durable image identifier assigned by the metadata store
pub type EntityId = i64;

/// Dense zero-based position inside the index, in insertion order
pub type Slot = usize;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index has not been initialized")]
    NotInitialized,

    #[error("index is still being built")]
    Initializing,

    #[error("vector contains NaN or infinite components")]
    NonFinite,

    #[error("vector has zero dimensions")]
    EmptyVector,

    #[error("entity {0} is already indexed")]
    DuplicateEntity(EntityId),

    #[error("{0} inserts already buffered while the index is being built")]
    BacklogFull(usize),

    #[error("{vectors} vectors supplied with {ids} ids")]
    IdCountMismatch { vectors: usize, ids: usize },
}

/// An index that may be absent.
///
/// Absent is a valid state: a fresh deployment has no vectors, so there is no
/// dimension to fix and nothing to search.
#[derive(Debug, Default)]
pub struct VectorIndex {
    flat: Option<FlatL2Index>,
}

impl VectorIndex {
    pub fn absent() -> Self {
        Self { flat: None }
    }

    /// Build from parallel `vectors` and `ids`. Empty input yields an absent index.
    pub fn build(vectors: Vec<Vec<f32>>, ids: Vec<EntityId>) -> Result<Self, IndexError> {
        if vectors.len() != ids.len() {
            return Err(IndexError::IdCountMismatch {
                vectors: vectors.len(),
                ids: ids.len(),
            });
        }
        if vectors.is_empty() {
            return Ok(Self::absent());
        }

        let dimension = vectors[0].len();
        let mut flat = FlatL2Index::with_capacity(dimension, vectors.len())?;
        for (id, vector) in ids.into_iter().zip(vectors) {
            flat.insert(id, &vector)?;
        }
        Ok(Self { flat: Some(flat) })
    }

    pub fn is_absent(&self) -> bool {
        self.flat.is_none()
    }

    /// Number of stored vectors; zero when absent
    pub fn len(&self) -> usize {
        self.flat.as_ref().map_or(0, FlatL2Index::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> Option<usize> {
        self.flat.as_ref().map(FlatL2Index::dimension)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.flat.as_ref().is_some_and(|flat| flat.contains(id))
    }

    pub fn slot_of(&self, id: EntityId) -> Option<Slot> {
        self.flat.as_ref().and_then(|flat| flat.slot_of(id))
    }

    pub fn insert(&mut self, id: EntityId, vector: &[f32]) -> Result<Slot, IndexError> {
        self.flat
            .as_mut()
            .ok_or(IndexError::NotInitialized)?
            .insert(id, vector)
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        self.flat
            .as_ref()
            .ok_or(IndexError::NotInitialized)?
            .search(query, k)
    }

    pub fn entity_at(&self, slot: Slot) -> Option<EntityId> {
        self.flat.as_ref().and_then(|flat| flat.entity_at(slot))
    }

    /// Search and resolve slots to entities against this same snapshot
    pub fn search_entities(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(EntityId, f32)>, IndexError> {
        Ok(self
            .search(query, k)?
            .into_iter()
            .filter_map(|n| self.entity_at(n.slot).map(|id| (id, n.distance)))
            .collect())
    }
}

pub(crate) fn ensure_finite(vector: &[f32]) -> Result<(), IndexError> {
    if vector.is_empty() {
        return Err(IndexError::EmptyVector);
    }
    if vector.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(IndexError::NonFinite)
    }
}
