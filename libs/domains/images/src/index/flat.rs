use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use super::{EntityId, IndexError, Slot, ensure_finite};

/// One search result: slot and squared L2 distance to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub slot: Slot,
    pub distance: f32,
}

impl Eq for Neighbor {}

impl Ord for Neighbor {
    /// Closer first, then lower slot
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.slot.cmp(&other.slot))
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Exact brute-force index using squared Euclidean distance.
///
/// Vectors live contiguously in `data`, `dimension` floats per slot. `ids[slot]`
/// is the entity stored at that slot, so `ids.len() * dimension == data.len()`
/// always holds. Storage only grows.
#[derive(Debug, Clone)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
    ids: Vec<EntityId>,
    slots: HashMap<EntityId, Slot>,
}

impl FlatL2Index {
    pub fn new(dimension: usize) -> Result<Self, IndexError> {
        Self::with_capacity(dimension, 0)
    }

    pub fn with_capacity(dimension: usize, capacity: usize) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::EmptyVector);
        }
        Ok(Self {
            dimension,
            data: Vec::with_capacity(dimension * capacity),
            ids: Vec::with_capacity(capacity),
            slots: HashMap::with_capacity(capacity),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn slot_of(&self, id: EntityId) -> Option<Slot> {
        self.slots.get(&id).copied()
    }

    pub fn entity_at(&self, slot: Slot) -> Option<EntityId> {
        self.ids.get(slot).copied()
    }

    /// Append `vector` for `id`. Nothing is written unless every check passes.
    pub fn insert(&mut self, id: EntityId, vector: &[f32]) -> Result<Slot, IndexError> {
        self.check_dimension(vector)?;
        ensure_finite(vector)?;
        if self.slots.contains_key(&id) {
            return Err(IndexError::DuplicateEntity(id));
        }

        let slot = self.ids.len();
        self.data.extend_from_slice(vector);
        self.ids.push(id);
        self.slots.insert(id, slot);
        Ok(slot)
    }

    /// The `k` nearest slots in ascending distance, ties by ascending slot.
    ///
    /// `k` larger than the corpus returns everything; `k == 0` returns nothing.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        self.check_dimension(query)?;
        ensure_finite(query)?;

        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        // Max-heap of the best k so far; the root is the worst kept candidate
        let mut best: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(k + 1);
        for (slot, stored) in self.data.chunks_exact(self.dimension).enumerate() {
            let candidate = Neighbor {
                slot,
                distance: squared_l2(query, stored),
            };
            if best.len() < k {
                best.push(candidate);
            } else if best.peek().is_some_and(|worst| candidate < *worst) {
                best.pop();
                best.push(candidate);
            }
        }

        Ok(best.into_sorted_vec())
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
