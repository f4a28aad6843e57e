use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info, instrument, warn};

use super::{EntityId, IndexError, Slot, VectorIndex, ensure_finite};
use crate::error::ImageResult;
use crate::models::{IndexPhase, IndexStatus};
use crate::repository::EmbeddingStore;

/// Result of a live insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Appended to an existing index
    Inserted { slot: Slot },
    /// Already present, typically loaded with the startup snapshot
    AlreadyIndexed { slot: Slot },
    /// Index was absent; it now holds this single vector
    Initialized,
    /// Startup build still running; replayed once the snapshot is installed
    Deferred,
}

#[derive(Debug)]
enum IndexState {
    Pending {
        backlog: Vec<(EntityId, Vec<f32>)>,
    },
    Ready(VectorIndex),
}

/// Inserts buffered while the startup build runs, by default
pub const DEFAULT_BACKLOG_LIMIT: usize = 10_000;

/// Owns the vector index for the process lifetime.
///
/// Every mutation goes through [`IndexManager::apply_insert`] under the write
/// lock, so a slot and its entity id always become visible together. Searches
/// share the read lock through [`IndexManager::read`].
pub struct IndexManager {
    store: Arc<dyn EmbeddingStore>,
    state: RwLock<IndexState>,
    init_lock: Mutex<()>,
    backlog_limit: usize,
}

impl IndexManager {
    pub fn new(store: Arc<dyn EmbeddingStore>) -> Self {
        Self {
            store,
            state: RwLock::new(IndexState::Pending {
                backlog: Vec::new(),
            }),
            init_lock: Mutex::new(()),
            backlog_limit: DEFAULT_BACKLOG_LIMIT,
        }
    }

    /// Cap the inserts buffered before [`IndexManager::initialize`] succeeds.
    /// Inserts beyond it fail; the embedding store still holds them for the
    /// next build.
    pub fn with_backlog_limit(mut self, limit: usize) -> Self {
        self.backlog_limit = limit;
        self
    }

    /// Build the index from the embedding store snapshot.
    ///
    /// Reads the store once; later calls return the current status. The store
    /// is read without holding the index lock, so inserts arriving meanwhile
    /// are buffered and replayed on top of the snapshot.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> ImageResult<IndexStatus> {
        let _guard = self.init_lock.lock().await;
        if matches!(*self.state.read().await, IndexState::Ready(_)) {
            debug!("Index already initialized");
            return Ok(self.status().await);
        }

        let records = self.store.fetch_all().await?;
        let (ids, vectors): (Vec<EntityId>, Vec<Vec<f32>>) =
            records.into_iter().map(|r| (r.image_id, r.vector)).unzip();
        let index = VectorIndex::build(vectors, ids)?;

        if index.is_absent() {
            warn!("Embedding store is empty, index stays absent until the first upload");
        } else {
            info!(vectors = index.len(), dimension = ?index.dimension(), "Index built from embedding store");
        }

        let mut state = self.state.write().await;
        let previous = std::mem::replace(&mut *state, IndexState::Ready(index));
        if let (IndexState::Pending { backlog }, IndexState::Ready(index)) = (previous, &mut *state) {
            replay(index, backlog);
        }
        drop(state);

        Ok(self.status().await)
    }

    /// Apply one live insert. The embedding must already be durable.
    #[instrument(skip(self, vector), fields(dimension = vector.len()))]
    pub async fn apply_insert(
        &self,
        id: EntityId,
        vector: Vec<f32>,
    ) -> Result<InsertOutcome, IndexError> {
        ensure_finite(&vector)?;

        let mut state = self.state.write().await;
        match &mut *state {
            IndexState::Pending { backlog } => {
                if backlog.len() >= self.backlog_limit {
                    warn!(image_id = id, buffered = backlog.len(), "Startup backlog full, insert dropped");
                    return Err(IndexError::BacklogFull(backlog.len()));
                }
                backlog.push((id, vector));
                debug!(image_id = id, buffered = backlog.len(), "Index initializing, insert deferred");
                Ok(InsertOutcome::Deferred)
            }
            IndexState::Ready(index) => insert_into(index, id, vector),
        }
    }

    /// Shared read access for searches.
    ///
    /// Fails with [`IndexError::Initializing`] before the startup build has
    /// completed. Hold the guard only for the in-memory search.
    pub async fn read(&self) -> Result<RwLockReadGuard<'_, VectorIndex>, IndexError> {
        RwLockReadGuard::try_map(self.state.read().await, |state| match state {
            IndexState::Ready(index) => Some(index),
            IndexState::Pending { .. } => None,
        })
        .map_err(|_| IndexError::Initializing)
    }

    pub async fn status(&self) -> IndexStatus {
        match &*self.state.read().await {
            IndexState::Pending { .. } => IndexStatus {
                state: IndexPhase::Initializing,
                vectors: 0,
                dimension: None,
            },
            IndexState::Ready(index) => IndexStatus {
                state: if index.is_absent() {
                    IndexPhase::Empty
                } else {
                    IndexPhase::Ready
                },
                vectors: index.len(),
                dimension: index.dimension(),
            },
        }
    }
}

fn insert_into(
    index: &mut VectorIndex,
    id: EntityId,
    vector: Vec<f32>,
) -> Result<InsertOutcome, IndexError> {
    if index.is_absent() {
        *index = VectorIndex::build(vec![vector], vec![id])?;
        info!(image_id = id, dimension = ?index.dimension(), "Index created from first upload");
        return Ok(InsertOutcome::Initialized);
    }

    // The upsert reached the store before the snapshot was read
    if let Some(slot) = index.slot_of(id) {
        debug!(image_id = id, slot, "Vector already indexed");
        return Ok(InsertOutcome::AlreadyIndexed { slot });
    }

    let slot = index.insert(id, &vector)?;
    debug!(image_id = id, slot, vectors = index.len(), "Vector added to index");
    Ok(InsertOutcome::Inserted { slot })
}

fn replay(index: &mut VectorIndex, backlog: Vec<(EntityId, Vec<f32>)>) {
    if backlog.is_empty() {
        return;
    }

    let total = backlog.len();
    let mut applied = 0usize;
    for (id, vector) in backlog {
        match insert_into(index, id, vector) {
            Ok(InsertOutcome::AlreadyIndexed { .. }) => {}
            Ok(_) => applied += 1,
            Err(e) => warn!(image_id = id, error = %e, "Dropping buffered insert"),
        }
    }
    info!(buffered = total, applied, vectors = index.len(), "Replayed inserts received during startup");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmbeddingRecord;
    use crate::repository::{InMemoryEmbeddingStore, MockEmbeddingStore};
    use crate::error::ImageError;
    use std::collections::HashSet;

    fn record(image_id: EntityId, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord { image_id, vector }
    }

    async fn seeded(records: Vec<EmbeddingRecord>) -> Arc<IndexManager> {
        let store = InMemoryEmbeddingStore::new();
        for r in records {
            store.upsert(r).await.unwrap();
        }
        Arc::new(IndexManager::new(Arc::new(store)))
    }

    #[tokio::test]
    async fn test_read_before_initialize_is_initializing() {
        let manager = seeded(vec![]).await;
        assert_eq!(manager.read().await.unwrap_err(), IndexError::Initializing);
        assert_eq!(manager.status().await.state, IndexPhase::Initializing);
    }

    #[tokio::test]
    async fn test_initialize_from_store() {
        let manager = seeded(vec![record(1, vec![1.0, 0.0]), record(2, vec![0.0, 1.0])]).await;

        let status = manager.initialize().await.unwrap();
        assert_eq!(status.state, IndexPhase::Ready);
        assert_eq!(status.vectors, 2);
        assert_eq!(status.dimension, Some(2));

        let index = manager.read().await.unwrap();
        assert_eq!(index.entity_at(0), Some(1));
        assert_eq!(index.entity_at(1), Some(2));
    }

    #[tokio::test]
    async fn test_initialize_reads_store_once() {
        let mut store = MockEmbeddingStore::new();
        store
            .expect_fetch_all()
            .times(1)
            .returning(|| Ok(vec![EmbeddingRecord { image_id: 5, vector: vec![1.0] }]));

        let manager = IndexManager::new(Arc::new(store));
        manager.initialize().await.unwrap();
        let status = manager.initialize().await.unwrap();
        assert_eq!(status.vectors, 1);
    }

    #[tokio::test]
    async fn test_initialize_store_failure_keeps_pending() {
        let mut store = MockEmbeddingStore::new();
        store
            .expect_fetch_all()
            .returning(|| Err(ImageError::StorageFailure("connection reset".into())));

        let manager = IndexManager::new(Arc::new(store));
        assert!(matches!(manager.initialize().await, Err(ImageError::StorageFailure(_))));
        assert_eq!(manager.status().await.state, IndexPhase::Initializing);
    }

    #[tokio::test]
    async fn test_initialize_rejects_mixed_dimensions() {
        let manager = seeded(vec![record(1, vec![1.0, 0.0]), record(2, vec![1.0])]).await;
        assert!(matches!(
            manager.initialize().await,
            Err(ImageError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[tokio::test]
    async fn test_empty_store_self_heals_on_first_insert() {
        let manager = seeded(vec![]).await;
        let status = manager.initialize().await.unwrap();
        assert_eq!(status.state, IndexPhase::Empty);
        assert_eq!(
            manager.read().await.unwrap().search(&[1.0, 0.0], 1),
            Err(IndexError::NotInitialized)
        );

        let outcome = manager.apply_insert(9, vec![0.5, 0.5]).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Initialized);

        let index = manager.read().await.unwrap();
        let hits = index.search_entities(&[0.5, 0.5], 3).unwrap();
        assert_eq!(hits, vec![(9, 0.0)]);
    }

    #[tokio::test]
    async fn test_inserts_during_startup_are_replayed() {
        let manager = seeded(vec![record(1, vec![1.0, 0.0])]).await;

        assert_eq!(manager.apply_insert(1, vec![1.0, 0.0]).await.unwrap(), InsertOutcome::Deferred);
        assert_eq!(manager.apply_insert(2, vec![0.0, 1.0]).await.unwrap(), InsertOutcome::Deferred);
        assert_eq!(manager.apply_insert(3, vec![1.0]).await.unwrap(), InsertOutcome::Deferred);

        let status = manager.initialize().await.unwrap();
        // id 1 came with the snapshot, id 3 has the wrong dimension
        assert_eq!(status.vectors, 2);
        let index = manager.read().await.unwrap();
        assert_eq!(index.entity_at(1), Some(2));
    }

    #[tokio::test]
    async fn test_apply_insert_rejects_without_side_effects() {
        let manager = seeded(vec![record(1, vec![0.0; 512])]).await;
        manager.initialize().await.unwrap();

        assert_eq!(
            manager.apply_insert(2, vec![0.0; 256]).await,
            Err(IndexError::DimensionMismatch { expected: 512, actual: 256 })
        );
        assert_eq!(manager.apply_insert(3, vec![f32::NAN; 512]).await, Err(IndexError::NonFinite));
        assert_eq!(manager.status().await.vectors, 1);
    }

    #[tokio::test]
    async fn test_insert_of_snapshot_entity_is_already_indexed() {
        let manager = seeded(vec![record(3, vec![0.0, 1.0]), record(7, vec![1.0, 0.0])]).await;
        manager.initialize().await.unwrap();

        let outcome = manager.apply_insert(7, vec![1.0, 0.0]).await.unwrap();
        assert_eq!(outcome, InsertOutcome::AlreadyIndexed { slot: 1 });
        assert_eq!(manager.status().await.vectors, 2);

        let index = manager.read().await.unwrap();
        assert_eq!(index.search_entities(&[1.0, 0.0], 1).unwrap(), vec![(7, 0.0)]);
    }

    #[tokio::test]
    async fn test_backlog_limit_rejects_excess_inserts() {
        let store = InMemoryEmbeddingStore::new();
        let manager = IndexManager::new(Arc::new(store)).with_backlog_limit(2);

        assert_eq!(manager.apply_insert(1, vec![1.0]).await.unwrap(), InsertOutcome::Deferred);
        assert_eq!(manager.apply_insert(2, vec![2.0]).await.unwrap(), InsertOutcome::Deferred);
        assert_eq!(manager.apply_insert(3, vec![3.0]).await, Err(IndexError::BacklogFull(2)));

        let status = manager.initialize().await.unwrap();
        assert_eq!(status.vectors, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_keep_mapping_dense() {
        const EXISTING: i64 = 20;
        const NEW: i64 = 200;

        let manager = seeded((0..EXISTING).map(|i| record(i, vec![i as f32, 1.0])).collect()).await;
        manager.initialize().await.unwrap();

        let mut handles = Vec::new();
        for id in EXISTING..EXISTING + NEW {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.apply_insert(id, vec![id as f32, 0.0]).await
            }));
        }
        // Searches run alongside the writers
        for _ in 0..20 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                let index = manager.read().await.unwrap();
                let n = index.len();
                assert!((0..n).all(|slot| index.entity_at(slot).is_some()));
                Ok(InsertOutcome::Deferred)
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let index = manager.read().await.unwrap();
        let total = (EXISTING + NEW) as usize;
        assert_eq!(index.len(), total);

        let ids: HashSet<EntityId> = (0..total).filter_map(|slot| index.entity_at(slot)).collect();
        assert_eq!(ids.len(), total);
        assert_eq!(ids, (0..EXISTING + NEW).collect::<HashSet<_>>());
    }
}
