// Persistence reconciler - primary store first, fallback cache on failure
use crate::application::defect_repository::{DefectRepository, StoreError, StoredDefect};
use crate::application::fallback_cache::FallbackCache;
use crate::application::notifications::CacheInvalidator;
use crate::domain::defect::DefectRecord;
use crate::domain::error::AnalysisError;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Where each input record ended up. Every input lands in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersistedBatch {
    pub persisted: Vec<StoredDefect>,
    pub fallback: Vec<StoredDefect>,
}

impl PersistedBatch {
    pub fn len(&self) -> usize {
        self.persisted.len() + self.fallback.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when any record is held only by the fallback cache
    pub fn is_degraded(&self) -> bool {
        !self.fallback.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &StoredDefect> {
        self.persisted.iter().chain(self.fallback.iter())
    }
}

#[derive(Clone)]
pub struct PersistenceReconciler {
    repository: Arc<dyn DefectRepository>,
    cache: Arc<FallbackCache>,
    invalidator: Arc<dyn CacheInvalidator>,
}

impl PersistenceReconciler {
    pub fn new(
        repository: Arc<dyn DefectRepository>,
        cache: Arc<FallbackCache>,
        invalidator: Arc<dyn CacheInvalidator>,
    ) -> Self {
        Self {
            repository,
            cache,
            invalidator,
        }
    }

    /// Commit every record, one at a time, to the primary store or the fallback cache.
    ///
    /// Not atomic across records. Only a fallback-cache failure is returned as an error,
    /// and only after every record has been attempted and whatever landed is indexed.
    pub async fn persist(&self, records: Vec<DefectRecord>) -> Result<PersistedBatch, AnalysisError> {
        let total = records.len();
        let mut batch = PersistedBatch::default();
        let mut missions: Vec<Uuid> = Vec::new();
        let mut lost: Vec<AnalysisError> = Vec::new();

        for record in records {
            if !missions.contains(&record.mission_id) {
                missions.push(record.mission_id);
            }

            match self.write_primary(&record).await {
                Ok(stored) => batch.persisted.push(stored),
                Err(err) => {
                    tracing::warn!(
                        "Primary store rejected {} defect for mission {}: {}; keeping it in the fallback cache",
                        record.defect_type,
                        record.mission_id,
                        err
                    );
                    match self.cache.append(record) {
                        Ok(entry) => batch.fallback.push(entry),
                        Err(cache_err) => {
                            tracing::error!("Defect lost, fallback cache refused it: {}", cache_err);
                            lost.push(cache_err);
                        }
                    }
                }
            }
        }

        let entries: Vec<StoredDefect> = batch.entries().cloned().collect();
        let indexed = self.cache.index_batch(&entries);
        for mission_id in missions {
            self.invalidator.invalidate(mission_id);
        }
        indexed?;

        if let Some(first) = lost.first() {
            return Err(AnalysisError::PersistenceExhausted(format!(
                "{} of {} defect(s) could not be stored ({} primary, {} fallback): {}",
                lost.len(),
                total,
                batch.persisted.len(),
                batch.fallback.len(),
                first
            )));
        }

        if batch.is_degraded() {
            tracing::warn!(
                "Persisted {} defect(s), {} held in the fallback cache",
                batch.persisted.len(),
                batch.fallback.len()
            );
        } else {
            tracing::info!("Persisted {} defect(s) to the primary store", batch.persisted.len());
        }
        Ok(batch)
    }

    /// Insert, retrying exactly once without the image reference if the image is gone
    async fn write_primary(&self, record: &DefectRecord) -> Result<StoredDefect, StoreError> {
        let result = self.repository.insert_defect(record).await;
        match (result, record.mission_image_id) {
            (Err(err), Some(mission_image_id)) if err.is_missing_image() => {
                tracing::warn!(
                    "{} ({}); retrying once without the image reference",
                    AnalysisError::ReferentialIntegrity { mission_image_id },
                    err
                );
                self.repository.insert_defect(&record.orphaned()).await
            }
            (result, _) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::defect_repository::StorageLocation;
    use crate::application::test_support::{sample_record, RecordingInvalidator, RejectingRepository};
    use crate::infrastructure::memory_defect_repository::MemoryDefectRepository;
    use std::collections::HashSet;

    fn reconciler(
        repository: Arc<dyn DefectRepository>,
        cache: Arc<FallbackCache>,
    ) -> (PersistenceReconciler, Arc<RecordingInvalidator>) {
        let invalidator = Arc::new(RecordingInvalidator::default());
        (
            PersistenceReconciler::new(repository, cache, invalidator.clone()),
            invalidator,
        )
    }

    #[tokio::test]
    async fn test_all_records_reach_primary_store() {
        let mission = Uuid::new_v4();
        let image = Uuid::new_v4();
        let repository = Arc::new(MemoryDefectRepository::enforcing());
        repository.register_mission(mission);
        repository.register_image(image);

        let cache = Arc::new(FallbackCache::new());
        let (reconciler, invalidator) = reconciler(repository.clone(), cache.clone());

        let records: Vec<_> = (0..3).map(|_| sample_record(mission, Some(image), 0.8)).collect();
        let batch = reconciler.persist(records).await.unwrap();

        assert_eq!(batch.persisted.len(), 3);
        assert!(!batch.is_degraded());
        assert!(batch.persisted.iter().all(|s| s.location == StorageLocation::Primary));
        assert_eq!(repository.row_count(), 3);
        assert_eq!(cache.indexed_entries(mission).unwrap().len(), 3);
        assert_eq!(cache.fallback_len(), 0);
        assert_eq!(invalidator.missions(), vec![mission]);
    }

    #[tokio::test]
    async fn test_deleted_image_is_retried_once_without_reference() {
        let mission = Uuid::new_v4();
        let image = Uuid::new_v4();
        let repository = Arc::new(MemoryDefectRepository::enforcing());
        repository.register_mission(mission);
        repository.register_image(image);
        repository.delete_image(image);

        let (reconciler, _) = reconciler(repository.clone(), Arc::new(FallbackCache::new()));
        let batch = reconciler.persist(vec![sample_record(mission, Some(image), 0.8)]).await.unwrap();

        assert_eq!(batch.persisted.len(), 1);
        assert_eq!(batch.persisted[0].record.mission_image_id, None);
        assert_eq!(repository.row_count(), 1);
    }

    #[tokio::test]
    async fn test_referential_retry_happens_exactly_once() {
        let mission = Uuid::new_v4();
        let image = Uuid::new_v4();
        let repository = Arc::new(RejectingRepository::new(StoreError::foreign_key(
            Some("mission_image_id"),
            "inspection_results_mission_image_id_fkey",
        )));
        let cache = Arc::new(FallbackCache::new());
        let (reconciler, _) = reconciler(repository.clone(), cache.clone());

        let batch = reconciler.persist(vec![sample_record(mission, Some(image), 0.8)]).await.unwrap();

        let attempts = repository.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].mission_image_id, Some(image));
        assert_eq!(attempts[1].mission_image_id, None);
        assert_eq!(batch.fallback.len(), 1);
        assert_eq!(cache.fallback_entries(mission).len(), 1);
    }

    #[tokio::test]
    async fn test_mission_reference_failure_keeps_image_and_is_not_retried() {
        let repository = Arc::new(RejectingRepository::new(StoreError::foreign_key(
            Some("mission_id"),
            "Key (mission_id)=(...) is not present",
        )));
        let cache = Arc::new(FallbackCache::new());
        let (reconciler, _) = reconciler(repository.clone(), cache.clone());

        let mission = Uuid::new_v4();
        let image = Uuid::new_v4();
        let batch = reconciler.persist(vec![sample_record(mission, Some(image), 0.8)]).await.unwrap();

        assert_eq!(repository.attempts().len(), 1);
        assert_eq!(batch.fallback.len(), 1);
        assert_eq!(batch.fallback[0].record.mission_image_id, Some(image));
    }

    #[tokio::test]
    async fn test_unnamed_foreign_key_is_not_retried() {
        let repository = Arc::new(RejectingRepository::new(StoreError::foreign_key(None, "fk")));
        let (reconciler, _) = reconciler(repository.clone(), Arc::new(FallbackCache::new()));

        reconciler
            .persist(vec![sample_record(Uuid::new_v4(), Some(Uuid::new_v4()), 0.8)])
            .await
            .unwrap();
        assert_eq!(repository.attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let repository = Arc::new(RejectingRepository::new(StoreError::Rejected {
            status: 500,
            message: "internal".to_string(),
        }));
        let (reconciler, _) = reconciler(repository.clone(), Arc::new(FallbackCache::new()));

        let mission = Uuid::new_v4();
        reconciler
            .persist(vec![sample_record(mission, Some(Uuid::new_v4()), 0.8)])
            .await
            .unwrap();
        assert_eq!(repository.attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_persistence_is_total_and_disjoint() {
        let known = Uuid::new_v4();
        let unknown = Uuid::new_v4();
        let repository = Arc::new(MemoryDefectRepository::enforcing());
        repository.register_mission(known);

        let cache = Arc::new(FallbackCache::new());
        let (reconciler, invalidator) = reconciler(repository, cache.clone());

        let records = vec![
            sample_record(known, None, 0.9),
            sample_record(unknown, None, 0.8),
            sample_record(known, None, 0.7),
            sample_record(unknown, Some(Uuid::new_v4()), 0.6),
            sample_record(known, None, 0.5),
        ];
        let n = records.len();
        let batch = reconciler.persist(records).await.unwrap();

        assert_eq!(batch.persisted.len() + batch.fallback.len(), n);
        assert_eq!(batch.persisted.len(), 3);
        assert_eq!(batch.fallback.len(), 2);
        assert!(batch.is_degraded());

        let persisted_ids: HashSet<_> = batch.persisted.iter().map(|s| s.id).collect();
        assert!(batch.fallback.iter().all(|s| !persisted_ids.contains(&s.id)));

        assert_eq!(cache.indexed_entries(known).unwrap().len(), 3);
        assert_eq!(cache.indexed_entries(unknown).unwrap().len(), 2);
        assert_eq!(invalidator.missions(), vec![known, unknown]);
    }

    #[tokio::test]
    async fn test_fallback_failure_propagates() {
        let repository = Arc::new(RejectingRepository::new(StoreError::Transport("timeout".to_string())));
        let (reconciler, _) = reconciler(repository, Arc::new(FallbackCache::with_capacity_limit(1)));

        let mission = Uuid::new_v4();
        let err = reconciler
            .persist(vec![sample_record(mission, None, 0.8), sample_record(mission, None, 0.8)])
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::PersistenceExhausted(_)));
    }

    #[tokio::test]
    async fn test_full_fallback_still_stores_and_indexes_later_records() {
        let known = Uuid::new_v4();
        let unknown = Uuid::new_v4();
        let repository = Arc::new(MemoryDefectRepository::enforcing());
        repository.register_mission(known);

        let cache = Arc::new(FallbackCache::with_capacity_limit(1));
        let (reconciler, invalidator) = reconciler(repository.clone(), cache.clone());

        let records = vec![
            sample_record(unknown, None, 0.9),
            sample_record(unknown, None, 0.8),
            sample_record(known, None, 0.7),
        ];
        let err = reconciler.persist(records).await.unwrap_err();

        assert!(matches!(err, AnalysisError::PersistenceExhausted(_)));
        assert_eq!(repository.row_count(), 1);
        assert_eq!(cache.fallback_len(), 1);
        assert_eq!(cache.indexed_entries(known).unwrap().len(), 1);
        assert_eq!(cache.indexed_entries(unknown).unwrap().len(), 1);
        assert_eq!(invalidator.missions(), vec![unknown, known]);
    }
}
