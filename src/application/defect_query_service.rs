// Read path for mission defects across the primary store and the fallback cache
use crate::application::defect_repository::{DefectRepository, StoredDefect};
use crate::application::fallback_cache::FallbackCache;
use crate::application::notifications::CacheInvalidator;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct MissionDefects {
    pub mission_id: Uuid,
    pub defects: Vec<StoredDefect>,
    /// True when the primary store could not be queried and the list came from the cache index
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearedFallback {
    pub mission_id: Uuid,
    /// Fallback-only records discarded; they were never in the primary store
    pub discarded: usize,
    pub remaining: usize,
}

#[derive(Clone)]
pub struct DefectQueryService {
    repository: Arc<dyn DefectRepository>,
    cache: Arc<FallbackCache>,
    invalidator: Arc<dyn CacheInvalidator>,
}

impl DefectQueryService {
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

    /// Discard a mission's fallback records and read index
    pub fn clear_fallback(&self, mission_id: Uuid) -> ClearedFallback {
        let discarded = self.cache.clear_mission(mission_id);
        self.invalidator.invalidate(mission_id);

        let remaining = self.cache.fallback_len();
        if discarded > 0 {
            tracing::warn!(
                "Discarded {} fallback defect(s) for mission {}, {} remain cached",
                discarded,
                mission_id,
                remaining
            );
        }
        ClearedFallback {
            mission_id,
            discarded,
            remaining,
        }
    }

    /// Primary rows plus fallback-only entries, newest first
    pub async fn list_mission_defects(&self, mission_id: Uuid) -> MissionDefects {
        let (mut defects, degraded) = match self.repository.list_mission_defects(mission_id).await {
            Ok(mut rows) => {
                rows.extend(self.cache.fallback_entries(mission_id));
                (rows, false)
            }
            Err(err) => {
                tracing::warn!(
                    "Primary store query for mission {} failed: {}; serving the fallback cache",
                    mission_id,
                    err
                );
                let indexed = self
                    .cache
                    .indexed_entries(mission_id)
                    .unwrap_or_else(|| self.cache.fallback_entries(mission_id));
                (indexed, true)
            }
        };

        defects.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.stored_at.cmp(&a.stored_at))
        });
        tracing::debug!("Listing {} defect(s) for mission {}", defects.len(), mission_id);

        MissionDefects {
            mission_id,
            defects,
            degraded,
        }
    }
}
