// In-process fallback store for defect records the primary store rejected
use crate::application::defect_repository::{RecordId, StorageLocation, StoredDefect};
use crate::domain::defect::DefectRecord;
use crate::domain::error::AnalysisError;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Default bound on read-index entries across all missions
pub const DEFAULT_INDEX_LIMIT: usize = 10_000;

#[derive(Debug, Default)]
struct CacheState {
    next_id: u64,
    /// Records held only by this cache, per mission
    fallback: HashMap<Uuid, Vec<StoredDefect>>,
    fallback_len: usize,
    /// Every reconciled batch (primary and fallback), per mission
    index: HashMap<Uuid, Vec<StoredDefect>>,
    index_len: usize,
    /// Indexed missions, least recently indexed first
    index_order: VecDeque<Uuid>,
}

impl CacheState {
    fn evict_index(&mut self, limit: usize) {
        while self.index_len > limit {
            let Some(oldest) = self.index_order.pop_front() else {
                break;
            };
            if let Some(evicted) = self.index.remove(&oldest) {
                self.index_len -= evicted.len();
                tracing::debug!("Evicted {} indexed defect(s) for mission {}", evicted.len(), oldest);
            }
        }
    }
}

/// Fallback entries accumulate until explicitly cleared. The read index is bounded
/// and evicts whole missions; fallback entries themselves are never evicted.
#[derive(Debug)]
pub struct FallbackCache {
    state: Mutex<CacheState>,
    max_entries: Option<usize>,
    index_limit: usize,
}

impl Default for FallbackCache {
    fn default() -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_entries: None,
            index_limit: DEFAULT_INDEX_LIMIT,
        }
    }
}

impl FallbackCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache that refuses appends beyond `max_entries` fallback records
    pub fn with_capacity_limit(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries),
            ..Self::default()
        }
    }

    pub fn with_index_limit(mut self, index_limit: usize) -> Self {
        self.index_limit = index_limit;
        self
    }

    fn write(&self) -> Result<MutexGuard<'_, CacheState>, AnalysisError> {
        self.state
            .lock()
            .map_err(|_| AnalysisError::PersistenceExhausted("fallback cache lock poisoned".to_string()))
    }

    fn read(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take ownership of a record under a freshly minted local id
    pub fn append(&self, record: DefectRecord) -> Result<StoredDefect, AnalysisError> {
        let mut state = self.write()?;
        if let Some(max) = self.max_entries {
            if state.fallback_len >= max {
                return Err(AnalysisError::PersistenceExhausted(format!(
                    "fallback cache full ({} entries)",
                    max
                )));
            }
        }

        state.next_id += 1;
        let entry = StoredDefect {
            id: RecordId::Fallback(state.next_id),
            location: StorageLocation::Fallback,
            stored_at: Utc::now(),
            record,
        };
        state
            .fallback
            .entry(entry.record.mission_id)
            .or_default()
            .push(entry.clone());
        state.fallback_len += 1;
        Ok(entry)
    }

    /// Add reconciled entries to the per-mission read index, replacing same-id entries
    pub fn index_batch(&self, entries: &[StoredDefect]) -> Result<(), AnalysisError> {
        let mut state = self.write()?;
        for entry in entries {
            let mission_id = entry.record.mission_id;
            let slot = state.index.entry(mission_id).or_default();
            let before = slot.len();
            slot.retain(|existing| existing.id != entry.id);
            let replaced = before - slot.len();
            slot.push(entry.clone());
            state.index_len = state.index_len + 1 - replaced;

            state.index_order.retain(|id| *id != mission_id);
            state.index_order.push_back(mission_id);
        }
        state.evict_index(self.index_limit);
        Ok(())
    }

    pub fn fallback_entries(&self, mission_id: Uuid) -> Vec<StoredDefect> {
        self.read().fallback.get(&mission_id).cloned().unwrap_or_default()
    }

    pub fn indexed_entries(&self, mission_id: Uuid) -> Option<Vec<StoredDefect>> {
        self.read().index.get(&mission_id).cloned()
    }

    pub fn fallback_len(&self) -> usize {
        self.read().fallback_len
    }

    /// Drop a mission's fallback and index entries, returning how many fallback entries went.
    /// Ids keep increasing so old ids are never reused.
    pub fn clear_mission(&self, mission_id: Uuid) -> usize {
        let mut state = self.read();
        let removed = state.fallback.remove(&mission_id).map_or(0, |entries| entries.len());
        state.fallback_len -= removed;
        if let Some(indexed) = state.index.remove(&mission_id) {
            state.index_len -= indexed.len();
        }
        state.index_order.retain(|id| *id != mission_id);
        removed
    }
}
