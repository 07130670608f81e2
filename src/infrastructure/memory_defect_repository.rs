// In-memory primary store with optional foreign-key enforcement
use crate::application::defect_repository::{
    DefectRepository, RecordId, StorageLocation, StoreError, StoredDefect, MISSION_IMAGE_COLUMN,
};
use crate::domain::defect::DefectRecord;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    /// `None` accepts any reference
    missions: Option<HashSet<Uuid>>,
    images: Option<HashSet<Uuid>>,
    rows: Vec<StoredDefect>,
}

/// Used when no primary store is configured, and by tests
#[derive(Debug, Default)]
pub struct MemoryDefectRepository {
    state: Mutex<MemoryState>,
}

impl MemoryDefectRepository {
    /// Accepts every mission and image reference
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects references to missions and images that were not registered
    pub fn enforcing() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                missions: Some(HashSet::new()),
                images: Some(HashSet::new()),
                rows: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Transport("memory store lock poisoned".to_string()))
    }

    pub fn register_mission(&self, mission_id: Uuid) {
        if let Ok(mut state) = self.lock() {
            if let Some(missions) = state.missions.as_mut() {
                missions.insert(mission_id);
            }
        }
    }

    pub fn register_image(&self, mission_image_id: Uuid) {
        if let Ok(mut state) = self.lock() {
            if let Some(images) = state.images.as_mut() {
                images.insert(mission_image_id);
            }
        }
    }

    /// Forget an image; rows that referenced it keep their id, as with ON DELETE NO ACTION
    pub fn delete_image(&self, mission_image_id: Uuid) {
        if let Ok(mut state) = self.lock() {
            if let Some(images) = state.images.as_mut() {
                images.remove(&mission_image_id);
            }
        }
    }

    pub fn row_count(&self) -> usize {
        self.lock().map(|state| state.rows.len()).unwrap_or(0)
    }
}

fn check_reference(known: &Option<HashSet<Uuid>>, id: Uuid, column: &str) -> Result<(), StoreError> {
    match known {
        Some(ids) if !ids.contains(&id) => Err(StoreError::foreign_key(
            Some(column),
            format!("Key ({})=({}) is not present", column, id),
        )),
        _ => Ok(()),
    }
}

#[async_trait]
impl DefectRepository for MemoryDefectRepository {
    async fn insert_defect(&self, record: &DefectRecord) -> Result<StoredDefect, StoreError> {
        let mut state = self.lock()?;
        check_reference(&state.missions, record.mission_id, "mission_id")?;
        if let Some(image_id) = record.mission_image_id {
            check_reference(&state.images, image_id, MISSION_IMAGE_COLUMN)?;
        }

        let stored = StoredDefect {
            id: RecordId::Primary(Uuid::new_v4()),
            location: StorageLocation::Primary,
            stored_at: Utc::now(),
            record: record.clone(),
        };
        state.rows.push(stored.clone());
        Ok(stored)
    }

    async fn list_mission_defects(&self, mission_id: Uuid) -> Result<Vec<StoredDefect>, StoreError> {
        let state = self.lock()?;
        let mut rows: Vec<StoredDefect> = state
            .rows
            .iter()
            .filter(|row| row.record.mission_id == mission_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.record.created_at.cmp(&a.record.created_at));
        Ok(rows)
    }
}
