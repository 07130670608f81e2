// Repository trait for the primary durable defect store
use crate::domain::defect::DefectRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Column holding the mission image reference
pub const MISSION_IMAGE_COLUMN: &str = "mission_image_id";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// A referenced row is missing; `column` is `None` when the store did not name it
    #[error("foreign key violation on {}: {detail}", column.as_deref().unwrap_or("unknown column"))]
    ForeignKeyViolation { column: Option<String>, detail: String },

    #[error("store rejected write with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("store unreachable: {0}")]
    Transport(String),

    #[error("unreadable store response: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn foreign_key(column: Option<&str>, detail: impl Into<String>) -> Self {
        StoreError::ForeignKeyViolation {
            column: column.map(str::to_string),
            detail: detail.into(),
        }
    }

    /// True only when the missing row is the mission image
    pub fn is_missing_image(&self) -> bool {
        matches!(
            self,
            StoreError::ForeignKeyViolation { column: Some(column), .. } if column == MISSION_IMAGE_COLUMN
        )
    }
}

/// Identifier of a stored defect: a primary-store row id or a fallback-cache slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordId {
    Primary(Uuid),
    Fallback(u64),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Primary(id) => write!(f, "{}", id),
            RecordId::Fallback(seq) => write!(f, "local-{}", seq),
        }
    }
}

impl Serialize for RecordId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageLocation {
    Primary,
    Fallback,
}

/// A defect record together with where and when it was stored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredDefect {
    pub id: RecordId,
    pub location: StorageLocation,
    pub stored_at: DateTime<Utc>,
    pub record: DefectRecord,
}

#[async_trait]
pub trait DefectRepository: Send + Sync {
    /// Insert one record; the store enforces the mission image foreign key
    async fn insert_defect(&self, record: &DefectRecord) -> Result<StoredDefect, StoreError>;

    /// All records for a mission, newest first
    async fn list_mission_defects(&self, mission_id: Uuid) -> Result<Vec<StoredDefect>, StoreError>;
}
