// PostgREST-style primary store for inspection results
use crate::application::defect_repository::{
    DefectRepository, RecordId, StorageLocation, StoreError, StoredDefect,
};
use crate::domain::defect::{BoundingBox, DefectRecord, DefectType, SourceTier};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Postgres foreign_key_violation
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    mission_id: Uuid,
    mission_image_id: Option<Uuid>,
    defect_type: &'static str,
    confidence: f64,
    bounding_box: Option<BoundingBox>,
    notes: &'a str,
    source_tier: &'static str,
    status: &'static str,
    model_version: Option<&'a str>,
    created_at: DateTime<Utc>,
}

impl<'a> InsertRow<'a> {
    fn from_record(record: &'a DefectRecord) -> Self {
        Self {
            mission_id: record.mission_id,
            mission_image_id: record.mission_image_id,
            defect_type: record.defect_type.as_str(),
            confidence: record.confidence,
            bounding_box: record.bounding_box,
            notes: &record.notes,
            source_tier: record.source_tier.as_str(),
            status: record.inspection_status().as_str(),
            model_version: record.model_version.as_deref(),
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StoredRow {
    id: Uuid,
    mission_id: Uuid,
    #[serde(default)]
    mission_image_id: Option<Uuid>,
    defect_type: String,
    confidence: f64,
    #[serde(default)]
    bounding_box: Option<BoundingBox>,
    #[serde(default)]
    notes: Option<String>,
    source_tier: String,
    #[serde(default)]
    model_version: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    inserted_at: Option<DateTime<Utc>>,
}

impl StoredRow {
    fn into_stored(self) -> Result<StoredDefect, StoreError> {
        let defect_type = DefectType::parse(&self.defect_type)
            .ok_or_else(|| StoreError::Decode(format!("unknown defect_type '{}'", self.defect_type)))?;
        let source_tier = SourceTier::parse(&self.source_tier)
            .ok_or_else(|| StoreError::Decode(format!("unknown source_tier '{}'", self.source_tier)))?;

        Ok(StoredDefect {
            id: RecordId::Primary(self.id),
            location: StorageLocation::Primary,
            stored_at: self.inserted_at.unwrap_or(self.created_at),
            record: DefectRecord {
                mission_id: self.mission_id,
                mission_image_id: self.mission_image_id,
                defect_type,
                confidence: self.confidence,
                bounding_box: self.bounding_box,
                notes: self.notes.unwrap_or_default(),
                source_tier,
                model_version: self.model_version,
                created_at: self.created_at,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Column named by a Postgres detail such as `Key (mission_image_id)=(...) is not present`
fn referenced_column(details: &str) -> Option<&str> {
    let rest = &details[details.find("Key (")? + "Key (".len()..];
    let column = &rest[..rest.find(")=")?];
    (!column.is_empty()).then_some(column)
}

/// Map a rejected request onto the store error taxonomy
fn classify_rejection(status: u16, body: &str) -> StoreError {
    let parsed = serde_json::from_str::<PostgrestError>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| body.to_string());

    match parsed {
        Some(e) if e.code.as_deref() == Some(FOREIGN_KEY_VIOLATION) => {
            let column = e.details.as_deref().and_then(referenced_column);
            StoreError::foreign_key(column, message)
        }
        _ => StoreError::Rejected { status, message },
    }
}

#[derive(Debug, Clone)]
pub struct RestDefectRepository {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl RestDefectRepository {
    pub fn new(base_url: &str, api_key: &str, table: &str) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .build()
            .context("Failed to build primary store HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            table: table.to_string(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn mission_query_url(&self, mission_id: Uuid) -> String {
        let filter = format!("eq.{}", mission_id);
        format!(
            "{}?select=*&mission_id={}&order=created_at.desc",
            self.table_url(),
            urlencoding::encode(&filter)
        )
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
    }

    async fn read_rows(response: reqwest::Response) -> Result<Vec<StoredRow>, StoreError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_rejection(status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl DefectRepository for RestDefectRepository {
    async fn insert_defect(&self, record: &DefectRecord) -> Result<StoredDefect, StoreError> {
        let response = self
            .request(reqwest::Method::POST, self.table_url())
            .header("Prefer", "return=representation")
            .json(&InsertRow::from_record(record))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let row = Self::read_rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no row".to_string()))?;

        tracing::debug!("Inserted {} defect row {}", record.defect_type, row.id);
        row.into_stored()
    }

    async fn list_mission_defects(&self, mission_id: Uuid) -> Result<Vec<StoredDefect>, StoreError> {
        let response = self
            .request(reqwest::Method::GET, self.mission_query_url(mission_id))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Self::read_rows(response)
            .await?
            .into_iter()
            .map(StoredRow::into_stored)
            .collect()
    }
}
