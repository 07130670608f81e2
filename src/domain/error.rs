// Error taxonomy for the inspection pipeline
use thiserror::Error;
use uuid::Uuid;

use super::defect::SourceTier;

/// Errors raised while analysing or persisting one image.
///
/// Tier errors are recovered inside the cascade by demotion. Only
/// `PersistenceExhausted` is allowed to escape a persist call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("image could not be decoded: {0}")]
    Decode(String),

    #[error("{tier} unavailable: {reason}")]
    RemoteUnavailable { tier: SourceTier, reason: String },

    #[error("{tier} returned a malformed response: {reason}")]
    RemoteMalformedResponse { tier: SourceTier, reason: String },

    #[error("referenced mission image {mission_image_id} no longer exists")]
    ReferentialIntegrity { mission_image_id: Uuid },

    #[error("no store accepted the record: {0}")]
    PersistenceExhausted(String),
}

impl AnalysisError {
    pub fn unavailable(tier: SourceTier, reason: impl Into<String>) -> Self {
        AnalysisError::RemoteUnavailable {
            tier,
            reason: reason.into(),
        }
    }

    pub fn malformed(tier: SourceTier, reason: impl Into<String>) -> Self {
        AnalysisError::RemoteMalformedResponse {
            tier,
            reason: reason.into(),
        }
    }
}
