// Application state for HTTP handlers
use crate::application::defect_query_service::DefectQueryService;
use crate::application::detection_services::DefectDetectionService;
use crate::application::inspection_service::InspectionService;
use crate::domain::telemetry::NormalRanges;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub inspection_service: InspectionService,
    pub query_service: DefectQueryService,
    /// `None` when no CV service is configured
    pub cv_service: Option<Arc<dyn DefectDetectionService>>,
    pub ranges: NormalRanges,
}
