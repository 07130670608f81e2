// Main entry point - Dependency injection and server setup
use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use panel_inspection::application::cascade_service::DetectionCascade;
use panel_inspection::application::defect_query_service::DefectQueryService;
use panel_inspection::application::defect_repository::DefectRepository;
use panel_inspection::application::detection_services::{DefectDetectionService, VisionAnalysisService};
use panel_inspection::application::fallback_cache::FallbackCache;
use panel_inspection::application::image_preprocessor::ImagePreprocessor;
use panel_inspection::application::inspection_service::InspectionService;
use panel_inspection::application::persistence_service::PersistenceReconciler;
use panel_inspection::infrastructure::config::{load_app_config, AppConfig};
use panel_inspection::infrastructure::cv_client::HttpCvClient;
use panel_inspection::infrastructure::memory_defect_repository::MemoryDefectRepository;
use panel_inspection::infrastructure::notifier::{BroadcastInvalidator, TracingNotifier};
use panel_inspection::infrastructure::rest_defect_repository::RestDefectRepository;
use panel_inspection::infrastructure::vision_client::HttpVisionClient;
use panel_inspection::presentation::app_state::AppState;
use panel_inspection::presentation::router::build_router;

fn build_repository(config: &AppConfig) -> anyhow::Result<Arc<dyn DefectRepository>> {
    if config.store.url.is_empty() {
        tracing::warn!("No primary store configured, keeping defects in memory");
        return Ok(Arc::new(MemoryDefectRepository::new()));
    }
    Ok(Arc::new(RestDefectRepository::new(
        &config.store.url,
        &config.store.api_key,
        &config.store.table,
    )?))
}

fn build_cv(config: &AppConfig) -> anyhow::Result<Option<Arc<dyn DefectDetectionService>>> {
    if config.cv.base_url.is_empty() {
        tracing::warn!("No CV service configured, REMOTE_CV tier disabled");
        return Ok(None);
    }
    Ok(Some(Arc::new(HttpCvClient::new(&config.cv.base_url)?)))
}

fn build_vision(config: &AppConfig) -> anyhow::Result<Option<Arc<dyn VisionAnalysisService>>> {
    if config.vision.endpoint.is_empty() {
        tracing::warn!("No vision AI endpoint configured, REMOTE_VISION_AI tier disabled");
        return Ok(None);
    }
    Ok(Some(Arc::new(HttpVisionClient::new(
        &config.vision.endpoint,
        &config.vision.api_key,
        &config.vision.model,
    )?)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_app_config()?;

    // Create adapters (infrastructure layer)
    let repository = build_repository(&config)?;
    let cv_service = build_cv(&config)?;
    let vision_service = build_vision(&config)?;
    let notifier = Arc::new(TracingNotifier);
    let invalidator = Arc::new(BroadcastInvalidator::new(64));
    let cache = Arc::new(
        match config.fallback_cache.max_entries {
            Some(max) => FallbackCache::with_capacity_limit(max),
            None => FallbackCache::new(),
        }
        .with_index_limit(config.fallback_cache.index_max_entries),
    );

    let mut invalidations = invalidator.subscribe();
    tokio::spawn(async move {
        loop {
            match invalidations.recv().await {
                Ok(mission_id) => tracing::debug!("Defect reads invalidated for mission {}", mission_id),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Invalidation listener skipped {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Create services (application layer)
    let cascade = DetectionCascade::new(
        cv_service.clone(),
        vision_service,
        ImagePreprocessor::new(config.preprocess_settings()),
        notifier.clone(),
        config.cascade_settings(),
    );
    let reconciler = PersistenceReconciler::new(repository.clone(), cache.clone(), invalidator.clone());
    let inspection_service = InspectionService::new(cascade, reconciler, notifier);
    let query_service = DefectQueryService::new(repository, cache, invalidator);

    // Create application state
    let state = Arc::new(AppState {
        inspection_service,
        query_service,
        cv_service,
        ranges: config.normal_ranges(),
    });

    // Build router (presentation layer)
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.server.bind))?;
    tracing::info!("Starting panel-inspection service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
