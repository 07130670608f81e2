// Application layer - detection cascade, persistence and use-case services
pub mod anomaly_classifier;
pub mod cascade_service;
pub mod defect_query_service;
pub mod defect_repository;
pub mod detection_services;
pub mod edge_detector;
pub mod fallback_cache;
pub mod image_preprocessor;
pub mod inspection_service;
pub mod notifications;
pub mod persistence_service;
pub mod result_normalizer;
pub mod vision_report;

#[cfg(test)]
pub(crate) mod test_support;
