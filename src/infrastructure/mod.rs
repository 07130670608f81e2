// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod cv_client;
pub mod memory_defect_repository;
pub mod notifier;
pub mod rest_defect_repository;
pub mod vision_client;
