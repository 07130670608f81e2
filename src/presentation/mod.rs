// Presentation layer - HTTP ingestion surface
pub mod app_state;
pub mod handlers;
pub mod router;
