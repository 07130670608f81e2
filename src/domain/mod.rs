// Domain layer - Plain data shared by every other layer
pub mod defect;
pub mod detection;
pub mod error;
pub mod notification;
pub mod telemetry;
