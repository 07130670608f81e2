// Solar panel inspection service - defect detection cascade and telemetry classification
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
