//! HTTP handlers for invoicing-service.

pub mod activity;
pub mod documents;
pub mod health;
pub mod mail;

pub use health::{health_check, metrics_endpoint, readiness_check};
