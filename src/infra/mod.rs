//! Infrastructure adapters and runtime bootstrap.

pub mod chromium;
pub mod error;
pub mod http;
pub mod pdf;
pub mod telemetry;
pub mod templates;
