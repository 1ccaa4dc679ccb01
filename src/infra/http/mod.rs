//! HTTP surface: four JSON/PDF endpoints behind shared logging middleware.

mod error;
mod handlers;
mod middleware;
mod models;

pub use error::{ApiError, ApiErrorBody, ApiErrorMessage, codes};
pub use middleware::{DeliveredDocument, REQUEST_ID_HEADER, RequestContext};
pub use models::{ConcatRequest, HealthResponse, MasterListRequest};

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
};

use crate::application::{
    attendance::AttendanceService, concat::ConcatService, masterlist::MasterListService,
};

use middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct AppState {
    pub attendance: Arc<AttendanceService>,
    pub concat: Arc<ConcatService>,
    pub masterlist: Arc<MasterListService>,
}

pub fn build_router(state: AppState, max_request_bytes: usize) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/attendance-pdf", post(handlers::attendance_pdf))
        .route("/api/concat-pdf", post(handlers::concat_pdf))
        .route("/api/masterlist-pdf", post(handlers::masterlist_pdf))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
}
