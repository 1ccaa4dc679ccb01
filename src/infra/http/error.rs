use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::{error::ErrorReport, render::RenderError};

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const TEMPLATE_NOT_FOUND: &str = "template_not_found";
    pub const RENDER_TIMEOUT: &str = "render_timeout";
    pub const RENDER: &str = "render_error";
    pub const MERGE: &str = "merge_error";
    pub const TEMPLATE_STORE: &str = "template_store_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    report: Option<ErrorReport>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            report: None,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        let (status, code, message) = match err.root() {
            RenderError::Validation { .. } => (
                StatusCode::BAD_REQUEST,
                codes::INVALID_INPUT,
                "Request could not be processed",
            ),
            RenderError::TemplateNotFound { .. } => (
                StatusCode::NOT_FOUND,
                codes::TEMPLATE_NOT_FOUND,
                "Attendance template not found",
            ),
            RenderError::Timeout { .. } => (
                StatusCode::GATEWAY_TIMEOUT,
                codes::RENDER_TIMEOUT,
                "Rendering timed out",
            ),
            RenderError::Merge(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::MERGE,
                "Unable to merge documents",
            ),
            RenderError::TemplateStore { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::TEMPLATE_STORE,
                "Unable to load attendance template",
            ),
            RenderError::Engine(_) | RenderError::Job { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::RENDER,
                "Unable to render document",
            ),
        };

        let report = ErrorReport::from_error("infra::http::render", status, &err);
        Self {
            status,
            code,
            message,
            hint: Some(err.to_string()),
            report: Some(report),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = self.report.unwrap_or_else(|| {
            ErrorReport::from_message(
                "infra::http::api",
                self.status,
                format!(
                    "{}: {}",
                    self.code,
                    self.hint.as_deref().unwrap_or(self.message)
                ),
            )
        });
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        // Shared logging middleware reads the report back out of the extensions.
        report.attach(&mut response);
        response
    }
}
