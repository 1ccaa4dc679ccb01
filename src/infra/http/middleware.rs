use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const MAX_REQUEST_ID_LEN: usize = 64;

/// Per-request identity, available to handlers and echoed on the response.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Summary of a PDF handed back to the client, attached by the handlers.
#[derive(Debug, Clone)]
pub struct DeliveredDocument {
    pub filename: String,
    pub bytes: usize,
}

impl DeliveredDocument {
    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Reuse a caller-supplied `x-request-id` when it is short printable ASCII,
/// otherwise mint one.
fn request_id_for(request: &Request<Body>) -> String {
    request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| {
            !id.is_empty()
                && id.len() <= MAX_REQUEST_ID_LEN
                && id.bytes().all(|b| b.is_ascii_graphic())
        })
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Tag the request with an id and run everything below it inside a
/// `request` span, so render and merge events carry the same id.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_for(&request);
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let ctx = RequestContext { request_id };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis() as u64;

    if status.is_success() {
        if let Some(document) = response.extensions_mut().remove::<DeliveredDocument>() {
            info!(
                target = "rollcall::http::response",
                status = status.as_u16(),
                filename = %document.filename,
                bytes = document.bytes,
                elapsed_ms,
                "pdf delivered",
            );
        }
        return response;
    }

    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let (source, messages) = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => (report.source, report.messages),
        None => ("unknown", Vec::new()),
    };
    let detail = messages
        .first()
        .map(String::as_str)
        .unwrap_or("no diagnostic available");

    if status.is_server_error() {
        error!(
            target = "rollcall::http::response",
            status = status.as_u16(),
            elapsed_ms,
            source,
            detail,
            chain = ?messages,
            "request failed",
        );
    } else {
        warn!(
            target = "rollcall::http::response",
            status = status.as_u16(),
            elapsed_ms,
            source,
            detail,
            chain = ?messages,
            "request rejected",
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(id: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/health");
        if let Some(id) = id {
            builder = builder.header(REQUEST_ID_HEADER, id);
        }
        builder.body(Body::empty()).expect("request")
    }

    #[test]
    fn caller_request_id_is_reused() {
        assert_eq!(request_id_for(&request_with(Some("batch-42"))), "batch-42");
    }

    #[test]
    fn unusable_request_ids_are_replaced() {
        let long = "x".repeat(MAX_REQUEST_ID_LEN + 1);
        for id in [None, Some("   "), Some("has space"), Some(long.as_str())] {
            let minted = request_id_for(&request_with(id));
            assert!(Uuid::parse_str(&minted).is_ok(), "minted id for {id:?}");
        }
    }
}
