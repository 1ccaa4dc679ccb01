use axum::{
    Json,
    body::Body,
    extract::{FromRequest, Multipart, Request, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};

use crate::application::attendance::{AttendanceRequest, RenderedDocument};

use super::{
    AppState,
    error::ApiError,
    middleware::DeliveredDocument,
    models::{ConcatRequest, HealthResponse, MasterListRequest},
};

const PDF_CONTENT_TYPE: &str = "application/pdf";
const MULTIPART_PREFIX: &str = "multipart/form-data";

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn attendance_pdf(
    State(state): State<AppState>,
    payload: Result<Json<AttendanceRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(invalid_body)?;
    let document = state.attendance.render(request.into_batch()).await?;
    Ok(pdf_response(document))
}

/// Accepts either a JSON body of base64 entries or a multipart form with
/// repeated `pdfs` file fields and an optional `filename` field.
pub async fn concat_pdf(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with(MULTIPART_PREFIX));

    let document = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|rejection| {
                ApiError::bad_request("Invalid multipart body", Some(rejection.body_text()))
            })?;
        let (documents, filename) = read_multipart_pdfs(multipart).await?;
        state.concat.concat(documents, filename.as_deref())?
    } else {
        let Json(body) = Json::<ConcatRequest>::from_request(request, &state)
            .await
            .map_err(invalid_body)?;
        state
            .concat
            .concat_encoded(&body.pdfs, body.filename.as_deref())?
    };

    Ok(pdf_response(document))
}

pub async fn masterlist_pdf(
    State(state): State<AppState>,
    payload: Result<Json<MasterListRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(invalid_body)?;
    let document = state
        .masterlist
        .render(&request.rosters, &request.options)
        .await?;
    Ok(pdf_response(document))
}

pub async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

fn invalid_body(rejection: JsonRejection) -> ApiError {
    ApiError::bad_request("Invalid request body", Some(rejection.body_text()))
}

async fn read_multipart_pdfs(
    mut multipart: Multipart,
) -> Result<(Vec<Vec<u8>>, Option<String>), ApiError> {
    let multipart_error = |err: axum::extract::multipart::MultipartError| {
        ApiError::bad_request("Invalid multipart body", Some(err.body_text()))
    };

    let mut documents = Vec::new();
    let mut filename = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("pdfs") => documents.push(field.bytes().await.map_err(multipart_error)?.to_vec()),
            Some("filename") => filename = Some(field.text().await.map_err(multipart_error)?),
            _ => continue,
        }
    }
    Ok((documents, filename))
}

fn pdf_response(document: RenderedDocument) -> Response {
    let RenderedDocument { filename, bytes } = document;
    let length = bytes.len();

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(PDF_CONTENT_TYPE),
    );
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }

    let safe_name = filename.replace('"', "'");
    if let Ok(value) = HeaderValue::from_str(&format!("inline; filename=\"{safe_name}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    DeliveredDocument {
        filename,
        bytes: length,
    }
    .attach(&mut response);
    response
}
