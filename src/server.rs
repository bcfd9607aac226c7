use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::{self, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use log::{debug, error, info};
use serde::Deserialize;
use tokio::task::JoinError;

use crate::clock::{format_instant, ReferenceClock};
use crate::config::Config;
use crate::convert::{convert, ConvertError};

pub struct ServerState {
    pub config: Config,
    pub reference_clock: ReferenceClock,
}

impl ServerState {
    pub fn new(config: Config, reference_clock: ReferenceClock) -> Self {
        Self {
            config,
            reference_clock,
        }
    }
}

/// Body of POST /api/convert
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    /// Base64 encoded CSV file
    pub data: String,
}

pub fn get_router(state: Arc<ServerState>) -> Router {
    let cors_enabled = state.config.cors_enabled;
    let router = Router::new()
        .route("/api/checkConnection", get(check_connection))
        .route("/api/newStartDate", put(set_start_date))
        .route("/api/newStartDate", get(get_start_date))
        .route("/api/convert", post(convert_file))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .with_state(state);

    let router = if cors_enabled {
        router.layer(from_fn(cors_middleware))
    } else {
        router
    };
    router.layer(from_fn(logging_middleware))
}

pub async fn check_connection() -> Json<bool> {
    Json(true)
}

pub async fn get_start_date(State(state): State<Arc<ServerState>>) -> Json<String> {
    Json(format_instant(&state.reference_clock.get()))
}

pub async fn set_start_date(State(state): State<Arc<ServerState>>, body: Bytes) -> StatusCode {
    let Ok(new_start_date) = std::str::from_utf8(&body) else {
        error!("new start date is not valid UTF-8");
        return StatusCode::BAD_REQUEST;
    };
    match state.reference_clock.set_from_str(new_start_date) {
        Ok(reference) => {
            info!("new start date: {}", format_instant(&reference));
            StatusCode::OK
        }
        Err(err) => {
            error!("could not set new start date: {err}");
            StatusCode::BAD_REQUEST
        }
    }
}

pub async fn convert_file(
    State(state): State<Arc<ServerState>>,
    request: Result<Json<UploadRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(err) => {
            error!("could not read conversion request: {err}");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    // one snapshot of the reference time for the whole file
    let reference = state.reference_clock.get();
    debug!(
        "converting {} byte payload against {}",
        request.data.len(),
        format_instant(&reference)
    );
    let result =
        tokio::task::spawn_blocking(move || convert(request.data.as_bytes(), reference)).await;
    conversion_response(result)
}

// Every failure, including a panicked conversion task, is a bare 400.
fn conversion_response(result: Result<Result<Vec<u8>, ConvertError>, JoinError>) -> Response {
    match result {
        Ok(Ok(csv)) => {
            let headers = [
                (CONTENT_TYPE, "text/csv"),
                (CONTENT_DISPOSITION, "attachment; filename=\"modified.csv\""),
            ];
            (headers, csv).into_response()
        }
        Ok(Err(err)) => {
            error!("could not transform file: {err}");
            StatusCode::BAD_REQUEST.into_response()
        }
        Err(err) => {
            error!("conversion task failed: {err}");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

/// Allows browser frontends served from another origin to call the API.
pub async fn cors_middleware(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Content-Disposition"),
    );
    response
}

/// Logs incoming requests and their responses
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    info!(
        "{method} {uri} -> {} ({}ms)",
        response.status().as_u16(),
        start.elapsed().as_millis()
    );
    response
}
