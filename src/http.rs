use crate::codec::DecodeError;
use crate::extract::ViewKind;
use crate::render::{self, RenderError, RenderRequest};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_IDENTIFIER_LEN: usize = 32;
/// API revision reported by `/version`.
const VERSION: &str = "1.3";
const DOWNLOAD_DISPOSITION: &str = "attachment; filename=\"skin.png\"";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Inline,
    Attachment,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/version", get(version))
        .route("/avatar/{user}", get(avatar))
        .route("/avatar/{user}/{size}", get(avatar_sized))
        .route("/helm/{user}", get(helm))
        .route("/helm/{user}/{size}", get(helm_sized))
        .route("/skin/{user}", get(skin))
        .route("/download/{user}", get(download))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn version() -> impl IntoResponse {
    (StatusCode::OK, VERSION)
}

async fn avatar(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> Result<Response, ApiError> {
    render_view(&state, ViewKind::Avatar, &user, None, Delivery::Inline).await
}

async fn avatar_sized(
    State(state): State<Arc<AppState>>,
    Path((user, size)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    render_view(&state, ViewKind::Avatar, &user, Some(&size), Delivery::Inline).await
}

async fn helm(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> Result<Response, ApiError> {
    render_view(&state, ViewKind::Helm, &user, None, Delivery::Inline).await
}

async fn helm_sized(
    State(state): State<Arc<AppState>>,
    Path((user, size)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    render_view(&state, ViewKind::Helm, &user, Some(&size), Delivery::Inline).await
}

async fn skin(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> Result<Response, ApiError> {
    render_view(&state, ViewKind::Raw, &user, None, Delivery::Inline).await
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> Result<Response, ApiError> {
    render_view(&state, ViewKind::Raw, &user, None, Delivery::Attachment).await
}

async fn render_view(
    state: &AppState,
    view: ViewKind,
    user: &str,
    size: Option<&str>,
    delivery: Delivery,
) -> Result<Response, ApiError> {
    let identifier = strip_png_suffix(user);
    if !is_valid_identifier(identifier) {
        return Err(ApiError::not_found());
    }
    let request = RenderRequest::new(identifier, view, size.map(strip_png_suffix));
    let response = state
        .renderer
        .render(&request)
        .await
        .map_err(|err| map_render_error(err, state.config.error_logging))?;
    Ok(to_http_response(response, view, delivery))
}

fn to_http_response(
    response: render::RenderResponse,
    view: ViewKind,
    delivery: Delivery,
) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(response.content_type.as_ref())
            .unwrap_or(HeaderValue::from_static("image/png")),
    );
    headers.insert(
        "X-Requested",
        HeaderValue::from_static(match view {
            ViewKind::Raw => "skin",
            ViewKind::Avatar | ViewKind::Helm => "processed",
        }),
    );
    headers.insert(
        "X-Result",
        HeaderValue::from_static(response.outcome.result_label()),
    );
    headers.insert(
        "X-Skin-Source",
        HeaderValue::from_static(response.source.label()),
    );
    headers.insert(
        "X-Timing",
        HeaderValue::from_str(&response.timing.to_string())
            .unwrap_or(HeaderValue::from_static("0+0+0=0ms")),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_str(&response.cache_control)
            .unwrap_or(HeaderValue::from_static("no-store")),
    );
    if delivery == Delivery::Attachment {
        headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static(DOWNLOAD_DISPOSITION),
        );
    }
    (headers, response.bytes).into_response()
}

fn strip_png_suffix(segment: &str) -> &str {
    segment.strip_suffix(".png").unwrap_or(segment)
}

/// Player names and undashed ids: `[A-Za-z0-9_]{1,32}`.
pub fn is_valid_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier.len() <= MAX_IDENTIFIER_LEN
        && identifier
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    body: Value,
    log_detail: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message }),
            log_detail: None,
        }
    }

    fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "not found")
    }

    fn with_field(mut self, key: &str, value: Value) -> Self {
        if let Value::Object(map) = &mut self.body {
            map.insert(key.to_string(), value);
        }
        self
    }

    fn with_log_detail(mut self, detail: String) -> Self {
        if !detail.is_empty() {
            self.log_detail = Some(detail);
        }
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_message = extract_error_message(&self.body);
        if let Some(detail) = self.log_detail.as_deref() {
            debug!(status = %self.status, detail = %detail, "request error");
        }
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(message) = error_message.as_ref() {
            let sanitized = sanitize_error_header(message);
            if let Ok(value) = HeaderValue::from_str(&sanitized) {
                response.headers_mut().insert("X-Render-Error", value);
            }
        }
        response
    }
}

fn extract_error_message(body: &Value) -> Option<String> {
    let Value::Object(map) = body else {
        return None;
    };
    map.get("error")
        .and_then(|value| value.as_str())
        .map(|value| value.to_string())
}

fn sanitize_error_header(value: &str) -> String {
    let mut sanitized: String = value
        .chars()
        .filter(|ch| ch.is_ascii() && !ch.is_control())
        .collect();
    sanitized.truncate(200);
    sanitized
}

fn map_render_error(error: anyhow::Error, log_errors: bool) -> ApiError {
    let detail = error.to_string();
    let stage = if let Some(render_error) = error.downcast_ref::<RenderError>() {
        match render_error {
            RenderError::InvalidDimensions { .. } => "resize",
            RenderError::DerivationFailed { .. } => "extract",
        }
    } else if error.downcast_ref::<DecodeError>().is_some() {
        "decode"
    } else {
        "encode"
    };
    if log_errors {
        warn!(error = ?error, stage, "render failed");
    }
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "render failed")
        .with_field("stage", Value::String(stage.to_string()))
        .with_log_detail(detail)
}
