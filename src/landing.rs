use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tracing::debug;

const INDEX_FILE: &str = "index.html";
const ASSETS_DIR: &str = "assets";
const NOT_FOUND_TEXT: &str = "404 file not found";

/// Site pages: `/` is `<static_dir>/index.html`, `/assets/*` is served from
/// `<static_dir>/assets`. Any other path, or a missing file, gets the 404 page.
pub fn router(static_dir: &Path, not_found_page: &Path) -> Router {
    let not_found_page = Arc::new(not_found_page.to_path_buf());
    Router::new()
        .route_service("/", ServeFile::new(static_dir.join(INDEX_FILE)))
        .nest_service("/assets", ServeDir::new(static_dir.join(ASSETS_DIR)))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(middleware::from_fn_with_state(not_found_page, fill_not_found))
}

async fn fill_not_found(
    State(page): State<Arc<PathBuf>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    if response.status() == StatusCode::NOT_FOUND {
        response = not_found_response(&page).await;
    }
    response
        .headers_mut()
        .insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    response
}

async fn not_found_response(page: &Path) -> Response {
    match tokio::fs::read(page).await {
        Ok(bytes) => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            bytes,
        )
            .into_response(),
        Err(err) => {
            debug!(error = %err, path = %page.display(), "no custom 404 page");
            (StatusCode::NOT_FOUND, NOT_FOUND_TEXT).into_response()
        }
    }
}
