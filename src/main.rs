#![allow(clippy::collapsible_if)]

mod cache;
mod codec;
mod config;
mod default_skin;
mod extract;
mod http;
mod landing;
mod render;
mod resize;
mod resolver;
mod state;
#[cfg(test)]
mod testing;
mod upstream;

use crate::cache::SkinCache;
use crate::config::Config;
use crate::render::Renderer;
use crate::resolver::SkinResolver;
use crate::state::AppState;
use crate::upstream::HttpUpstream;
use axum::Router;
use axum::body::HttpBody;
use axum::http::{Response, header};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::compression::{
    CompressionLayer,
    predicate::{DefaultPredicate, Predicate},
};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};

#[derive(Clone)]
struct NoImageCompression {
    inner: DefaultPredicate,
}

impl NoImageCompression {
    fn new() -> Self {
        Self {
            inner: DefaultPredicate::new(),
        }
    }
}

impl Predicate for NoImageCompression {
    fn should_compress<B>(&self, response: &Response<B>) -> bool
    where
        B: HttpBody,
    {
        if let Some(content_type) = response.headers().get(header::CONTENT_TYPE) {
            if let Ok(content_type) = content_type.to_str() {
                if content_type.starts_with("image/") {
                    return false;
                }
            }
        }
        self.inner.should_compress(response)
    }
}

fn build_app(state: Arc<AppState>) -> Router {
    let max_in_flight = state.config.max_in_flight_requests;
    let access_logging = state.config.access_logging;
    let landing = landing::router(&state.config.static_dir, &state.config.not_found_page);
    let app = http::router(state)
        .fallback_service(landing.into_service())
        .layer(CompressionLayer::new().compress_when(NoImageCompression::new()));
    let app = if access_logging {
        app.layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(false))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
    } else {
        app
    };
    // zero disables the limit
    match max_in_flight {
        0 => app,
        limit => app.layer(ConcurrencyLimitLayer::new(limit.min(Semaphore::MAX_PERMITS))),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    info!(
        disk_cache = config.disk_cache_enabled,
        skin_cache_dir = %config.skin_cache_dir.display(),
        skin_store_url = %config.skin_store_url,
        profile_api_url = %config.profile_api_url,
        access_logging = config.access_logging,
        error_logging = config.error_logging,
        "startup config summary"
    );

    let cache = SkinCache::new(&config)?;
    let upstream = Arc::new(HttpUpstream::new(&config)?);
    let resolver = SkinResolver::new(cache, upstream.clone(), upstream);
    let renderer = Renderer::new(&config, resolver);

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config, renderer));
    let app = build_app(state);

    let listener = TcpListener::bind(&addr).await?;
    info!(address = %addr, "avatar renderer listening");
    axum::serve(listener, app).await?;
    Ok(())
}
