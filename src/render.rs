use crate::codec;
use crate::config::Config;
use crate::extract::{ViewKind, extract};
use crate::resize::resize;
use crate::resolver::{ResolutionOutcome, ResolvedSkin, SkinResolver, SkinSource};
use anyhow::{Context, Result};
use mime::Mime;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task;
use tracing::debug;

pub const DEFAULT_SIZE: u32 = 180;
pub const MIN_SIZE: u32 = 8;
pub const MAX_SIZE: u32 = 300;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid target dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("region derivation failed: {reason}")]
    DerivationFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub identifier: String,
    pub view: ViewKind,
    pub size: u32,
}

impl RenderRequest {
    pub fn new(identifier: impl Into<String>, view: ViewKind, size_param: Option<&str>) -> Self {
        Self {
            identifier: identifier.into(),
            view,
            size: rationalize_size(size_param),
        }
    }
}

/// Milliseconds spent in each stage. `total_ms` runs from request start to
/// the end of the resize stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingBreakdown {
    pub fetch_ms: u128,
    pub process_ms: u128,
    pub resize_ms: u128,
    pub total_ms: u128,
}

impl TimingBreakdown {
    fn from_marks(start: Instant, fetched: Instant, processed: Instant, resized: Instant) -> Self {
        Self {
            fetch_ms: millis_between(start, fetched),
            process_ms: millis_between(fetched, processed),
            resize_ms: millis_between(processed, resized),
            total_ms: millis_between(start, resized),
        }
    }
}

impl fmt::Display for TimingBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}+{}+{}={}ms",
            self.fetch_ms, self.process_ms, self.resize_ms, self.total_ms
        )
    }
}

#[derive(Debug, Clone)]
pub struct RenderResponse {
    pub bytes: Vec<u8>,
    pub content_type: Mime,
    pub outcome: ResolutionOutcome,
    pub source: SkinSource,
    pub timing: TimingBreakdown,
    pub cache_control: String,
}

#[derive(Clone)]
pub struct Renderer {
    resolver: SkinResolver,
    resolved_ttl: Duration,
    fallback_ttl: Duration,
}

impl Renderer {
    pub fn new(config: &Config, resolver: SkinResolver) -> Self {
        Self {
            resolver,
            resolved_ttl: config.resolved_cache_ttl,
            fallback_ttl: config.fallback_cache_ttl,
        }
    }

    pub async fn render(&self, request: &RenderRequest) -> Result<RenderResponse> {
        let started = Instant::now();
        let ResolvedSkin {
            bitmap,
            outcome,
            source,
        } = self.resolver.resolve(&request.identifier).await;
        let fetched = Instant::now();

        let view = request.view;
        let size = request.size;
        let (bytes, processed, resized) = task::spawn_blocking(move || -> Result<_> {
            let derived = extract(view, &bitmap)?;
            let processed = Instant::now();
            let output = match view {
                ViewKind::Raw => derived,
                ViewKind::Avatar | ViewKind::Helm => resize(size, size, &derived)?,
            };
            let resized = Instant::now();
            let bytes = codec::encode_png(&output)?;
            Ok((bytes, processed, resized))
        })
        .await
        .context("render task failed")??;

        let timing = TimingBreakdown::from_marks(started, fetched, processed, resized);
        debug!(
            identifier = %request.identifier,
            view = view.label(),
            size,
            outcome = outcome.result_label(),
            source = source.label(),
            timing = %timing,
            "rendered"
        );
        Ok(RenderResponse {
            bytes,
            content_type: mime::IMAGE_PNG,
            outcome,
            source,
            timing,
            cache_control: self.cache_control_for(outcome),
        })
    }

    pub fn cache_control_for(&self, outcome: ResolutionOutcome) -> String {
        match outcome {
            ResolutionOutcome::Resolved => cache_control_header(self.resolved_ttl),
            ResolutionOutcome::Fallback => cache_control_header(self.fallback_ttl),
        }
    }
}

/// Clamps a requested size into `[MIN_SIZE, MAX_SIZE]`. Missing or
/// non-numeric input yields `DEFAULT_SIZE`; digit strings too long to parse
/// clamp to `MAX_SIZE`.
pub fn rationalize_size(raw: Option<&str>) -> u32 {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return DEFAULT_SIZE;
    };
    match raw.parse::<u64>() {
        Ok(value) => value.clamp(u64::from(MIN_SIZE), u64::from(MAX_SIZE)) as u32,
        Err(_) if raw.chars().all(|ch| ch.is_ascii_digit()) => MAX_SIZE,
        Err(_) => DEFAULT_SIZE,
    }
}

pub(crate) fn cache_control_header(ttl: Duration) -> String {
    format!("public, max-age={}", ttl.as_secs())
}

fn millis_between(earlier: Instant, later: Instant) -> u128 {
    later.saturating_duration_since(earlier).as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SkinCache;
    use crate::codec::SkinLayout;
    use crate::default_skin::default_skin;
    use crate::testing::{MockProfiles, MockSkinStore, skin_image, skin_png, test_config};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn renderer(
        config: &Config,
        skins: &Arc<MockSkinStore>,
        profiles: &Arc<MockProfiles>,
    ) -> Renderer {
        let cache = SkinCache::new(config).unwrap();
        let resolver = SkinResolver::new(cache, skins.clone(), profiles.clone());
        Renderer::new(config, resolver)
    }

    #[test]
    fn size_is_clamped_or_defaulted() {
        assert_eq!(rationalize_size(None), 180);
        assert_eq!(rationalize_size(Some("")), 180);
        assert_eq!(rationalize_size(Some("abc")), 180);
        assert_eq!(rationalize_size(Some("-5")), 180);
        assert_eq!(rationalize_size(Some("12.5")), 180);
        assert_eq!(rationalize_size(Some("0")), 8);
        assert_eq!(rationalize_size(Some("7")), 8);
        assert_eq!(rationalize_size(Some("8")), 8);
        assert_eq!(rationalize_size(Some("64")), 64);
        assert_eq!(rationalize_size(Some("300")), 300);
        assert_eq!(rationalize_size(Some("301")), 300);
        assert_eq!(rationalize_size(Some("99999999999999999999999")), 300);
    }

    #[test]
    fn size_is_always_in_range() {
        for value in 0..1000u32 {
            let size = rationalize_size(Some(&value.to_string()));
            assert!((MIN_SIZE..=MAX_SIZE).contains(&size));
        }
    }

    #[test]
    fn timing_string_is_additive_format() {
        let timing = TimingBreakdown {
            fetch_ms: 12,
            process_ms: 1,
            resize_ms: 3,
            total_ms: 16,
        };
        assert_eq!(timing.to_string(), "12+1+3=16ms");
    }

    #[tokio::test]
    async fn cached_modern_avatar_scenario() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), true);
        let cache = SkinCache::new(&config).unwrap();
        cache.store("Notch", &skin_png(SkinLayout::Modern)).await.unwrap();
        let skins = Arc::new(MockSkinStore::new());
        let profiles = Arc::new(MockProfiles::new());
        let renderer = renderer(&config, &skins, &profiles);

        let request = RenderRequest::new("Notch", ViewKind::Avatar, Some("64"));
        let response = renderer.render(&request).await.unwrap();
        assert_eq!(response.outcome, ResolutionOutcome::Resolved);
        assert_eq!(response.source, SkinSource::DiskCache);
        assert_eq!(response.content_type, mime::IMAGE_PNG);
        assert_eq!(response.cache_control, "public, max-age=172800");
        assert_eq!(skins.calls(), 0);
        assert_eq!(profiles.calls(), 0);

        let image = codec::decode_png(&response.bytes).unwrap();
        assert_eq!(image.dimensions(), (64, 64));
        let skin = skin_image(SkinLayout::Modern);
        assert_eq!(image.get_pixel(0, 0), skin.get_pixel(8, 8));
        assert_eq!(image.get_pixel(63, 63), skin.get_pixel(15, 15));
    }

    #[tokio::test]
    async fn unknown_helm_scenario_serves_default() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), false);
        let skins = Arc::new(MockSkinStore::new());
        let profiles = Arc::new(MockProfiles::new());
        let renderer = renderer(&config, &skins, &profiles);

        let request = RenderRequest::new("Nobody", ViewKind::Helm, None);
        let response = renderer.render(&request).await.unwrap();
        assert_eq!(response.outcome, ResolutionOutcome::Fallback);
        assert_eq!(response.cache_control, "public, max-age=900");

        let image = codec::decode_png(&response.bytes).unwrap();
        assert_eq!(image.dimensions(), (180, 180));
        let expected = resize(
            180,
            180,
            &extract(ViewKind::Helm, &default_skin()).unwrap(),
        )
        .unwrap();
        assert_eq!(image, expected);
    }

    #[tokio::test]
    async fn raw_view_keeps_native_size() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), false);
        let skins =
            Arc::new(MockSkinStore::new().with_skin("Notch", skin_png(SkinLayout::Legacy)));
        let profiles = Arc::new(MockProfiles::new());
        let renderer = renderer(&config, &skins, &profiles);

        let request = RenderRequest::new("Notch", ViewKind::Raw, Some("300"));
        let response = renderer.render(&request).await.unwrap();
        let image = codec::decode_png(&response.bytes).unwrap();
        assert_eq!(image, skin_image(SkinLayout::Legacy));
        assert!(response.timing.total_ms >= response.timing.fetch_ms);
    }

    #[tokio::test]
    async fn derived_images_round_trip_through_png() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), false);
        let skins =
            Arc::new(MockSkinStore::new().with_skin("Notch", skin_png(SkinLayout::Modern)));
        let profiles = Arc::new(MockProfiles::new());
        let renderer = renderer(&config, &skins, &profiles);

        let skin = crate::codec::SkinBitmap::from_image(skin_image(SkinLayout::Modern)).unwrap();
        for view in [ViewKind::Avatar, ViewKind::Helm] {
            let derived = extract(view, &skin).unwrap();
            assert_eq!(codec::decode_png(&codec::encode_png(&derived).unwrap()).unwrap(), derived);
            for size in [8u32, 33, 180] {
                let expected = resize(size, size, &derived).unwrap();
                let request = RenderRequest::new("Notch", view, Some(&size.to_string()));
                let response = renderer.render(&request).await.unwrap();
                assert_eq!(codec::decode_png(&response.bytes).unwrap(), expected);
            }
        }
    }
}
