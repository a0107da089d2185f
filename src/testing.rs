use crate::codec::{SKIN_WIDTH, SkinLayout, encode_png};
use crate::config::Config;
use crate::upstream::{CanonicalUser, ProfileLookup, SkinStore, UpstreamError};
use async_trait::async_trait;
use bytes::Bytes;
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Every pixel distinct and opaque, except a sparse hat overlay on modern skins.
pub fn skin_image(layout: SkinLayout) -> RgbaImage {
    RgbaImage::from_fn(SKIN_WIDTH, layout.height(), |x, y| {
        let in_hat = (40..48).contains(&x) && (8..16).contains(&y);
        if layout == SkinLayout::Modern && in_hat {
            if (x + y) % 3 == 0 {
                Rgba([200, 10, 10, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        } else {
            Rgba([(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8, 255])
        }
    })
}

pub fn skin_png(layout: SkinLayout) -> Vec<u8> {
    encode_png(&skin_image(layout)).unwrap()
}

pub fn test_config(root: &Path, disk_cache: bool) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        disk_cache_enabled: disk_cache,
        skin_cache_dir: root.join("skins"),
        skin_store_url: "http://127.0.0.1:9/skins".to_string(),
        profile_api_url: "http://127.0.0.1:9/profiles".to_string(),
        upstream_timeout_seconds: 2,
        max_skin_bytes: 65_536,
        resolved_cache_ttl: Duration::from_secs(172_800),
        fallback_cache_ttl: Duration::from_secs(900),
        max_in_flight_requests: 16,
        static_dir: root.join("www"),
        not_found_page: root.join("static/404.html"),
        access_logging: false,
        error_logging: true,
    }
}

fn outage(url: &str) -> UpstreamError {
    UpstreamError::Transport {
        url: url.to_string(),
        message: "connection refused".to_string(),
    }
}

#[derive(Default)]
pub struct MockSkinStore {
    skins: HashMap<String, Vec<u8>>,
    outage: bool,
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl MockSkinStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skin(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.skins.insert(name.to_string(), bytes);
        self
    }

    pub fn with_outage(mut self) -> Self {
        self.outage = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl SkinStore for MockSkinStore {
    async fn fetch_skin(&self, name: &str) -> Result<Bytes, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(name.to_string());
        if self.outage {
            return Err(outage("mock://skins"));
        }
        self.skins
            .get(name)
            .map(|bytes| Bytes::from(bytes.clone()))
            .ok_or(UpstreamError::NotFound)
    }
}

#[derive(Default)]
pub struct MockProfiles {
    users: HashMap<String, CanonicalUser>,
    outage: bool,
    calls: AtomicUsize,
}

impl MockProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, requested: &str, name: &str, id: &str) -> Self {
        self.users.insert(
            requested.to_string(),
            CanonicalUser {
                name: name.to_string(),
                canonical_id: id.to_string(),
            },
        );
        self
    }

    pub fn with_outage(mut self) -> Self {
        self.outage = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileLookup for MockProfiles {
    async fn resolve_user(&self, name: &str) -> Result<CanonicalUser, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.outage {
            return Err(outage("mock://profiles"));
        }
        self.users.get(name).cloned().ok_or(UpstreamError::NotFound)
    }
}
