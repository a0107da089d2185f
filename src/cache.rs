use crate::config::Config;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const MAX_KEY_LEN: usize = 64;

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Best-effort on-disk store of raw skin bytes, one `<name>.png` per player.
/// Entries never expire; writes replace whole files.
#[derive(Debug, Clone)]
pub struct SkinCache {
    dir: PathBuf,
    enabled: bool,
}

impl SkinCache {
    pub fn new(config: &Config) -> Result<Self> {
        let cache = Self::with_dir(config.skin_cache_dir.clone(), config.disk_cache_enabled);
        if cache.enabled {
            std::fs::create_dir_all(&cache.dir).with_context(|| {
                format!("create skin cache dir {}", cache.dir.display())
            })?;
        }
        Ok(cache)
    }

    pub fn with_dir(dir: PathBuf, enabled: bool) -> Self {
        Self { dir, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// `None` for keys that are not a single safe file name.
    pub fn path_for(&self, name: &str) -> Option<PathBuf> {
        if !is_safe_key(name) {
            return None;
        }
        Some(self.dir.join(format!("{name}.png")))
    }

    pub async fn load(&self, name: &str) -> Option<Vec<u8>> {
        if !self.enabled {
            return None;
        }
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    debug!(error = ?err, path = %path.display(), "skin cache read failed");
                }
                None
            }
        }
    }

    pub async fn store(&self, name: &str, bytes: &[u8]) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let Some(path) = self.path_for(name) else {
            debug!(name = %name, "skipping skin cache write for unsafe key");
            return Ok(());
        };
        store_file(&path, bytes).await
    }
}

async fn store_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent).await?;
    let temp_path = temp_path_for(parent, path);
    if let Err(err) = tokio::fs::write(&temp_path, bytes).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(err).context("write skin cache temp file");
    }
    if let Err(err) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(err).context("rename skin cache file");
    }
    Ok(())
}

/// Unique per write: concurrent stores of one key never share a temp file.
fn temp_path_for(parent: &Path, path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("skin");
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or(0);
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    parent.join(format!(
        ".{file_name}.tmp-{}-{nanos}-{seq}",
        std::process::id()
    ))
}

fn is_safe_key(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_KEY_LEN
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
