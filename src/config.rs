use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::env;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;
use url::Url;

const DEFAULT_CONFIG_FILE: &str = "config.json";
const DEFAULT_SKIN_STORE_URL: &str = "http://skins.minecraft.net/MinecraftSkins";
const DEFAULT_PROFILE_API_URL: &str = "https://api.mojang.com/users/profiles/minecraft";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub disk_cache_enabled: bool,
    pub skin_cache_dir: PathBuf,
    pub skin_store_url: String,
    pub profile_api_url: String,
    pub upstream_timeout_seconds: u64,
    pub max_skin_bytes: usize,
    pub resolved_cache_ttl: Duration,
    pub fallback_cache_ttl: Duration,
    pub max_in_flight_requests: usize,
    pub static_dir: PathBuf,
    pub not_found_page: PathBuf,
    pub access_logging: bool,
    pub error_logging: bool,
}

/// Legacy JSON settings file. Environment variables take precedence.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct FileConfig {
    disk_cache: bool,
    error_logging: bool,
    access_logging: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            disk_cache: false,
            error_logging: true,
            access_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let config_file =
            env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let file = load_file_config(Path::new(&config_file))?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_u16("PORT", 9999);
        let disk_cache_enabled = parse_bool("DISK_CACHE", file.disk_cache);
        let skin_cache_dir =
            PathBuf::from(env::var("SKIN_CACHE_DIR").unwrap_or_else(|_| "skins".to_string()));
        let skin_store_url = parse_base_url("SKIN_STORE_URL", DEFAULT_SKIN_STORE_URL)?;
        let profile_api_url = parse_base_url("PROFILE_API_URL", DEFAULT_PROFILE_API_URL)?;
        let upstream_timeout_seconds = parse_u64("UPSTREAM_TIMEOUT_SECONDS", 10).max(1);
        let max_skin_bytes = parse_usize("MAX_SKIN_BYTES", 65_536);
        let resolved_cache_ttl =
            Duration::from_secs(parse_u64("RESOLVED_CACHE_TTL_SECONDS", 2 * 24 * 3600));
        let fallback_cache_ttl =
            Duration::from_secs(parse_u64("FALLBACK_CACHE_TTL_SECONDS", 15 * 60));
        let max_in_flight_requests = parse_usize("MAX_IN_FLIGHT_REQUESTS", 512);
        let static_dir =
            PathBuf::from(env::var("STATIC_DIR").unwrap_or_else(|_| "www".to_string()));
        let not_found_page = PathBuf::from(
            env::var("NOT_FOUND_PAGE").unwrap_or_else(|_| "static/404.html".to_string()),
        );
        let access_logging = parse_bool("ACCESS_LOGGING", file.access_logging);
        let error_logging = parse_bool("ERROR_LOGGING", file.error_logging);

        if max_skin_bytes == 0 {
            return Err(anyhow!("MAX_SKIN_BYTES must be greater than zero"));
        }
        if fallback_cache_ttl > resolved_cache_ttl {
            warn!(
                fallback_seconds = fallback_cache_ttl.as_secs(),
                resolved_seconds = resolved_cache_ttl.as_secs(),
                "fallback renders are cached longer than resolved ones"
            );
        }

        Ok(Self {
            host,
            port,
            disk_cache_enabled,
            skin_cache_dir,
            skin_store_url,
            profile_api_url,
            upstream_timeout_seconds,
            max_skin_bytes,
            resolved_cache_ttl,
            fallback_cache_ttl,
            max_in_flight_requests,
            static_dir,
            not_found_page,
            access_logging,
            error_logging,
        })
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(FileConfig::default()),
        Err(err) => {
            return Err(err).with_context(|| format!("read config file {}", path.display()));
        }
    };
    serde_json::from_str(&raw).with_context(|| format!("parse config file {}", path.display()))
}

fn parse_base_url(key: &str, default: &str) -> Result<String> {
    let raw = env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string());
    let parsed = Url::parse(&raw).with_context(|| format!("{key} is not a valid url"))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(anyhow!("{key} must be an http or https url"));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn parse_u16(key: &str, default: u16) -> u16 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
