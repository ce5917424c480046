use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "seekbot.toml";

/// Runtime settings. Read from a TOML file, then overridden by `SEEKBOT_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// `None` selects a SQLite file in the user's data directory.
    pub database_url: Option<String>,
    pub av_fetch_timeout_secs: u64,
    pub game_fetch_timeout_secs: u64,
    pub batch_image_cap: usize,
    pub max_concurrent_fetches: usize,
    pub status_retract_secs: u64,
    pub game_cache_ttl_secs: i64,
    pub game_image_scale: f32,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub av_gateway_url: String,
    pub steam_store_url: String,
    pub steam_api_url: String,
    pub steam_country: String,
    pub steam_language: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            av_fetch_timeout_secs: 15,
            game_fetch_timeout_secs: 5,
            batch_image_cap: 8,
            max_concurrent_fetches: 16,
            status_retract_secs: 15,
            game_cache_ttl_secs: 60 * 60,
            game_image_scale: 0.5,
            user_agent: format!("seekbot/{}", env!("CARGO_PKG_VERSION")),
            http_timeout_secs: 20,
            av_gateway_url: "http://127.0.0.1:8090/".to_string(),
            steam_store_url: "https://store.steampowered.com/".to_string(),
            steam_api_url: "https://api.steampowered.com/".to_string(),
            steam_country: "cn".to_string(),
            steam_language: "schinese".to_string(),
        }
    }
}

impl BotConfig {
    /// Load `path`, or `seekbot.toml` in the working directory when no path is
    /// given. A missing default file yields defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() { Self::from_file(default)? } else { Self::default() }
            }
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config: {}", path.display()))
    }

    /// Apply `SEEKBOT_*` overrides. Unparseable values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(v: Option<String>) -> Option<T> {
            v.and_then(|s| s.trim().parse().ok())
        }
        if let Some(v) = lookup("SEEKBOT_DATABASE_URL").filter(|s| !s.trim().is_empty()) { self.database_url = Some(v); }
        if let Some(v) = parsed(lookup("SEEKBOT_AV_FETCH_TIMEOUT_SECS")) { self.av_fetch_timeout_secs = v; }
        if let Some(v) = parsed(lookup("SEEKBOT_GAME_FETCH_TIMEOUT_SECS")) { self.game_fetch_timeout_secs = v; }
        if let Some(v) = parsed(lookup("SEEKBOT_BATCH_IMAGE_CAP")) { self.batch_image_cap = v; }
        if let Some(v) = parsed(lookup("SEEKBOT_MAX_CONCURRENT_FETCHES")) { self.max_concurrent_fetches = v; }
        if let Some(v) = parsed(lookup("SEEKBOT_STATUS_RETRACT_SECS")) { self.status_retract_secs = v; }
        if let Some(v) = parsed(lookup("SEEKBOT_GAME_CACHE_TTL_SECS")) { self.game_cache_ttl_secs = v; }
        if let Some(v) = parsed(lookup("SEEKBOT_GAME_IMAGE_SCALE")) { self.game_image_scale = v; }
        if let Some(v) = parsed(lookup("SEEKBOT_HTTP_TIMEOUT_SECS")) { self.http_timeout_secs = v; }
        if let Some(v) = lookup("SEEKBOT_USER_AGENT") { self.user_agent = v; }
        if let Some(v) = lookup("SEEKBOT_AV_GATEWAY_URL") { self.av_gateway_url = v; }
        if let Some(v) = lookup("SEEKBOT_STEAM_STORE_URL") { self.steam_store_url = v; }
        if let Some(v) = lookup("SEEKBOT_STEAM_API_URL") { self.steam_api_url = v; }
        if let Some(v) = lookup("SEEKBOT_STEAM_COUNTRY") { self.steam_country = v; }
        if let Some(v) = lookup("SEEKBOT_STEAM_LANGUAGE") { self.steam_language = v; }
    }

    pub fn av_fetch_timeout(&self) -> Duration { Duration::from_secs(self.av_fetch_timeout_secs) }
    pub fn game_fetch_timeout(&self) -> Duration { Duration::from_secs(self.game_fetch_timeout_secs) }
    pub fn status_retract_after(&self) -> Duration { Duration::from_secs(self.status_retract_secs) }
    pub fn http_timeout(&self) -> Duration { Duration::from_secs(self.http_timeout_secs) }

    /// `None` when scaling is disabled (a factor of 1 or anything out of range).
    pub fn game_image_scale(&self) -> Option<f32> {
        let s = self.game_image_scale;
        (s > 0.0 && s < 1.0).then_some(s)
    }
}
