//! Live-data collaborators. The pipelines only see these traits; the HTTP
//! implementations live in the submodules.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;

use crate::config::BotConfig;
use crate::types::{AvDetail, GameHit, GameInfo, MagnetLinks};

pub mod gateway;
pub mod images;
pub mod steam;

pub use gateway::GatewayAvScraper;
pub use images::HttpImageFetcher;
pub use steam::SteamGameSource;

/// One call per field of an AV record.
#[async_trait]
pub trait AvScraper: Send + Sync {
    async fn detail(&self, code: &str) -> Result<Option<AvDetail>>;
    async fn play_urls(&self, code: &str) -> Result<Vec<String>>;
    async fn magnets(&self, code: &str) -> Result<MagnetLinks>;
    async fn description(&self, code: &str) -> Result<Option<String>>;
    async fn duration(&self, code: &str) -> Result<Option<String>>;
    async fn previews(&self, code: &str) -> Result<Vec<String>>;
}

#[async_trait]
pub trait GameSource: Send + Sync {
    /// Best match for a free-text name. Only sources that index console
    /// titles return [`GameKind::Console`](crate::types::GameKind::Console) hits; the Steam store never does.
    async fn search(&self, name: &str) -> Result<Option<GameHit>>;
    async fn info(&self, app_id: u32) -> Result<Option<GameInfo>>;
    async fn introduction(&self, app_id: u32) -> Result<Option<String>>;
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Raw image bytes; with `scale`, down-scaled and re-encoded as JPEG.
    async fn fetch(&self, url: &str, scale: Option<f32>) -> Result<Bytes>;
}

pub fn http_client(cfg: &BotConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(cfg.user_agent.clone())
        .timeout(cfg.http_timeout())
        .build()
        .context("building http client")
}
