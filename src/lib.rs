pub mod aggregator;
pub mod assemble;
pub mod config;
pub mod dao;
pub mod db;
pub mod error;
pub mod joiner;
pub mod mapping;
pub mod persist;
pub mod resolver;
pub mod sink;
pub mod sources;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// --- Library API for embedding ---

/// Convenience re-exports for embedders.
pub mod prelude {
    pub use crate::aggregator::{Aggregator, Answered, LookupOutcome};
    pub use crate::assemble::{MessageSection, Segment, SectionLabel};
    pub use crate::config::BotConfig;
    pub use crate::error::PipelineError;
    pub use crate::sink::{ConsoleSink, MessageSink, Receipt};
    pub use crate::types::{AvDetail, GameHit, GameInfo, ResolveSource, Resolved};
    pub use crate::{BotStats, Command, SeekBot};
}

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregator::{current_epoch, Aggregator, LookupOutcome};
use crate::config::BotConfig;
use crate::db::Database;
use crate::sink::MessageSink;
use crate::sources::{http_client, GatewayAvScraper, HttpImageFetcher, SteamGameSource};

/// A chat message the bot answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Av(String),
    Game(String),
}

impl Command {
    pub const AV_PREFIX: &'static str = "/av ";
    pub const GAME_PREFIX: &'static str = "/game ";

    /// Prefix match on the raw text. The argument is whatever follows the
    /// prefix; blank arguments are ignored.
    pub fn parse(text: &str) -> Option<Self> {
        if let Some(rest) = text.strip_prefix(Self::AV_PREFIX) {
            return (!rest.trim().is_empty()).then(|| Command::Av(rest.to_string()));
        }
        if let Some(rest) = text.strip_prefix(Self::GAME_PREFIX) {
            return (!rest.trim().is_empty()).then(|| Command::Game(rest.to_string()));
        }
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotStats {
    pub av_records: usize,
    pub preview_urls: usize,
    pub cache_entries: usize,
    pub expired_cache_entries: usize,
}

/// Async library entry point. Owns the database and the lookup pipelines.
pub struct SeekBot {
    db: Database,
    aggregator: Aggregator,
}

impl SeekBot {
    /// Open (and migrate) the database and build the HTTP collaborators.
    pub async fn connect(cfg: BotConfig) -> Result<Self> {
        let db = Database::connect(cfg.database_url.as_deref()).await?;
        db.run_migrations().await?;
        let client = http_client(&cfg)?;
        let av = GatewayAvScraper::new(client.clone(), &cfg.av_gateway_url)?;
        let games = SteamGameSource::new(
            client.clone(),
            &cfg.steam_store_url,
            &cfg.steam_api_url,
            &cfg.steam_country,
            &cfg.steam_language,
        )?;
        let images = HttpImageFetcher::new(client);
        let aggregator = Aggregator::new(Arc::new(db.clone()), Arc::new(av), Arc::new(games), Arc::new(images), cfg);
        Ok(Self { db, aggregator })
    }

    pub fn database(&self) -> &Database { &self.db }
    pub fn aggregator(&self) -> &Aggregator { &self.aggregator }
    pub fn config(&self) -> &BotConfig { self.aggregator.config() }

    /// Route one chat message. Text that is not a command yields `None`.
    pub async fn handle(&self, text: &str, sink: &dyn MessageSink) -> Result<Option<LookupOutcome>> {
        let outcome = match Command::parse(text) {
            Some(Command::Av(code)) => self.aggregator.av_lookup(&code, sink).await?,
            Some(Command::Game(name)) => self.aggregator.game_lookup(&name, sink).await?,
            None => {
                debug!(text, "not a command");
                return Ok(None);
            }
        };
        Ok(Some(outcome))
    }

    pub async fn clear_cache_prefix(&self, prefix: Option<&str>) -> Result<u64> { self.db.clear_cache_prefix(prefix).await }
    pub async fn purge_expired_cache(&self) -> Result<u64> { self.db.purge_expired_cache(current_epoch()).await }
    pub async fn vacuum_db(&self) -> Result<()> { self.db.vacuum().await }

    pub async fn stats(&self) -> Result<BotStats> {
        let pool = self.db.pool();
        let av_records = dao::count_av(pool).await?;
        let preview_urls = dao::count_previews(pool).await?;
        let (cache_entries, expired) = dao::count_cache_entries(pool, current_epoch()).await?;
        Ok(BotStats {
            av_records: av_records as usize,
            preview_urls: preview_urls as usize,
            cache_entries: cache_entries as usize,
            expired_cache_entries: expired as usize,
        })
    }
}
