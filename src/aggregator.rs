use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::assemble::{
    assemble_av, assemble_console, assemble_game, select_batch_urls, AvTemplate, BatchItem, GameTemplate,
    GAME_NOT_FOUND, PLACEHOLDER, PREVIEW_FAILED, SEARCHING,
};
use crate::config::BotConfig;
use crate::error::PipelineError;
use crate::joiner::{FetchPool, JoinReport, Joiner, Pending, Settled};
use crate::mapping::game_cache_key;
use crate::persist::{choose_previews, spawn_persist_av, spawn_persist_game, LiveAvFields};
use crate::resolver::{av_lock_key, normalize_av_code, resolve_av, resolve_game_info, search_game, KeyLocks};
use crate::sink::MessageSink;
use crate::sources::{AvScraper, GameSource, ImageFetcher};
use crate::storage::Storage;
use crate::types::{GameHit, GameKind, MagnetLinks, ResolveSource, Resolved, SectionId};

/// What a lookup ended with, for callers and tests.
#[derive(Debug)]
pub enum LookupOutcome {
    /// The not-found text was sent and nothing else ran.
    NotFound(String),
    /// Console game: summary-only reply.
    Console(GameHit),
    Answered(Answered),
}

#[derive(Debug)]
pub struct Answered {
    pub key: String,
    pub source: ResolveSource,
    pub report: JoinReport,
    /// Write-back task for live entities; `None` for cached ones.
    pub persist: Option<JoinHandle<Result<(), PipelineError>>>,
}

impl LookupOutcome {
    pub fn answered(&self) -> Option<&Answered> {
        match self {
            LookupOutcome::Answered(a) => Some(a),
            _ => None,
        }
    }

    pub fn into_answered(self) -> Option<Answered> {
        match self {
            LookupOutcome::Answered(a) => Some(a),
            _ => None,
        }
    }
}

/// Aggregator owns storage, the live collaborators and the fetch pool, and runs
/// the two lookup pipelines.
pub struct Aggregator {
    storage: Arc<dyn Storage>,
    av: Arc<dyn AvScraper>,
    games: Arc<dyn GameSource>,
    images: Arc<dyn ImageFetcher>,
    pool: FetchPool,
    locks: KeyLocks,
    cfg: BotConfig,
}

impl Aggregator {
    pub fn new(
        storage: Arc<dyn Storage>,
        av: Arc<dyn AvScraper>,
        games: Arc<dyn GameSource>,
        images: Arc<dyn ImageFetcher>,
        cfg: BotConfig,
    ) -> Self {
        let pool = FetchPool::new(cfg.max_concurrent_fetches);
        Self { storage, av, games, images, pool, locks: KeyLocks::new(), cfg }
    }

    pub fn config(&self) -> &BotConfig { &self.cfg }
    pub fn storage(&self) -> &Arc<dyn Storage> { &self.storage }
    pub fn fetch_pool(&self) -> &FetchPool { &self.pool }

    fn launch_image(&self, joiner: &Joiner, section: SectionId, url: String, scale: Option<f32>, deadline: Duration) -> Pending<Bytes> {
        let images = self.images.clone();
        joiner.launch(section, deadline, async move {
            images.fetch(&url, scale).await.map_err(|e| {
                anyhow::Error::new(PipelineError::ImageDownloadFailure { url: url.clone(), reason: format!("{e:#}") })
            })
        })
    }

    async fn retract_status(&self, sink: &dyn MessageSink, receipt: crate::sink::Receipt) {
        if let Err(e) = sink.retract(receipt, self.cfg.status_retract_after()).await {
            warn!(error = %e, "could not schedule status retraction");
        }
    }

    /// `/av <code>`: resolve, enrich, reply, then persist live records.
    pub async fn av_lookup(&self, raw_code: &str, sink: &dyn MessageSink) -> Result<LookupOutcome> {
        let code = normalize_av_code(raw_code);
        let receipt = sink.reply_status(SEARCHING).await?;
        let guard = self.locks.lock(&av_lock_key(&code)).await;
        let resolved = resolve_av(self.storage.as_ref(), self.av.as_ref(), &code).await;
        self.retract_status(sink, receipt).await;

        let resolved = match resolved {
            Ok(r) => r,
            Err(e) => {
                info!(code = %code, error = %e, "av lookup found nothing");
                sink.send_text(PLACEHOLDER).await?;
                return Ok(LookupOutcome::NotFound(code));
            }
        };
        let source = resolved.source();
        info!(code = %code, source = %source, "av record resolved");

        let deadline = self.cfg.av_fetch_timeout();
        let cap = self.cfg.batch_image_cap;
        let mut joiner = self.pool.joiner();
        // Only a live record keeps the key locked, until its write-back is done.
        let (detail, guard) = match resolved {
            Resolved::Cached(d) => {
                drop(guard);
                (d, None)
            }
            Resolved::Live(d) => (d, Some(guard)),
        };
        let live = guard.is_some();

        let cover = detail
            .cover_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .map(|u| self.launch_image(&joiner, SectionId::Cover, u, None, deadline));

        let (play, magnets, description, previews, duration) = if live {
            let av = &self.av;
            let description = {
                let (s, c) = (av.clone(), code.clone());
                joiner.launch(SectionId::Description, deadline, async move { s.description(&c).await })
            };
            // Only persistence needs the duration; the reply never waits on it.
            let duration = {
                let (s, c) = (av.clone(), code.clone());
                joiner.launch(SectionId::Duration, deadline, async move { s.duration(&c).await })
            };
            let play = {
                let (s, c) = (av.clone(), code.clone());
                joiner.launch(SectionId::PlayLinks, deadline, async move { s.play_urls(&c).await })
            };
            let magnets = {
                let (s, c) = (av.clone(), code.clone());
                joiner.launch(SectionId::Magnets, deadline, async move { s.magnets(&c).await })
            };
            let previews = {
                let (s, c, own) = (av.clone(), code.clone(), detail.preview_images.clone());
                joiner.launch(SectionId::Previews, deadline, async move {
                    Ok(choose_previews(s.previews(&c).await?, &own))
                })
            };
            (play, magnets, description, previews, Some(duration))
        } else {
            (
                Pending::replay(SectionId::PlayLinks, detail.play_urls.clone()),
                Pending::replay(
                    SectionId::Magnets,
                    MagnetLinks { hd: detail.magnet_hd.clone(), hd_sub: detail.magnet_sub.clone() },
                ),
                Pending::replay(SectionId::Description, detail.description.clone()),
                Pending::replay(SectionId::Previews, detail.preview_images.clone()),
                None,
            )
        };

        // The preview list decides which images to download, so it settles first.
        let preview_urls = joiner.settle(previews).await.unwrap_or_else(|_| detail.preview_images.clone());
        let preview_fetches: Vec<Pending<Bytes>> = select_batch_urls(&preview_urls, cap)
            .into_iter()
            .map(|u| self.launch_image(&joiner, SectionId::Previews, u, None, deadline))
            .collect();

        let cover = match cover {
            Some(p) => joiner.settle(p).await.ok(),
            None => None,
        };
        let preview_items: Vec<BatchItem> = joiner
            .settle_all(preview_fetches)
            .await
            .into_iter()
            .map(|s| match s {
                Settled::Ready(bytes) => BatchItem::Image(bytes),
                Settled::Fallback(_) => BatchItem::Missing(PREVIEW_FAILED.to_string()),
            })
            .collect();
        let play_urls = joiner.settle(play).await.unwrap_or_default();
        let magnet_tiers = joiner.settle(magnets).await.unwrap_or_default();
        let description = joiner.settle(description).await.unwrap_or_default();

        let sections = assemble_av(
            AvTemplate {
                detail: detail.clone(),
                cover,
                previews: preview_items,
                play_urls: play_urls.clone(),
                magnet_tiers: magnet_tiers.clone(),
                description: description.clone(),
            },
            cap,
        );
        if let Err(e) = sink.send_forward(sections).await {
            warn!(code = %code, error = %e, "forward message not delivered");
        }

        let report = joiner.into_report();
        info!(code = %code, fetched = report.fetched(), fallbacks = report.fallbacks(), "av reply sent");

        let persist = match (duration, guard) {
            (Some(duration), Some(guard)) => {
                let fields = LiveAvFields { play_urls, magnets: magnet_tiers, description, previews: preview_urls };
                Some(spawn_persist_av(self.storage.clone(), detail, fields, duration, guard))
            }
            _ => None,
        };
        Ok(LookupOutcome::Answered(Answered { key: code, source, report, persist }))
    }

    /// `/game <name>`: search, resolve store info, enrich, reply, cache live info.
    pub async fn game_lookup(&self, raw_name: &str, sink: &dyn MessageSink) -> Result<LookupOutcome> {
        let name = raw_name.trim();
        let receipt = sink.reply_status(SEARCHING).await?;
        let hit = match search_game(self.games.as_ref(), name).await {
            Ok(hit) => hit,
            Err(_) => {
                self.retract_status(sink, receipt).await;
                sink.send_text(GAME_NOT_FOUND).await?;
                return Ok(LookupOutcome::NotFound(name.to_string()));
            }
        };
        if hit.kind == GameKind::Console {
            self.retract_status(sink, receipt).await;
            info!(name = %hit.name, "console title; summary only");
            sink.send_forward(assemble_console(&hit)).await?;
            return Ok(LookupOutcome::Console(hit));
        }

        let deadline = self.cfg.game_fetch_timeout();
        let cap = self.cfg.batch_image_cap;
        let mut joiner = self.pool.joiner();
        // The search image is known before the store lookup; start it now.
        let image = hit
            .image
            .clone()
            .filter(|u| !u.trim().is_empty())
            .map(|u| self.launch_image(&joiner, SectionId::GameImage, u, self.cfg.game_image_scale(), deadline));

        let key = game_cache_key(hit.app_id);
        let guard = self.locks.lock(&key).await;
        let now = current_epoch();
        let resolved = resolve_game_info(self.storage.as_ref(), self.games.as_ref(), &hit, now).await;
        self.retract_status(sink, receipt).await;
        let resolved = match resolved {
            Ok(r) => r,
            Err(e) => {
                info!(app_id = hit.app_id, error = %e, "game info unavailable");
                sink.send_text(GAME_NOT_FOUND).await?;
                return Ok(LookupOutcome::NotFound(name.to_string()));
            }
        };
        let source = resolved.source();
        info!(app_id = hit.app_id, source = %source, "game info resolved");
        let (info, guard) = match resolved {
            Resolved::Cached(i) => {
                drop(guard);
                (i, None)
            }
            Resolved::Live(i) => (i, Some(guard)),
        };
        let scale = self.cfg.game_image_scale();

        let thumbs: Vec<String> = info.screenshots.iter().map(|s| s.thumbnail.clone()).collect();
        let shot_fetches: Vec<Pending<Bytes>> = select_batch_urls(&thumbs, cap)
            .into_iter()
            .map(|u| self.launch_image(&joiner, SectionId::Screenshots, u, scale, deadline))
            .collect();
        let dlc_fetches: Vec<Option<Pending<Bytes>>> = info
            .dlcs
            .iter()
            .filter(|d| !d.name.trim().is_empty())
            .map(|d| {
                d.image
                    .clone()
                    .filter(|u| !u.trim().is_empty())
                    .map(|u| self.launch_image(&joiner, SectionId::DlcImages, u, scale, deadline))
            })
            .collect();
        let introduction = {
            let (games, app_id) = (self.games.clone(), hit.app_id);
            joiner.launch(SectionId::Introduction, deadline, async move { games.introduction(app_id).await })
        };

        let image = match image {
            Some(p) => joiner.settle(p).await.ok(),
            None => None,
        };
        let screenshots: Vec<BatchItem> = joiner
            .settle_all(shot_fetches)
            .await
            .into_iter()
            .map(|s| match s {
                Settled::Ready(bytes) => BatchItem::Image(bytes),
                Settled::Fallback(_) => BatchItem::Missing(PREVIEW_FAILED.to_string()),
            })
            .collect();
        let mut dlc_images = Vec::with_capacity(dlc_fetches.len());
        for fetch in dlc_fetches {
            dlc_images.push(match fetch {
                Some(p) => joiner.settle(p).await.ok(),
                None => None,
            });
        }
        let introduction = joiner.settle(introduction).await.unwrap_or_default();

        let sections = assemble_game(
            GameTemplate { hit: hit.clone(), info: info.clone(), image, screenshots, dlc_images, introduction },
            cap,
        );
        if let Err(e) = sink.send_forward(sections).await {
            warn!(app_id = hit.app_id, error = %e, "forward message not delivered");
        }
        let report = joiner.into_report();
        info!(app_id = hit.app_id, fetched = report.fetched(), fallbacks = report.fallbacks(), "game reply sent");

        let persist = guard.map(|g| spawn_persist_game(self.storage.clone(), info, now, self.cfg.game_cache_ttl_secs, g));
        Ok(LookupOutcome::Answered(Answered { key, source, report, persist }))
    }
}

pub(crate) fn current_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
