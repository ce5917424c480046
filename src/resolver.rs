//! User key → entity, from storage first and a live source on a miss.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::mapping::game_cache_key;
use crate::sources::{AvScraper, GameSource};
use crate::storage::Storage;
use crate::types::{AvDetail, GameHit, GameInfo, GameKind, Resolved};

/// Upper-case the code and put a `-` at the first letter→digit boundary:
/// `abc123` → `ABC-123`, `ABC-123` stays as is.
pub fn normalize_av_code(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    let mut out = String::with_capacity(upper.len() + 1);
    let mut prev_alpha = false;
    let mut inserted = false;
    for c in upper.chars() {
        if !inserted && prev_alpha && c.is_ascii_digit() {
            out.push('-');
            inserted = true;
        }
        prev_alpha = c.is_ascii_alphabetic();
        out.push(c);
    }
    out
}

pub fn av_lock_key(code: &str) -> String { format!("av|{code}") }

/// In-process async lock per entity key. A request takes the guard before
/// resolution; a cached result releases it at once, a live one hands it to
/// the persistence task.
#[derive(Default)]
pub struct KeyLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self { Self::default() }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            // Entries only the map still references are idle.
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

pub async fn resolve_av(
    storage: &dyn Storage,
    scraper: &dyn AvScraper,
    code: &str,
) -> Result<Resolved<AvDetail>, PipelineError> {
    match storage.get_av(code).await {
        Ok(Some(detail)) => {
            debug!(code, "av record served from storage");
            return Ok(Resolved::Cached(detail));
        }
        Ok(None) => {}
        Err(e) => warn!(code, error = %e, "storage lookup failed; falling back to live scrape"),
    }
    match scraper.detail(code).await {
        Ok(Some(detail)) => {
            info!(code, "av record scraped live");
            Ok(Resolved::Live(detail))
        }
        Ok(None) => Err(PipelineError::NotFound(code.to_string())),
        Err(e) => {
            warn!(code, error = %e, "live detail scrape failed");
            Err(PipelineError::NotFound(code.to_string()))
        }
    }
}

pub async fn search_game(source: &dyn GameSource, name: &str) -> Result<GameHit, PipelineError> {
    match source.search(name).await {
        Ok(Some(hit)) => {
            debug!(name, app_id = hit.app_id, kind = ?hit.kind, "game search hit");
            Ok(hit)
        }
        Ok(None) => Err(PipelineError::NotFound(name.to_string())),
        Err(e) => {
            warn!(name, error = %e, "game search failed");
            Err(PipelineError::NotFound(name.to_string()))
        }
    }
}

/// Console hits carry everything their reply needs and are never resolved
/// further; callers check [`GameKind`] first.
pub async fn resolve_game_info(
    storage: &dyn Storage,
    source: &dyn GameSource,
    hit: &GameHit,
    now: i64,
) -> Result<Resolved<GameInfo>, PipelineError> {
    debug_assert_eq!(hit.kind, GameKind::Pc);
    let key = game_cache_key(hit.app_id);
    match storage.get_cache(&key, now).await {
        Ok(Some(payload)) => match serde_json::from_str::<GameInfo>(&payload) {
            Ok(info) => {
                debug!(app_id = hit.app_id, "game info served from cache");
                return Ok(Resolved::Cached(info));
            }
            Err(e) => warn!(key, error = %e, "cached game info unreadable; refetching"),
        },
        Ok(None) => {}
        Err(e) => warn!(key, error = %e, "cache lookup failed; falling back to live fetch"),
    }
    match source.info(hit.app_id).await {
        Ok(Some(info)) => Ok(Resolved::Live(info)),
        Ok(None) => Err(PipelineError::NotFound(hit.name.clone())),
        Err(e) => {
            warn!(app_id = hit.app_id, error = %e, "live game info failed");
            Err(PipelineError::NotFound(hit.name.clone()))
        }
    }
}
