//! Best-effort write-back of live-scraped entities, run after the reply is sent.

use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::joiner::Pending;
use crate::mapping::game_cache_key;
use crate::storage::Storage;
use crate::types::{AvDetail, GameInfo, MagnetLinks};

/// Enrichment values gathered for a live AV record.
#[derive(Debug, Clone, Default)]
pub struct LiveAvFields {
    pub play_urls: Vec<String>,
    pub magnets: MagnetLinks,
    pub description: Option<String>,
    pub previews: Vec<String>,
}

/// The enrichment preview list wins when it has more than one entry or is at
/// least as long as the detail's own list.
pub fn choose_previews(live: Vec<String>, detail: &[String]) -> Vec<String> {
    if live.len() > 1 || live.len() >= detail.len() {
        live
    } else {
        detail.to_vec()
    }
}

/// Fold live values into the scraped record. A value only replaces what the
/// record has when it carries more information.
pub fn merge_live_av(mut detail: AvDetail, live: LiveAvFields, duration: Option<String>) -> AvDetail {
    if !live.magnets.hd.is_empty() {
        detail.magnet_hd = live.magnets.hd;
    }
    if !live.magnets.hd_sub.is_empty() {
        detail.magnet_sub = live.magnets.hd_sub;
    }
    if let Some(desc) = live.description.filter(|d| !d.trim().is_empty()) {
        detail.description = Some(desc);
    }
    if !live.play_urls.is_empty() {
        detail.play_urls = live.play_urls;
    }
    if let Some(d) = duration.filter(|d| !d.trim().is_empty()) {
        detail.duration = Some(d);
    }
    if !live.previews.is_empty() {
        detail.preview_images = live.previews;
    }
    detail
}

pub async fn persist_av(storage: &dyn Storage, detail: &AvDetail) -> Result<(), PipelineError> {
    let failure = |e: anyhow::Error| PipelineError::PersistenceFailure {
        key: detail.code.clone(),
        reason: format!("{e:#}"),
    };
    storage.put_av(detail).await.map_err(failure)?;
    storage.put_previews(&detail.code, &detail.preview_images).await.map_err(failure)?;
    Ok(())
}

/// Wait for the duration fetch, merge, and write. The key guard is released
/// once the write has finished.
pub fn spawn_persist_av(
    storage: Arc<dyn Storage>,
    detail: AvDetail,
    live: LiveAvFields,
    duration: Pending<Option<String>>,
    guard: OwnedMutexGuard<()>,
) -> JoinHandle<Result<(), PipelineError>> {
    tokio::spawn(async move {
        let _guard = guard;
        let (state, duration) = duration.settle_detached().await;
        debug!(code = %detail.code, state = ?state, "duration slot settled for persistence");
        let duration = duration.unwrap_or_default();
        let merged = merge_live_av(detail, live, duration);
        let res = persist_av(storage.as_ref(), &merged).await;
        match &res {
            Ok(()) => info!(code = %merged.code, previews = merged.preview_images.len(), "av record persisted"),
            Err(e) => warn!(error = %e, "av record not persisted"),
        }
        res
    })
}

pub async fn persist_game(storage: &dyn Storage, info: &GameInfo, now: i64, ttl_secs: i64) -> Result<(), PipelineError> {
    let key = game_cache_key(info.app_id);
    let payload = serde_json::to_string(info).map_err(|e| PipelineError::PersistenceFailure {
        key: key.clone(),
        reason: e.to_string(),
    })?;
    storage
        .put_cache(&key, &payload, now + ttl_secs)
        .await
        .map_err(|e| PipelineError::PersistenceFailure { key, reason: format!("{e:#}") })
}

pub fn spawn_persist_game(
    storage: Arc<dyn Storage>,
    info: GameInfo,
    now: i64,
    ttl_secs: i64,
    guard: OwnedMutexGuard<()>,
) -> JoinHandle<Result<(), PipelineError>> {
    tokio::spawn(async move {
        let _guard = guard;
        let res = persist_game(storage.as_ref(), &info, now, ttl_secs).await;
        match &res {
            Ok(()) => info!(app_id = info.app_id, "game info cached"),
            Err(e) => warn!(error = %e, "game info not cached"),
        }
        res
    })
}
