//! In-memory collaborators for pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;

use crate::assemble::MessageSection;
use crate::sink::{MessageSink, Receipt};
use crate::sources::{AvScraper, GameSource, ImageFetcher};
use crate::storage::Storage;
use crate::types::{AvDetail, GameHit, GameInfo, GameKind, MagnetLinks};

#[derive(Default)]
pub struct MemoryStorage {
    broken: bool,
    avs: Mutex<HashMap<String, AvDetail>>,
    previews: Mutex<HashMap<String, Vec<String>>>,
    cache: Mutex<HashMap<String, (String, i64)>>,
    av_writes: AtomicUsize,
    cache_writes: AtomicUsize,
}

impl MemoryStorage {
    /// Every call fails.
    pub fn broken() -> Self { Self { broken: true, ..Default::default() } }

    /// Store a record the way a previous live lookup would have.
    pub fn seed_av(&self, detail: AvDetail) {
        self.previews.lock().unwrap().insert(detail.code.clone(), detail.preview_images.clone());
        self.avs.lock().unwrap().insert(detail.code.clone(), detail);
    }

    pub fn av_writes(&self) -> usize { self.av_writes.load(Ordering::SeqCst) }
    pub fn cache_writes(&self) -> usize { self.cache_writes.load(Ordering::SeqCst) }

    fn check(&self) -> Result<()> {
        if self.broken { Err(anyhow!("storage offline")) } else { Ok(()) }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_cache(&self, key: &str, now: i64) -> Result<Option<String>> {
        self.check()?;
        Ok(self
            .cache
            .lock()
            .unwrap()
            .get(key)
            .filter(|(_, exp)| *exp > now)
            .map(|(p, _)| p.clone()))
    }

    async fn put_cache(&self, key: &str, payload: &str, expires_at: i64) -> Result<()> {
        self.check()?;
        self.cache_writes.fetch_add(1, Ordering::SeqCst);
        self.cache.lock().unwrap().insert(key.to_string(), (payload.to_string(), expires_at));
        Ok(())
    }

    async fn get_av(&self, code: &str) -> Result<Option<AvDetail>> {
        self.check()?;
        let Some(mut d) = self.avs.lock().unwrap().get(code).cloned() else { return Ok(None); };
        d.preview_images = self.previews.lock().unwrap().get(code).cloned().unwrap_or_default();
        Ok(Some(d))
    }

    async fn put_av(&self, detail: &AvDetail) -> Result<()> {
        self.check()?;
        self.av_writes.fetch_add(1, Ordering::SeqCst);
        self.avs.lock().unwrap().insert(detail.code.clone(), detail.clone());
        Ok(())
    }

    async fn list_previews(&self, code: &str) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.previews.lock().unwrap().get(code).cloned().unwrap_or_default())
    }

    async fn put_previews(&self, code: &str, urls: &[String]) -> Result<()> {
        self.check()?;
        self.previews.lock().unwrap().insert(code.to_string(), urls.to_vec());
        Ok(())
    }
}

/// Scraper with canned answers, optional per-call delays, and call counters.
#[derive(Default)]
pub struct FakeAvScraper {
    pub detail: Option<AvDetail>,
    pub fail: bool,
    pub play: Vec<String>,
    pub magnets: MagnetLinks,
    pub description: Option<String>,
    pub duration: Option<String>,
    pub previews: Vec<String>,
    /// Keyed by method name.
    pub delays: HashMap<&'static str, Duration>,
    pub calls: Mutex<HashMap<&'static str, usize>>,
}

impl FakeAvScraper {
    pub fn with_detail(detail: AvDetail) -> Self { Self { detail: Some(detail), ..Default::default() } }

    pub fn failing() -> Self { Self { fail: true, ..Default::default() } }

    pub fn delay(mut self, method: &'static str, d: Duration) -> Self {
        self.delays.insert(method, d);
        self
    }

    pub fn calls(&self, method: &str) -> usize { self.calls.lock().unwrap().get(method).copied().unwrap_or(0) }

    pub fn total_calls(&self) -> usize { self.calls.lock().unwrap().values().sum() }

    async fn enter(&self, method: &'static str) -> Result<()> {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;
        if let Some(d) = self.delays.get(method) {
            tokio::time::sleep(*d).await;
        }
        if self.fail { Err(anyhow!("{method} unavailable")) } else { Ok(()) }
    }
}

#[async_trait]
impl AvScraper for FakeAvScraper {
    async fn detail(&self, _code: &str) -> Result<Option<AvDetail>> {
        self.enter("detail").await?;
        Ok(self.detail.clone())
    }
    async fn play_urls(&self, _code: &str) -> Result<Vec<String>> {
        self.enter("play_urls").await?;
        Ok(self.play.clone())
    }
    async fn magnets(&self, _code: &str) -> Result<MagnetLinks> {
        self.enter("magnets").await?;
        Ok(self.magnets.clone())
    }
    async fn description(&self, _code: &str) -> Result<Option<String>> {
        self.enter("description").await?;
        Ok(self.description.clone())
    }
    async fn duration(&self, _code: &str) -> Result<Option<String>> {
        self.enter("duration").await?;
        Ok(self.duration.clone())
    }
    async fn previews(&self, _code: &str) -> Result<Vec<String>> {
        self.enter("previews").await?;
        Ok(self.previews.clone())
    }
}

#[derive(Default)]
pub struct FakeGameSource {
    pub hit: Option<GameHit>,
    pub info: Option<GameInfo>,
    pub introduction: Option<String>,
    search_calls: AtomicUsize,
    info_calls: AtomicUsize,
    intro_calls: AtomicUsize,
}

impl FakeGameSource {
    pub fn pc(app_id: u32, name: &str) -> Self {
        Self {
            hit: Some(GameHit {
                app_id,
                name: name.to_string(),
                image: Some(format!("https://img/{app_id}/capsule.jpg")),
                score: Some("90".into()),
                ..Default::default()
            }),
            info: Some(GameInfo { app_id, name: name.to_string(), ..Default::default() }),
            introduction: Some(format!("{name} intro")),
            ..Default::default()
        }
    }

    pub fn console(name: &str) -> Self {
        Self {
            hit: Some(GameHit {
                app_id: 0,
                name: name.to_string(),
                kind: GameKind::Console,
                platforms: vec!["Switch".into()],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn empty() -> Self { Self::default() }

    pub fn search_calls(&self) -> usize { self.search_calls.load(Ordering::SeqCst) }
    pub fn info_calls(&self) -> usize { self.info_calls.load(Ordering::SeqCst) }
    pub fn intro_calls(&self) -> usize { self.intro_calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl GameSource for FakeGameSource {
    async fn search(&self, _name: &str) -> Result<Option<GameHit>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hit.clone())
    }
    async fn info(&self, _app_id: u32) -> Result<Option<GameInfo>> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.info.clone())
    }
    async fn introduction(&self, _app_id: u32) -> Result<Option<String>> {
        self.intro_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.introduction.clone())
    }
}

/// Serves a few bytes per URL; listed URLs fail, delayed URLs stall.
#[derive(Default)]
pub struct FakeImages {
    pub failing: HashSet<String>,
    pub delays: HashMap<String, Duration>,
    fetched: Mutex<Vec<(String, Option<f32>)>>,
}

impl FakeImages {
    pub fn failing_on(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn stall_on(mut self, url: &str, d: Duration) -> Self {
        self.delays.insert(url.to_string(), d);
        self
    }

    pub fn fetched(&self) -> Vec<(String, Option<f32>)> { self.fetched.lock().unwrap().clone() }
}

#[async_trait]
impl ImageFetcher for FakeImages {
    async fn fetch(&self, url: &str, scale: Option<f32>) -> Result<Bytes> {
        self.fetched.lock().unwrap().push((url.to_string(), scale));
        if let Some(d) = self.delays.get(url) {
            tokio::time::sleep(*d).await;
        }
        if url.trim().is_empty() || self.failing.contains(url) {
            return Err(anyhow!("404 for {url:?}"));
        }
        Ok(Bytes::from(url.as_bytes().to_vec()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Status(String),
    Retract(Duration),
    Text(String),
    Forward(Vec<MessageSection>),
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> { self.events.lock().unwrap().clone() }

    pub fn forwards(&self) -> Vec<Vec<MessageSection>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Forward(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Text(t) => Some(t),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn reply_status(&self, text: &str) -> Result<Receipt> {
        self.events.lock().unwrap().push(SinkEvent::Status(text.to_string()));
        Ok(Receipt("status".into()))
    }
    async fn retract(&self, _receipt: Receipt, after: Duration) -> Result<()> {
        self.events.lock().unwrap().push(SinkEvent::Retract(after));
        Ok(())
    }
    async fn send_text(&self, text: &str) -> Result<()> {
        self.events.lock().unwrap().push(SinkEvent::Text(text.to_string()));
        Ok(())
    }
    async fn send_forward(&self, sections: Vec<MessageSection>) -> Result<()> {
        self.events.lock().unwrap().push(SinkEvent::Forward(sections));
        Ok(())
    }
}
