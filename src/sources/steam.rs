//! Game lookups against the public Steam store and Web API.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::GameSource;
use crate::types::{GameDlc, GameHit, GameInfo, GameKind, GamePrice, OnlineStat, Screenshot};

/// DLC detail lookups per game.
const MAX_DLC: usize = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(rename = "type", default)]
    kind: String,
    id: u32,
    name: String,
    #[serde(default)]
    tiny_image: Option<String>,
    #[serde(default)]
    metascore: Option<String>,
    #[serde(default)]
    platforms: Option<Platforms>,
}

#[derive(Debug, Default, Deserialize)]
struct Platforms {
    #[serde(default)]
    windows: bool,
    #[serde(default)]
    mac: bool,
    #[serde(default)]
    linux: bool,
}

impl Platforms {
    fn names(&self) -> Vec<String> {
        [("windows", self.windows), ("mac", self.mac), ("linux", self.linux)]
            .into_iter()
            .filter(|(_, on)| *on)
            .map(|(n, _)| n.to_string())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct AppDetailsEnvelope {
    success: bool,
    #[serde(default)]
    data: Option<AppData>,
}

#[derive(Debug, Default, Deserialize)]
struct AppData {
    #[serde(default)]
    name: String,
    #[serde(default)]
    is_free: bool,
    #[serde(default)]
    short_description: Option<String>,
    #[serde(default)]
    supported_languages: Option<String>,
    #[serde(default)]
    header_image: Option<String>,
    #[serde(default)]
    price_overview: Option<PriceOverview>,
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    dlc: Vec<u32>,
    #[serde(default)]
    screenshots: Vec<AppScreenshot>,
}

#[derive(Debug, Deserialize)]
struct PriceOverview {
    #[serde(default)]
    discount_percent: u32,
    #[serde(default)]
    final_formatted: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Genre {
    description: String,
}

#[derive(Debug, Deserialize)]
struct AppScreenshot {
    path_thumbnail: String,
    #[serde(default)]
    path_full: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReviewsResponse {
    #[serde(default)]
    query_summary: Option<QuerySummary>,
}

#[derive(Debug, Deserialize)]
struct QuerySummary {
    #[serde(default)]
    review_score_desc: Option<String>,
    #[serde(default)]
    total_positive: u64,
    #[serde(default)]
    total_reviews: u64,
}

#[derive(Debug, Deserialize)]
struct PlayersResponse {
    response: PlayerCount,
}

#[derive(Debug, Deserialize)]
struct PlayerCount {
    #[serde(default)]
    player_count: Option<u64>,
}

pub struct SteamGameSource {
    client: reqwest::Client,
    store: Url,
    api: Url,
    country: String,
    language: String,
}

impl SteamGameSource {
    pub fn new(client: reqwest::Client, store_url: &str, api_url: &str, country: &str, language: &str) -> Result<Self> {
        let store = Url::parse(store_url).with_context(|| format!("invalid steam store URL: {store_url}"))?;
        let api = Url::parse(api_url).with_context(|| format!("invalid steam api URL: {api_url}"))?;
        Ok(Self { client, store, api, country: country.to_string(), language: language.to_string() })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;
        resp.json::<T>().await.with_context(|| format!("decoding {url}"))
    }

    async fn app_details(&self, app_id: u32, language: &str) -> Result<Option<AppData>> {
        let mut url = self.store.join("api/appdetails")?;
        url.query_pairs_mut()
            .append_pair("appids", &app_id.to_string())
            .append_pair("cc", &self.country)
            .append_pair("l", language);
        let mut body: HashMap<String, AppDetailsEnvelope> = self.get_json(url).await?;
        Ok(body
            .remove(&app_id.to_string())
            .filter(|e| e.success)
            .and_then(|e| e.data))
    }

    async fn reviews(&self, app_id: u32) -> Result<Option<QuerySummary>> {
        let mut url = self.store.join(&format!("appreviews/{app_id}"))?;
        url.query_pairs_mut()
            .append_pair("json", "1")
            .append_pair("language", "all")
            .append_pair("purchase_type", "all")
            .append_pair("num_per_page", "0");
        let body: ReviewsResponse = self.get_json(url).await?;
        Ok(body.query_summary)
    }

    async fn current_players(&self, app_id: u32) -> Result<Option<u64>> {
        let mut url = self.api.join("ISteamUserStats/GetNumberOfCurrentPlayers/v1/")?;
        url.query_pairs_mut().append_pair("appid", &app_id.to_string());
        let body: PlayersResponse = self.get_json(url).await?;
        Ok(body.response.player_count)
    }

    async fn english_name(&self, app_id: u32) -> Result<Option<String>> {
        Ok(self.app_details(app_id, "english").await?.map(|d| d.name))
    }

    async fn dlc(&self, app_id: u32) -> Option<GameDlc> {
        match self.app_details(app_id, &self.language).await {
            Ok(Some(d)) => Some(GameDlc { price: price_of(&d), image: d.header_image, name: d.name }),
            Ok(None) => None,
            Err(e) => {
                debug!(app_id, error = %e, "dlc lookup failed");
                None
            }
        }
    }
}

fn price_of(d: &AppData) -> Option<GamePrice> {
    if d.is_free {
        return None;
    }
    let overview = d.price_overview.as_ref();
    Some(GamePrice {
        current: overview.and_then(|p| p.final_formatted.clone()),
        discount: overview.map(|p| p.discount_percent).unwrap_or(0),
        ..Default::default()
    })
}

fn supports_chinese(languages: Option<&str>) -> bool {
    let Some(l) = languages else { return false; };
    ["简体中文", "繁體中文", "Simplified Chinese", "Traditional Chinese"]
        .iter()
        .any(|needle| l.contains(needle))
}

fn positive_desc(q: &QuerySummary) -> Option<String> {
    if q.total_reviews == 0 {
        return None;
    }
    let pct = q.total_positive * 100 / q.total_reviews;
    Some(format!("好评率：{pct}%（{} 篇评测）", q.total_reviews))
}

/// Chat lines are not wrapped; keep html2text from breaking them.
const BLURB_WIDTH: usize = 1000;

/// Store blurbs are HTML; render them as plain text.
fn strip_html(raw: &str) -> String {
    html2text::from_read(raw.as_bytes(), BLURB_WIDTH)
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[async_trait]
impl GameSource for SteamGameSource {
    async fn search(&self, name: &str) -> Result<Option<GameHit>> {
        let mut url = self.store.join("api/storesearch/")?;
        url.query_pairs_mut()
            .append_pair("term", name)
            .append_pair("l", &self.language)
            .append_pair("cc", &self.country);
        let body: SearchResponse = self.get_json(url).await?;
        let Some(item) = body.items.into_iter().find(|i| i.kind.is_empty() || i.kind == "app") else {
            return Ok(None);
        };
        Ok(Some(GameHit {
            app_id: item.id,
            name: item.name,
            image: item.tiny_image,
            score: item.metascore.filter(|s| !s.trim().is_empty()),
            score_desc: None,
            kind: GameKind::Pc,
            platforms: item.platforms.unwrap_or_default().names(),
        }))
    }

    async fn info(&self, app_id: u32) -> Result<Option<GameInfo>> {
        let Some(data) = self.app_details(app_id, &self.language).await? else {
            return Ok(None);
        };

        let dlc_ids: Vec<u32> = data.dlc.iter().copied().take(MAX_DLC).collect();
        let (reviews, players, name_en, dlcs) = tokio::join!(
            self.reviews(app_id),
            self.current_players(app_id),
            self.english_name(app_id),
            join_all(dlc_ids.into_iter().map(|id| self.dlc(id))),
        );
        let reviews = reviews.unwrap_or_else(|e| {
            warn!(app_id, error = %e, "review summary unavailable");
            None
        });
        let players = players.unwrap_or_else(|e| {
            warn!(app_id, error = %e, "player count unavailable");
            None
        });
        let name_en = name_en
            .unwrap_or_else(|e| {
                debug!(app_id, error = %e, "english name unavailable");
                None
            })
            .filter(|en| *en != data.name);

        Ok(Some(GameInfo {
            app_id,
            price: price_of(&data),
            name: data.name,
            name_en,
            genres: data.genres.into_iter().map(|g| g.description).collect(),
            positive_desc: reviews.as_ref().and_then(positive_desc),
            review_summary: reviews.and_then(|r| r.review_score_desc),
            supports_chinese: supports_chinese(data.supported_languages.as_deref()),
            dlcs: dlcs.into_iter().flatten().collect(),
            online: players
                .map(|n| vec![OnlineStat { desc: "当前在线".to_string(), value: n.to_string(), rank: None }])
                .unwrap_or_default(),
            screenshots: data
                .screenshots
                .into_iter()
                .map(|s| Screenshot { thumbnail: s.path_thumbnail, full: s.path_full })
                .collect(),
            header_image: data.header_image,
        }))
    }

    async fn introduction(&self, app_id: u32) -> Result<Option<String>> {
        let data = self.app_details(app_id, &self.language).await?;
        Ok(data
            .and_then(|d| d.short_description)
            .map(|s| strip_html(&s))
            .filter(|s| !s.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer) -> SteamGameSource {
        let base = format!("{}/", server.uri());
        SteamGameSource::new(reqwest::Client::new(), &base, &base, "cn", "schinese").unwrap()
    }

    #[test]
    fn blurbs_keep_line_breaks_and_decode_entities() {
        let text = strip_html("Line one<br>Line two &#x27;quoted&#x27; &amp; &hellip; end ");
        assert_eq!(text.lines().collect::<Vec<_>>(), vec!["Line one", "Line two 'quoted' & … end"]);
    }

    #[test]
    fn chinese_support_detection() {
        assert!(supports_chinese(Some("英语<strong>*</strong>, 简体中文")));
        assert!(!supports_chinese(Some("English, French")));
        assert!(!supports_chinese(None));
    }

    #[tokio::test]
    async fn search_takes_first_app() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/storesearch/"))
            .and(query_param("term", "dota"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total": 2,
                "items": [
                    { "type": "app", "id": 570, "name": "Dota 2", "tiny_image": "https://img/570.jpg",
                      "metascore": "90", "platforms": { "windows": true, "mac": false, "linux": true } },
                    { "type": "app", "id": 1, "name": "Other" }
                ]
            })))
            .mount(&server)
            .await;
        let hit = source(&server).search("dota").await.unwrap().unwrap();
        assert_eq!(hit.app_id, 570);
        assert_eq!(hit.score.as_deref(), Some("90"));
        assert_eq!(hit.platforms, vec!["windows".to_string(), "linux".to_string()]);
    }

    #[tokio::test]
    async fn empty_search_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/storesearch/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "total": 0, "items": [] })))
            .mount(&server)
            .await;
        assert!(source(&server).search("zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn info_combines_details_reviews_and_players() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/appdetails"))
            .and(query_param("appids", "10"))
            .and(query_param("l", "schinese"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "10": { "success": true, "data": {
                    "name": "反恐精英", "is_free": false,
                    "supported_languages": "英语, 简体中文",
                    "header_image": "https://img/10/header.jpg",
                    "price_overview": { "discount_percent": 50, "final_formatted": "¥ 19.00" },
                    "genres": [ { "id": "1", "description": "动作" } ],
                    "dlc": [ 11 ],
                    "screenshots": [ { "id": 0, "path_thumbnail": "t0", "path_full": "f0" } ]
                } }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/appdetails"))
            .and(query_param("appids", "10"))
            .and(query_param("l", "english"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "10": { "success": true, "data": { "name": "Counter-Strike" } }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/appdetails"))
            .and(query_param("appids", "11"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "11": { "success": true, "data": { "name": "Soundtrack", "is_free": true } }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/appreviews/10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": 1,
                "query_summary": { "review_score_desc": "特别好评", "total_positive": 90, "total_reviews": 100 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ISteamUserStats/GetNumberOfCurrentPlayers/v1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": { "player_count": 1234, "result": 1 }
            })))
            .mount(&server)
            .await;

        let info = source(&server).info(10).await.unwrap().unwrap();
        assert_eq!(info.name, "反恐精英");
        assert_eq!(info.name_en.as_deref(), Some("Counter-Strike"));
        assert_eq!(info.genres, vec!["动作".to_string()]);
        assert!(info.supports_chinese);
        let price = info.price.unwrap();
        assert_eq!(price.current.as_deref(), Some("¥ 19.00"));
        assert_eq!(price.discount, 50);
        assert_eq!(price.is_lowest, None);
        assert_eq!(info.review_summary.as_deref(), Some("特别好评"));
        assert!(info.positive_desc.unwrap().contains("90%"));
        assert_eq!(info.online[0].value, "1234");
        assert_eq!(info.dlcs.len(), 1);
        assert!(info.dlcs[0].price.is_none());
        assert_eq!(info.screenshots[0].full.as_deref(), Some("f0"));
    }

    #[tokio::test]
    async fn info_survives_missing_side_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/appdetails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "20": { "success": true, "data": { "name": "Solo", "is_free": true } }
            })))
            .mount(&server)
            .await;
        // Reviews and player counts are unmocked and come back 404.
        let info = source(&server).info(20).await.unwrap().unwrap();
        assert_eq!(info.name, "Solo");
        assert!(info.name_en.is_none());
        assert!(info.price.is_none());
        assert!(info.online.is_empty());
        assert!(info.review_summary.is_none());
    }

    #[tokio::test]
    async fn unknown_app_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/appdetails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "99": { "success": false }
            })))
            .mount(&server)
            .await;
        assert!(source(&server).info(99).await.unwrap().is_none());
        assert!(source(&server).introduction(99).await.unwrap().is_none());
    }
}
