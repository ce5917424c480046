//! Client for the scraper sidecar that fronts the video sites.
//!
//! Every field has its own endpoint under `av/<code>/`: `detail`, `play`,
//! `magnet`, `description`, `duration` and `previews`. A 404 means the site had
//! nothing for that code and maps to an empty value, not an error.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::AvScraper;
use crate::types::{AvDetail, MagnetLinks};

#[derive(Debug, Default, Deserialize)]
struct UrlList {
    #[serde(default)]
    urls: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TextValue {
    #[serde(default)]
    text: Option<String>,
}

pub struct GatewayAvScraper {
    client: reqwest::Client,
    base: Url,
}

impl GatewayAvScraper {
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("invalid gateway URL: {base_url}"))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("gateway URL cannot be a base: {base_url}"));
        }
        Ok(Self { client, base })
    }

    fn endpoint(&self, code: &str, field: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("gateway URL cannot be a base"))?
            .pop_if_empty()
            .extend(["av", code, field]);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, code: &str, field: &str) -> Result<Option<T>> {
        let url = self.endpoint(code, field)?;
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status().with_context(|| format!("GET {url}"))?;
        let body = resp.json::<T>().await.with_context(|| format!("decoding {field} for {code}"))?;
        Ok(Some(body))
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

#[async_trait]
impl AvScraper for GatewayAvScraper {
    async fn detail(&self, code: &str) -> Result<Option<AvDetail>> {
        let detail = self.get_json::<AvDetail>(code, "detail").await?;
        Ok(detail.filter(|d| !d.code.trim().is_empty()))
    }

    async fn play_urls(&self, code: &str) -> Result<Vec<String>> {
        Ok(self.get_json::<UrlList>(code, "play").await?.unwrap_or_default().urls)
    }

    async fn magnets(&self, code: &str) -> Result<MagnetLinks> {
        Ok(self.get_json::<MagnetLinks>(code, "magnet").await?.unwrap_or_default())
    }

    async fn description(&self, code: &str) -> Result<Option<String>> {
        Ok(non_blank(self.get_json::<TextValue>(code, "description").await?.and_then(|t| t.text)))
    }

    async fn duration(&self, code: &str) -> Result<Option<String>> {
        Ok(non_blank(self.get_json::<TextValue>(code, "duration").await?.and_then(|t| t.text)))
    }

    async fn previews(&self, code: &str) -> Result<Vec<String>> {
        Ok(self.get_json::<UrlList>(code, "previews").await?.unwrap_or_default().urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn scraper(server: &MockServer) -> GatewayAvScraper {
        GatewayAvScraper::new(reqwest::Client::new(), &server.uri()).unwrap()
    }

    #[test]
    fn endpoint_escapes_code() {
        let s = GatewayAvScraper::new(reqwest::Client::new(), "http://gw.local/api/").unwrap();
        let url = s.endpoint("A B/1", "detail").unwrap();
        assert_eq!(url.as_str(), "http://gw.local/api/av/A%20B%2F1/detail");
    }

    #[tokio::test]
    async fn detail_and_tiers_decode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/av/ABC-123/detail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "ABC-123",
                "title": "title",
                "previewImages": [],
                "preview_images": ["p1", "p2"]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/av/ABC-123/magnet"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "HD": ["magnet:?xt=hd"],
                "HD[SUB]": []
            })))
            .mount(&server)
            .await;

        let s = scraper(&server).await;
        let detail = s.detail("ABC-123").await.unwrap().unwrap();
        assert_eq!(detail.preview_images, vec!["p1".to_string(), "p2".to_string()]);
        let m = s.magnets("ABC-123").await.unwrap();
        assert_eq!(m.hd, vec!["magnet:?xt=hd".to_string()]);
        assert!(m.hd_sub.is_empty());
    }

    #[tokio::test]
    async fn not_found_is_empty_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let s = scraper(&server).await;
        assert!(s.detail("NOPE-1").await.unwrap().is_none());
        assert!(s.play_urls("NOPE-1").await.unwrap().is_empty());
        assert!(s.description("NOPE-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn server_errors_propagate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/av/ABC-123/play"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let s = scraper(&server).await;
        assert!(s.play_urls("ABC-123").await.is_err());
    }

    #[tokio::test]
    async fn blank_description_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/av/ABC-123/description"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": "  " })))
            .mount(&server)
            .await;
        let s = scraper(&server).await;
        assert!(s.description("ABC-123").await.unwrap().is_none());
    }
}
