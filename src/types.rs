use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a resolved entity came from. Downstream branching (replay vs. fetch,
/// persist vs. skip) matches on this instead of a boolean flag.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<E> {
    Cached(E),
    Live(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveSource {
    Cache,
    Live,
}

impl fmt::Display for ResolveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveSource::Cache => f.write_str("cache"),
            ResolveSource::Live => f.write_str("live"),
        }
    }
}

impl<E> Resolved<E> {
    pub fn entity(&self) -> &E {
        match self {
            Resolved::Cached(e) | Resolved::Live(e) => e,
        }
    }

    pub fn into_entity(self) -> E {
        match self {
            Resolved::Cached(e) | Resolved::Live(e) => e,
        }
    }

    pub fn source(&self) -> ResolveSource {
        match self {
            Resolved::Cached(_) => ResolveSource::Cache,
            Resolved::Live(_) => ResolveSource::Live,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Resolved::Live(_))
    }
}

/// Identifies one enrichment fetch, and the reply section it feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SectionId {
    Cover,
    Previews,
    PlayLinks,
    Magnets,
    Description,
    Duration,
    GameImage,
    Screenshots,
    DlcImages,
    Introduction,
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SectionId::Cover => "cover",
            SectionId::Previews => "previews",
            SectionId::PlayLinks => "play_links",
            SectionId::Magnets => "magnets",
            SectionId::Description => "description",
            SectionId::Duration => "duration",
            SectionId::GameImage => "game_image",
            SectionId::Screenshots => "screenshots",
            SectionId::DlcImages => "dlc_images",
            SectionId::Introduction => "introduction",
        };
        f.write_str(s)
    }
}

// --- AV domain ---

/// A video record. Every collection may be partially populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvDetail {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub actors: Vec<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub preview_images: Vec<String>,
    #[serde(default)]
    pub play_urls: Vec<String>,
    /// Untiered magnets from the detail scrape.
    #[serde(default)]
    pub magnet_links: Vec<String>,
    #[serde(default)]
    pub magnet_hd: Vec<String>,
    #[serde(default)]
    pub magnet_sub: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
}

/// Magnet links grouped by quality tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MagnetLinks {
    #[serde(rename = "HD", default)]
    pub hd: Vec<String>,
    #[serde(rename = "HD[SUB]", default)]
    pub hd_sub: Vec<String>,
}

impl MagnetLinks {
    pub fn is_empty(&self) -> bool {
        self.hd.is_empty() && self.hd_sub.is_empty()
    }
}

// --- Game domain ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    #[default]
    Pc,
    Console,
}

/// Top result of a game name search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameHit {
    pub app_id: u32,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub score: Option<String>,
    #[serde(default)]
    pub score_desc: Option<String>,
    #[serde(default)]
    pub kind: GameKind,
    #[serde(default)]
    pub platforms: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GamePrice {
    pub current: Option<String>,
    #[serde(default)]
    pub discount: u32,
    #[serde(default)]
    pub is_lowest: Option<bool>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub lowest_price: Option<String>,
    #[serde(default)]
    pub lowest_discount: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameDlc {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub price: Option<GamePrice>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnlineStat {
    pub desc: String,
    pub value: String,
    #[serde(default)]
    pub rank: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Screenshot {
    pub thumbnail: String,
    #[serde(default)]
    pub full: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameInfo {
    pub app_id: u32,
    pub name: String,
    #[serde(default)]
    pub name_en: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub positive_desc: Option<String>,
    #[serde(default)]
    pub review_summary: Option<String>,
    #[serde(default)]
    pub supports_chinese: bool,
    /// `None` for free games.
    #[serde(default)]
    pub price: Option<GamePrice>,
    #[serde(default)]
    pub dlcs: Vec<GameDlc>,
    #[serde(default)]
    pub online: Vec<OnlineStat>,
    #[serde(default)]
    pub screenshots: Vec<Screenshot>,
    #[serde(default)]
    pub header_image: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_exposes_source_and_entity() {
        let live = Resolved::Live(7);
        let cached = Resolved::Cached(7);
        assert!(live.is_live());
        assert!(!cached.is_live());
        assert_eq!(cached.source(), ResolveSource::Cache);
        assert_eq!(*live.entity(), 7);
        assert_eq!(cached.into_entity(), 7);
    }

    #[test]
    fn magnet_tiers_use_site_keys() {
        let json = r#"{"HD":["magnet:?xt=a"],"HD[SUB]":["magnet:?xt=b"]}"#;
        let m: MagnetLinks = serde_json::from_str(json).unwrap();
        assert_eq!(m.hd, vec!["magnet:?xt=a"]);
        assert_eq!(m.hd_sub, vec!["magnet:?xt=b"]);
        let empty: MagnetLinks = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn av_detail_tolerates_sparse_payloads() {
        let d: AvDetail = serde_json::from_str(r#"{"code":"ABC-123","title":"t"}"#).unwrap();
        assert_eq!(d.code, "ABC-123");
        assert!(d.preview_images.is_empty());
        assert!(d.cover_url.is_none());
    }
}
