//! Turns joined enrichment results into the ordered sections of a forward
//! message. Everything here is pure: the aggregator settles the fetches and
//! hands the values over in a template struct.
//!
//! Section order is fixed per template: summary, primary image (or its text
//! fallback), capped image batch, link/info sections, trailing free text.
//! List-valued sections that end up empty are left out.

use bytes::Bytes;

use crate::types::{AvDetail, GameHit, GameInfo, GamePrice, MagnetLinks, OnlineStat};

pub const PLACEHOLDER: &str = "没有找到相关信息";
pub const SEARCHING: &str = "正在检索中，请稍候";
pub const GAME_NOT_FOUND: &str = "未找到相关游戏";
pub const PREVIEW_FAILED: &str = "下载预览图失败";
pub const COVER_FAILED: &str = "下载封面失败";
pub const GAME_IMAGE_FAILED: &str = "游戏图片下载失败";
pub const STEAM_APP_URL: &str = "https://store.steampowered.com/app/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionLabel {
    Summary,
    Cover,
    Previews,
    PlayLinks,
    Magnets,
    Description,
    GameImage,
    Screenshots,
    Price,
    Online,
    DlcHeader,
    Dlc,
    Introduction,
    ConsoleSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchItem {
    Image(Bytes),
    /// Text shown in place of an image that could not be downloaded.
    Missing(String),
}

/// An image batch that refuses items beyond its declared maximum.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    max: usize,
    items: Vec<BatchItem>,
}

impl ImageBatch {
    pub fn new(max: usize) -> Self { Self { max, items: Vec::new() } }

    /// Returns false once the batch is full.
    pub fn push(&mut self, item: BatchItem) -> bool {
        if self.items.len() >= self.max { return false; }
        self.items.push(item);
        true
    }

    pub fn max(&self) -> usize { self.max }
    pub fn items(&self) -> &[BatchItem] { &self.items }
    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn image_count(&self) -> usize {
        self.items.iter().filter(|i| matches!(i, BatchItem::Image(_))).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Image(Bytes),
    Batch(ImageBatch),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageSection {
    pub label: SectionLabel,
    pub segments: Vec<Segment>,
}

impl MessageSection {
    pub fn new(label: SectionLabel) -> Self { Self { label, segments: Vec::new() } }

    pub fn text(label: SectionLabel, text: impl Into<String>) -> Self {
        Self { label, segments: vec![Segment::Text(text.into())] }
    }

    pub fn with(mut self, segment: Segment) -> Self {
        self.segments.push(segment);
        self
    }

    /// The first batch segment, if any.
    pub fn batch(&self) -> Option<&ImageBatch> {
        self.segments.iter().find_map(|s| match s {
            Segment::Batch(b) => Some(b),
            _ => None,
        })
    }

    /// Plain-text rendering, images shown as size markers.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Text(t) => out.push_str(t),
                Segment::Image(b) => out.push_str(&format!("[图片 {} bytes]\n", b.len())),
                Segment::Batch(batch) => {
                    for item in batch.items() {
                        match item {
                            BatchItem::Image(b) => out.push_str(&format!("[图片 {} bytes]\n", b.len())),
                            BatchItem::Missing(t) => { out.push_str(t); out.push('\n'); }
                        }
                    }
                }
            }
        }
        out
    }
}

/// Drop blank URLs first, then keep at most `cap`.
pub fn select_batch_urls(urls: &[String], cap: usize) -> Vec<String> {
    urls.iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .take(cap)
        .map(str::to_string)
        .collect()
}

fn join_or_placeholder(items: &[String], sep: &str) -> String {
    let kept: Vec<&str> = items.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
    if kept.is_empty() { PLACEHOLDER.to_string() } else { kept.join(sep) }
}

fn non_blank(items: &[String]) -> bool { items.iter().any(|s| !s.trim().is_empty()) }

fn or_placeholder(value: Option<&str>) -> &str {
    value.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(PLACEHOLDER)
}

fn batch_section(label: SectionLabel, header: &str, items: Vec<BatchItem>, cap: usize) -> Option<MessageSection> {
    let mut batch = ImageBatch::new(cap);
    for item in items {
        if !batch.push(item) { break; }
    }
    if batch.is_empty() { return None; }
    Some(MessageSection::text(label, header).with(Segment::Batch(batch)))
}

fn image_or_text(label: SectionLabel, header: &str, image: Option<Bytes>, fallback: &str) -> MessageSection {
    let mut section = MessageSection::new(label);
    if !header.is_empty() {
        section = section.with(Segment::Text(header.to_string()));
    }
    match image {
        Some(bytes) => section.with(Segment::Image(bytes)),
        None => section.with(Segment::Text(format!("{fallback}\n"))),
    }
}

// --- AV reply ---

/// Everything the AV reply needs, already settled.
#[derive(Debug, Clone, Default)]
pub struct AvTemplate {
    pub detail: AvDetail,
    pub cover: Option<Bytes>,
    /// One entry per selected preview URL, in URL order.
    pub previews: Vec<BatchItem>,
    pub play_urls: Vec<String>,
    pub magnet_tiers: MagnetLinks,
    pub description: Option<String>,
}

pub fn av_summary(detail: &AvDetail) -> String {
    let mut s = String::new();
    s.push_str(&format!("番号 : {}\n", detail.code));
    s.push_str(&format!("标题 : {}\n", or_placeholder(Some(&detail.title))));
    s.push_str(&format!("演员 : {}\n", join_or_placeholder(&detail.actors, " ")));
    s.push_str(&format!("发行日期 : {}\n", or_placeholder(detail.release_date.as_deref())));
    s.push_str(&format!("类别 : {}\n", join_or_placeholder(&detail.categories, " ")));
    if let Some(d) = detail.duration.as_deref().filter(|d| !d.trim().is_empty()) {
        s.push_str(&format!("时长 : {d}\n"));
    }
    s
}

/// Tiered magnets when any tier is present, otherwise the untiered set.
pub fn magnet_block(tiers: &MagnetLinks, generic: &[String]) -> Option<String> {
    if non_blank(&tiers.hd) || non_blank(&tiers.hd_sub) {
        let mut s = String::from("磁力链接 : \n[HD]\n");
        s.push_str(&join_or_placeholder(&tiers.hd, "\n"));
        s.push('\n');
        if non_blank(&tiers.hd_sub) {
            s.push_str("\n[HD][中文字幕]\n");
            s.push_str(&join_or_placeholder(&tiers.hd_sub, "\n"));
            s.push('\n');
        }
        return Some(s);
    }
    if non_blank(generic) {
        return Some(format!("磁力链接 : \n{}", join_or_placeholder(generic, "\n")));
    }
    None
}

pub fn assemble_av(t: AvTemplate, batch_cap: usize) -> Vec<MessageSection> {
    let mut out = vec![MessageSection::text(SectionLabel::Summary, av_summary(&t.detail))];
    out.push(image_or_text(SectionLabel::Cover, "封面 :\n", t.cover, COVER_FAILED));
    if let Some(previews) = batch_section(SectionLabel::Previews, "预览图 :\n", t.previews, batch_cap) {
        out.push(previews);
    }
    if non_blank(&t.play_urls) {
        out.push(MessageSection::text(
            SectionLabel::PlayLinks,
            format!("在线播放地址 :\n{}", join_or_placeholder(&t.play_urls, "\n")),
        ));
    }
    if let Some(block) = magnet_block(&t.magnet_tiers, &t.detail.magnet_links) {
        out.push(MessageSection::text(SectionLabel::Magnets, block));
    }
    out.push(MessageSection::text(
        SectionLabel::Description,
        format!("简介 :\n{}", or_placeholder(t.description.as_deref())),
    ));
    out
}

// --- Game reply ---

/// Everything the game reply needs, already settled.
#[derive(Debug, Clone, Default)]
pub struct GameTemplate {
    pub hit: GameHit,
    pub info: GameInfo,
    pub image: Option<Bytes>,
    pub screenshots: Vec<BatchItem>,
    /// Indexed like the named entries of `info.dlcs`.
    pub dlc_images: Vec<Option<Bytes>>,
    pub introduction: Option<String>,
}

pub fn game_summary(hit: &GameHit, info: &GameInfo) -> String {
    let mut s = String::new();
    s.push_str(&format!("游戏名称：{}\n", info.name));
    s.push_str(&format!("steam链接：{}{}\n", STEAM_APP_URL, info.app_id));
    s.push_str(&format!("游戏类型：{}\n", info.genres.join(" ")));
    let score = hit.score.as_deref().or(hit.score_desc.as_deref());
    s.push_str(&format!("游戏评分：{}\n", or_placeholder(score)));
    if let Some(p) = info.positive_desc.as_deref().filter(|p| !p.trim().is_empty()) {
        s.push_str(p);
        s.push('\n');
    }
    s.push_str(&format!("steam整体评价：{}\n", or_placeholder(info.review_summary.as_deref())));
    s.push_str(&format!("是否支持中文：{}\n", if info.supports_chinese { "是" } else { "否" }));
    if let Some(en) = info.name_en.as_deref().filter(|n| !n.trim().is_empty()) {
        s.push_str(&format!("英文名称：{en}\n"));
    }
    s
}

pub fn price_block(price: &GamePrice) -> String {
    let mut s = String::new();
    s.push_str(&format!(
        "steam国区目前价格：{}\n",
        price.current.as_deref().unwrap_or("此区域未找到价格")
    ));
    if price.discount != 0 {
        let lowest = match price.is_lowest {
            Some(true) => "是",
            Some(false) => "否",
            None => "未知",
        };
        s.push_str(&format!("steam目前折扣        ：-{}%\n", price.discount));
        s.push_str(&format!("是否为史低折扣        ：{lowest}\n"));
        s.push_str(&format!(
            "折扣剩余时间           ：{}\n",
            price.deadline.as_deref().unwrap_or("商家未明确结束时间")
        ));
    }
    if let Some(lowest) = price.lowest_price.as_deref() {
        s.push_str(&format!("steam历史最低价    ：{lowest}\n"));
        s.push_str(&format!("steam历史最低折扣：-{}%\n", price.lowest_discount));
    }
    s
}

pub fn online_block(stats: &[OnlineStat]) -> String {
    let mut s = String::new();
    for stat in stats {
        s.push_str(&format!("{} : {}\n", stat.desc, stat.value));
        if stat.desc != "当前在线" {
            if let Some(rank) = stat.rank.as_deref() {
                s.push_str(&format!("排名 : {rank}\n\n"));
            }
        }
    }
    s
}

pub fn assemble_game(t: GameTemplate, batch_cap: usize) -> Vec<MessageSection> {
    let info = &t.info;
    let mut out = vec![MessageSection::text(SectionLabel::Summary, game_summary(&t.hit, info))];
    out.push(image_or_text(SectionLabel::GameImage, "", t.image, GAME_IMAGE_FAILED));
    if let Some(shots) = batch_section(SectionLabel::Screenshots, "↘ ↓ ↓游戏截图↓ ↓ ↙\n", t.screenshots, batch_cap) {
        out.push(shots);
    }
    // Free games carry no price.
    if let Some(price) = &info.price {
        out.push(MessageSection::text(SectionLabel::Price, price_block(price)));
    }
    if !info.online.is_empty() {
        out.push(MessageSection::text(SectionLabel::Online, online_block(&info.online)));
    }
    let named: Vec<_> = info.dlcs.iter().filter(|d| !d.name.trim().is_empty()).collect();
    if !named.is_empty() {
        out.push(MessageSection::text(SectionLabel::DlcHeader, "↘ ↓ ↓DLC列表↓ ↓ ↙\n"));
        let mut images = t.dlc_images.into_iter();
        for dlc in named {
            let mut section = MessageSection::new(SectionLabel::Dlc);
            if let Some(Some(bytes)) = images.next() {
                section = section.with(Segment::Image(bytes)).with(Segment::Text("\n".into()));
            }
            section = section.with(Segment::Text(format!("DLC名称：{}\n", dlc.name)));
            if let Some(price) = &dlc.price {
                section = section.with(Segment::Text(price_block(price)));
            }
            out.push(section);
        }
    }
    out.push(MessageSection::text(
        SectionLabel::Introduction,
        format!("游戏简介：\n{}", or_placeholder(t.introduction.as_deref())),
    ));
    out
}

/// Console titles have no store page; the search hit is all there is.
pub fn assemble_console(hit: &GameHit) -> Vec<MessageSection> {
    let mut s = format!("游戏名称：{}\n", hit.name);
    if !hit.platforms.is_empty() {
        s.push_str(&format!("游戏平台：{}\n", hit.platforms.join(" ")));
    }
    let score = hit.score.as_deref().or(hit.score_desc.as_deref());
    s.push_str(&format!("游戏评分：{}\n", or_placeholder(score)));
    vec![MessageSection::text(SectionLabel::ConsoleSummary, s)]
}
