use tracing::warn;

use crate::dao::AvDetailRow;
use crate::types::AvDetail;

fn list_to_json(items: &[String]) -> String {
    if items.is_empty() { return String::new(); }
    serde_json::to_string(items).unwrap_or_default()
}

fn text_or_none(s: String) -> Option<String> {
    (!s.trim().is_empty()).then_some(s)
}

fn list_from_json(column: &str, raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() { return Vec::new(); }
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(column, error = %e, "stored list is not a JSON string array; treating as empty");
            Vec::new()
        }
    }
}

/// Previews live in their own table and are not part of the row.
pub fn av_row_from_detail(d: &AvDetail) -> AvDetailRow {
    AvDetailRow {
        code: d.code.clone(),
        title: d.title.clone(),
        actors: list_to_json(&d.actors),
        release_date: d.release_date.clone().unwrap_or_default(),
        categories: list_to_json(&d.categories),
        cover_url: d.cover_url.clone().unwrap_or_default(),
        play_urls: list_to_json(&d.play_urls),
        magnet_links: list_to_json(&d.magnet_links),
        magnet_hd: list_to_json(&d.magnet_hd),
        magnet_sub: list_to_json(&d.magnet_sub),
        description: d.description.clone().unwrap_or_default(),
        duration: d.duration.clone().unwrap_or_default(),
    }
}

pub fn av_detail_from_row(r: AvDetailRow, previews: Vec<String>) -> AvDetail {
    AvDetail {
        actors: list_from_json("actors", &r.actors),
        categories: list_from_json("categories", &r.categories),
        play_urls: list_from_json("play_urls", &r.play_urls),
        magnet_links: list_from_json("magnet_links", &r.magnet_links),
        magnet_hd: list_from_json("magnet_hd", &r.magnet_hd),
        magnet_sub: list_from_json("magnet_sub", &r.magnet_sub),
        code: r.code,
        title: r.title,
        release_date: text_or_none(r.release_date),
        cover_url: text_or_none(r.cover_url),
        preview_images: previews,
        description: text_or_none(r.description),
        duration: text_or_none(r.duration),
    }
}

pub fn game_cache_key(app_id: u32) -> String { format!("steam|info|{}", app_id) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_round_trip_keeps_lists() {
        let d = AvDetail {
            code: "ABC-123".into(),
            title: "title".into(),
            actors: vec!["a".into(), "b".into()],
            magnet_hd: vec!["magnet:?xt=1".into()],
            preview_images: vec!["p1".into()],
            ..Default::default()
        };
        let row = av_row_from_detail(&d);
        assert_eq!(row.actors, r#"["a","b"]"#);
        assert!(row.magnet_sub.is_empty());
        assert!(row.cover_url.is_empty());
        let back = av_detail_from_row(row, d.preview_images.clone());
        assert_eq!(back, d);
    }

    #[test]
    fn corrupt_list_column_reads_as_empty() {
        let row = AvDetailRow {
            code: "X-1".into(),
            title: "t".into(),
            categories: "not json".into(),
            ..Default::default()
        };
        let d = av_detail_from_row(row, Vec::new());
        assert!(d.categories.is_empty());
    }
}
