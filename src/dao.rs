use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::AnyPool;

/// Absent values are stored as `""`. The Any driver cannot decode NULL into
/// `Option<String>`, so reads also `COALESCE` every nullable column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AvDetailRow {
    pub code: String,
    pub title: String,
    pub actors: String,       // JSON array string
    pub release_date: String,
    pub categories: String,   // JSON array string
    pub cover_url: String,
    pub play_urls: String,    // JSON array string
    pub magnet_links: String, // JSON array string
    pub magnet_hd: String,    // JSON array string
    pub magnet_sub: String,   // JSON array string
    pub description: String,
    pub duration: String,
}

pub async fn find_av_by_code(pool: &AnyPool, code: &str) -> Result<Option<AvDetailRow>> {
    let row = sqlx::query_as::<_, AvDetailRow>(
        "SELECT code, title,
                COALESCE(actors, '') AS actors,
                COALESCE(release_date, '') AS release_date,
                COALESCE(categories, '') AS categories,
                COALESCE(cover_url, '') AS cover_url,
                COALESCE(play_urls, '') AS play_urls,
                COALESCE(magnet_links, '') AS magnet_links,
                COALESCE(magnet_hd, '') AS magnet_hd,
                COALESCE(magnet_sub, '') AS magnet_sub,
                COALESCE(description, '') AS description,
                COALESCE(duration, '') AS duration
         FROM av_details WHERE code = ?",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn upsert_av(pool: &AnyPool, r: &AvDetailRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO av_details(\n            code, title, actors, release_date, categories, cover_url, play_urls,\n            magnet_links, magnet_hd, magnet_sub, description, duration\n         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)\n         ON CONFLICT(code) DO UPDATE SET\n           title=excluded.title, actors=excluded.actors, release_date=excluded.release_date,\n           categories=excluded.categories, cover_url=excluded.cover_url, play_urls=excluded.play_urls,\n           magnet_links=excluded.magnet_links, magnet_hd=excluded.magnet_hd, magnet_sub=excluded.magnet_sub,\n           description=excluded.description, duration=excluded.duration, updated_at=CURRENT_TIMESTAMP",
    )
    .bind(&r.code)
    .bind(&r.title)
    .bind(&r.actors)
    .bind(&r.release_date)
    .bind(&r.categories)
    .bind(&r.cover_url)
    .bind(&r.play_urls)
    .bind(&r.magnet_links)
    .bind(&r.magnet_hd)
    .bind(&r.magnet_sub)
    .bind(&r.description)
    .bind(&r.duration)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_previews(pool: &AnyPool, code: &str) -> Result<Vec<String>> {
    let rows: Vec<String> = sqlx::query_scalar("SELECT url FROM av_previews WHERE code = ? ORDER BY idx")
        .bind(code)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn replace_previews(pool: &AnyPool, code: &str, urls: &[String]) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM av_previews WHERE code = ?")
        .bind(code)
        .execute(&mut *tx)
        .await?;
    for (idx, url) in urls.iter().enumerate() {
        sqlx::query("INSERT INTO av_previews(code, idx, url) VALUES(?, ?, ?)")
            .bind(code)
            .bind(idx as i64)
            .bind(url)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn count_av(pool: &AnyPool) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM av_details").fetch_one(pool).await?;
    Ok(n)
}

pub async fn count_cache_entries(pool: &AnyPool, now: i64) -> Result<(i64, i64)> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM search_cache").fetch_one(pool).await?;
    let expired: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM search_cache WHERE expires_at <= ?")
        .bind(now)
        .fetch_one(pool)
        .await?;
    Ok((total, expired))
}

pub async fn count_previews(pool: &AnyPool) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM av_previews").fetch_one(pool).await?;
    Ok(n)
}
