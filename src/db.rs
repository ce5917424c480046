use anyhow::{Context, Result};
use directories::ProjectDirs;
use sqlx::{any::AnyConnectOptions, AnyPool, ConnectOptions, migrate::Migrator};
use sqlx::any::AnyPoolOptions;
use std::{path::PathBuf, str::FromStr};
use std::sync::Once;

use crate::dao;
use crate::mapping::{av_detail_from_row, av_row_from_detail};
use crate::storage::Storage;
use crate::types::AvDetail;

// Ensure drivers are installed exactly once for sqlx::any
static INSTALL_DRIVERS: Once = Once::new();

// Embed SQL migrations from the migrations/ directory
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
}

impl Database {
    // Create a connection pool. If database_url is None, use a SQLite file in
    // the user's data directory.
    pub async fn connect(database_url: Option<&str>) -> Result<Self> {
        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let url = match database_url {
            Some(u) if !u.trim().is_empty() => u.to_string(),
            _ => default_sqlite_url()?,
        };

        let opts = AnyConnectOptions::from_str(&url)
            .with_context(|| format!("invalid database URL: {url}"))?;
        // Quiet by default; callers can enable SQLX_LOG if they want
        let opts = opts.disable_statement_logging();

        let pool = AnyPoolOptions::new()
            .max_connections(10)
            .connect_with(opts)
            .await
            .with_context(|| format!("failed to connect to database: {url}"))?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.context("running migrations")
    }

    pub fn pool(&self) -> &AnyPool { &self.pool }

    pub async fn clear_cache_prefix(&self, prefix: Option<&str>) -> Result<u64> {
        let result = if let Some(p) = prefix {
            let like = format!("{}%", p);
            sqlx::query("DELETE FROM search_cache WHERE key LIKE ?")
                .bind(like)
                .execute(&self.pool)
                .await?
        } else {
            sqlx::query("DELETE FROM search_cache")
                .execute(&self.pool)
                .await?
        };
        Ok(result.rows_affected())
    }

    pub async fn purge_expired_cache(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM search_cache WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn vacuum(&self) -> Result<()> {
        // Best-effort: works on SQLite
        let _ = sqlx::query("VACUUM").execute(&self.pool).await;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Storage for Database {
    async fn get_cache(&self, key: &str, now: i64) -> Result<Option<String>> {
        let row = sqlx::query_scalar::<_, String>(
            "SELECT payload FROM search_cache WHERE key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn put_cache(&self, key: &str, payload: &str, expires_at: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO search_cache(key, payload, expires_at) VALUES (?, ?, ?)\n             ON CONFLICT(key) DO UPDATE SET payload=excluded.payload, expires_at=excluded.expires_at",
        )
        .bind(key)
        .bind(payload)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_av(&self, code: &str) -> Result<Option<AvDetail>> {
        let Some(row) = dao::find_av_by_code(&self.pool, code).await? else { return Ok(None); };
        let previews = dao::list_previews(&self.pool, code).await?;
        Ok(Some(av_detail_from_row(row, previews)))
    }

    async fn put_av(&self, detail: &AvDetail) -> Result<()> {
        dao::upsert_av(&self.pool, &av_row_from_detail(detail))
            .await
            .with_context(|| format!("upserting av record {}", detail.code))
    }

    async fn list_previews(&self, code: &str) -> Result<Vec<String>> {
        dao::list_previews(&self.pool, code).await
    }

    async fn put_previews(&self, code: &str, urls: &[String]) -> Result<()> {
        dao::replace_previews(&self.pool, code, urls)
            .await
            .with_context(|| format!("replacing previews for {code}"))
    }
}

fn default_sqlite_url() -> Result<String> {
    let proj = ProjectDirs::from("dev", "seekbot", "seekbot")
        .context("unable to determine data directory for default sqlite path")?;
    let mut path: PathBuf = proj.data_dir().to_path_buf();
    std::fs::create_dir_all(&path).with_context(|| format!("creating data dir: {}", path.display()))?;
    path.push("seekbot.db");
    Ok(sqlite_url_for(&path))
}

/// `sqlite://` URL that creates the file on first open.
pub fn sqlite_url_for(path: &std::path::Path) -> String {
    // Encode spaces in the path for a valid sqlite URL
    let path_str = path.to_string_lossy().replace(' ', "%20");
    format!("sqlite://{path_str}?mode=rwc")
}

#[cfg(test)]
pub(crate) async fn temp_database() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let url = sqlite_url_for(&dir.path().join("test.db"));
    let db = Database::connect(Some(&url)).await.unwrap();
    db.run_migrations().await.unwrap();
    (dir, db)
}
