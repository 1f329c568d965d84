use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

/// SQLite-backed key/value cache for review decisions that have not been
/// committed to the backend yet.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDraft {
    pub key: String,
    pub value_json: String,
    pub updated_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `sqlite::memory:` opens its own database.
        let max_connections = if database_url == "sqlite::memory:" { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Last write wins.
    pub async fn put_draft(&self, key: &str, value_json: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO approval_drafts (draft_key, value_json, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(draft_key) DO UPDATE SET value_json=excluded.value_json, updated_at=excluded.updated_at",
        )
        .bind(key)
        .bind(value_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to store draft '{key}'"))?;
        Ok(())
    }

    pub async fn load_draft(&self, key: &str) -> Result<Option<StoredDraft>> {
        let row = sqlx::query(
            "SELECT draft_key, value_json, updated_at FROM approval_drafts WHERE draft_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| stored_draft_from_row(&r)).transpose()
    }

    pub async fn remove_draft(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM approval_drafts WHERE draft_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes every key in one transaction and returns how many existed.
    pub async fn remove_drafts(&self, keys: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for key in keys {
            removed += sqlx::query("DELETE FROM approval_drafts WHERE draft_key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    pub async fn list_drafts(&self, prefix: Option<&str>) -> Result<Vec<StoredDraft>> {
        let rows = match prefix {
            Some(prefix) => {
                sqlx::query(
                    "SELECT draft_key, value_json, updated_at
                     FROM approval_drafts
                     WHERE substr(draft_key, 1, length(?1)) = ?1
                     ORDER BY draft_key",
                )
                .bind(prefix)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT draft_key, value_json, updated_at FROM approval_drafts ORDER BY draft_key",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(stored_draft_from_row).collect()
    }

    pub async fn clear_all_drafts(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM approval_drafts")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn stored_draft_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredDraft> {
    Ok(StoredDraft {
        key: row.try_get("draft_key")?,
        value_json: row.try_get("value_json")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
