use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::{
    domain::{ChatId, Origin, RowId},
    protocol::StoreRow,
};

/// Shared message store. Rows are written by the automation side and read by chat sessions.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        // Every connection to `sqlite::memory:` opens its own database.
        let max_connections = if database_url.starts_with("sqlite::memory:") {
            1
        } else {
            5
        };
        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn insert_row(
        &self,
        chat_id: &ChatId,
        message: &str,
        source: Origin,
    ) -> Result<StoreRow> {
        let created_at = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO chat_rows (chat_id, message, source, created_at) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(chat_id.as_str())
        .bind(message)
        .bind(source.as_str())
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to insert row for chat '{chat_id}'"))?;

        let id = RowId(rec.get::<i64, _>(0));
        debug!(chat_id = %chat_id, row_id = id.0, source = source.as_str(), "stored chat row");
        Ok(StoreRow {
            id,
            chat_id: chat_id.clone(),
            message: message.to_string(),
            created_at,
            source,
        })
    }

    /// The `limit` most recent rows of a chat, oldest first.
    pub async fn latest_rows(&self, chat_id: &ChatId, limit: u32) -> Result<Vec<StoreRow>> {
        let mut rows = sqlx::query(
            "SELECT id, chat_id, message, source, created_at
             FROM chat_rows
             WHERE chat_id = ?
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(chat_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.reverse();
        rows.iter().map(store_row).collect()
    }

    /// Rows of a chat with an id greater than `after`, oldest first.
    pub async fn rows_after(
        &self,
        chat_id: &ChatId,
        after: RowId,
        limit: u32,
    ) -> Result<Vec<StoreRow>> {
        let rows = sqlx::query(
            "SELECT id, chat_id, message, source, created_at
             FROM chat_rows
             WHERE chat_id = ? AND id > ?
             ORDER BY id ASC
             LIMIT ?",
        )
        .bind(chat_id.as_str())
        .bind(after.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(store_row).collect()
    }
}

fn store_row(row: &SqliteRow) -> Result<StoreRow> {
    let raw_source: String = row.try_get("source")?;
    let source =
        Origin::parse(&raw_source).ok_or_else(|| anyhow!("unknown row source '{raw_source}'"))?;
    Ok(StoreRow {
        id: RowId(row.try_get::<i64, _>("id")?),
        chat_id: ChatId(row.try_get::<String, _>("chat_id")?),
        message: row.try_get::<String, _>("message")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        source,
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
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
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
