use anyhow::Result;
use chrono::Utc;

use super::schema::Database;
use super::types::{FeedRow, StoredFeed};

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Records `url` under `public_key`.
    ///
    /// Re-registering a known URL keeps its original `created_at` and takes the
    /// new key, which happens when the shared secret changes.
    pub async fn upsert_feed(&self, public_key: &str, url: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feeds (public_key, url, created_at) VALUES (?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET public_key = excluded.public_key
        "#,
        )
        .bind(public_key)
        .bind(url)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Canonical feed URL registered under `public_key`.
    pub async fn feed_url_for(&self, public_key: &str) -> Result<Option<String>> {
        let url: Option<(String,)> = sqlx::query_as("SELECT url FROM feeds WHERE public_key = ?")
            .bind(public_key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(url.map(|(url,)| url))
    }

    /// All registered feeds, oldest first.
    pub async fn list_feeds(&self) -> Result<Vec<StoredFeed>> {
        let rows: Vec<FeedRow> = sqlx::query_as(
            "SELECT public_key, url, created_at FROM feeds ORDER BY created_at, url",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StoredFeed::from_row).collect())
    }

    /// Removes the feed registered for `url`. Returns whether a row was deleted.
    pub async fn delete_feed(&self, url: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feeds WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Drops a feed that no longer parses.
///
/// Best effort: failures are logged and otherwise ignored, so callers can use
/// this on their error path without masking the original error.
pub async fn delete_invalid_feed(db: &Database, url: &str) {
    match db.delete_feed(url).await {
        Ok(true) => tracing::info!(url = %url, "Removed invalid feed from store"),
        Ok(false) => tracing::debug!(url = %url, "Invalid feed was not registered"),
        Err(e) => tracing::warn!(url = %url, error = %e, "Failed to remove invalid feed"),
    }
}
