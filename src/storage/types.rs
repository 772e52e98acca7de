use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database
    #[error("The feed store is locked by another process. Please close it and try again.")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Maps lock-related sqlx errors to [`DatabaseError::Locked`]
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::Locked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Helper Types
// ============================================================================

/// Row type for feed queries
pub(crate) type FeedRow = (String, String, i64);

// ============================================================================
// Data Structures
// ============================================================================

/// A registered feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFeed {
    /// Hex x-only public key of the feed's identity.
    pub public_key: String,
    /// Canonical feed URL the identity was derived from.
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl StoredFeed {
    pub(crate) fn from_row((public_key, url, created_at): FeedRow) -> Self {
        Self {
            public_key,
            url,
            created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_default(),
        }
    }
}
