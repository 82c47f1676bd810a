pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::processor::ContentKind;

/// A retained generation artifact, independent of the task that
/// produced it. Lives until its owner deletes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: i64,
    pub content_type: ContentKind,
    pub payload: serde_json::Value,
    pub is_favorite: bool,
    /// 1 through 5 when rated.
    pub rating: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filters for [`HistoryStore::list`]. The default lists everything,
/// newest first, one store-default page at a time.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub content_type: Option<ContentKind>,
    pub favorites_only: bool,
    /// Page size. `None` means the store default.
    pub limit: Option<usize>,
    /// Keyset cursor: only items older than this id. Ids grow with
    /// insertion order, so items created after a page was handed out
    /// can never shift it.
    pub before: Option<i64>,
}

/// One page of history, newest first.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<HistoryItem>,
    /// Pass back as `before` to fetch the next page. `None` when there
    /// is nothing older.
    pub next_cursor: Option<i64>,
}

/// Where finished artifacts live.
///
/// Every operation is scoped to the owning account; items belonging to
/// anyone else are reported as missing, not as forbidden.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn insert(
        &self,
        owner: &str,
        content_type: ContentKind,
        payload: serde_json::Value,
    ) -> Result<HistoryItem>;

    async fn list(&self, owner: &str, filter: HistoryFilter) -> Result<Page>;

    async fn get(&self, owner: &str, id: i64) -> Result<HistoryItem>;

    /// Flip the favorite flag and return the updated item. This is a
    /// toggle, not a set: two callers flipping concurrently do not get
    /// independent "mark as favorite" semantics.
    async fn toggle_favorite(&self, owner: &str, id: i64) -> Result<HistoryItem>;

    /// Overwrite the rating (last write wins). Rejects values outside
    /// `[1, 5]` before touching storage.
    async fn rate(&self, owner: &str, id: i64, rating: u8) -> Result<HistoryItem>;

    /// Permanent removal. Deleting an id that is already gone reports
    /// `NotFound` so double-delete bugs stay visible.
    async fn delete(&self, owner: &str, id: i64) -> Result<()>;

    async fn list_favorites(&self, owner: &str) -> Result<Page> {
        self.list(
            owner,
            HistoryFilter {
                favorites_only: true,
                ..HistoryFilter::default()
            },
        )
        .await
    }
}
