use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params, params_from_iter, types::Value};
use std::sync::Mutex;

use crate::consts::DEFAULT_PAGE_SIZE;
use crate::error::{Error, Result};
use crate::processor::ContentKind;

use super::{HistoryFilter, HistoryItem, HistoryStore, Page};

/// SQLite-backed history store.
pub struct SqliteHistory {
    conn: Mutex<Connection>,
}

/// Raw row shape, decoded into a [`HistoryItem`] outside the query
/// closure so parse failures surface as crate errors.
struct Row {
    id: i64,
    content_type: String,
    payload: String,
    is_favorite: bool,
    rating: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, content_type, payload, is_favorite, rating, created_at, updated_at";

impl SqliteHistory {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                content_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                rating INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS history_by_owner ON history (owner, id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
        Ok(Row {
            id: row.get(0)?,
            content_type: row.get(1)?,
            payload: row.get(2)?,
            is_favorite: row.get(3)?,
            rating: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn decode(row: Row) -> Result<HistoryItem> {
        Ok(HistoryItem {
            id: row.id,
            content_type: row.content_type.parse::<ContentKind>().map_err(|_| {
                Error::Protocol(format!(
                    "history item {} has unknown content type {:?}",
                    row.id, row.content_type
                ))
            })?,
            payload: serde_json::from_str(&row.payload)?,
            is_favorite: row.is_favorite,
            rating: row.rating.map(|r| r as u8),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    /// Fetch one owned item while already holding the connection lock.
    fn fetch(conn: &Connection, owner: &str, id: i64) -> Result<HistoryItem> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM history WHERE id = ?1 AND owner = ?2"
        ))?;
        let mut rows = stmt.query(params![id, owner])?;
        match rows.next()? {
            Some(row) => Self::decode(Self::read_row(row)?),
            None => Err(Error::NotFound(id)),
        }
    }
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    async fn insert(
        &self,
        owner: &str,
        content_type: ContentKind,
        payload: serde_json::Value,
    ) -> Result<HistoryItem> {
        let payload_json = serde_json::to_string(&payload)?;
        let now = Utc::now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO history (owner, content_type, payload, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![owner, content_type.as_str(), payload_json, now, now],
        )?;
        Ok(HistoryItem {
            id: conn.last_insert_rowid(),
            content_type,
            payload,
            is_favorite: false,
            rating: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn list(&self, owner: &str, filter: HistoryFilter) -> Result<Page> {
        let limit = filter.limit.unwrap_or(DEFAULT_PAGE_SIZE);

        // Ids grow with insertion order, so id DESC matches created_at
        // DESC, and the `before` keyset keeps already-returned pages
        // fixed while new items arrive.
        let mut sql = format!("SELECT {COLUMNS} FROM history WHERE owner = ?");
        let mut args: Vec<Value> = vec![Value::from(owner.to_string())];

        if let Some(kind) = filter.content_type {
            sql.push_str(" AND content_type = ?");
            args.push(Value::from(kind.as_str().to_string()));
        }
        if filter.favorites_only {
            sql.push_str(" AND is_favorite = 1");
        }
        if let Some(before) = filter.before {
            sql.push_str(" AND id < ?");
            args.push(Value::from(before));
        }
        sql.push_str(" ORDER BY id DESC LIMIT ?");
        args.push(Value::from(limit as i64));

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params_from_iter(args), Self::read_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let items = raw
            .into_iter()
            .map(Self::decode)
            .collect::<Result<Vec<_>>>()?;

        let next_cursor = if items.len() == limit {
            items.last().map(|item| item.id)
        } else {
            None
        };

        Ok(Page { items, next_cursor })
    }

    async fn get(&self, owner: &str, id: i64) -> Result<HistoryItem> {
        let conn = self.conn.lock().unwrap();
        Self::fetch(&conn, owner, id)
    }

    async fn toggle_favorite(&self, owner: &str, id: i64) -> Result<HistoryItem> {
        let now = Utc::now();
        let conn = self.conn.lock().unwrap();
        // One UPDATE does the flip; the connection lock makes it atomic
        // with respect to any other mutation of the same item.
        let changed = conn.execute(
            "UPDATE history SET is_favorite = 1 - is_favorite, updated_at = ?3
             WHERE id = ?1 AND owner = ?2",
            params![id, owner, now],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(id));
        }
        Self::fetch(&conn, owner, id)
    }

    async fn rate(&self, owner: &str, id: i64, rating: u8) -> Result<HistoryItem> {
        if !(1..=5).contains(&rating) {
            return Err(Error::InvalidArgument(format!(
                "rating must be between 1 and 5, got {rating}"
            )));
        }
        let now = Utc::now();
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE history SET rating = ?3, updated_at = ?4
             WHERE id = ?1 AND owner = ?2",
            params![id, owner, rating, now],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(id));
        }
        Self::fetch(&conn, owner, id)
    }

    async fn delete(&self, owner: &str, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM history WHERE id = ?1 AND owner = ?2",
            params![id, owner],
        )?;
        if deleted == 0 {
            return Err(Error::NotFound(id));
        }
        Ok(())
    }
}
