use crate::errors::Result;
use crate::structs::{recency_cutoff, ApprovalUpdate, Link, NewLink};
use crate::{migrations, ReadOnlyConn, ReadOnlyDb, WriteableConn, WriteableDb};

use chrono::Utc;
use log::debug;
use std::time::Duration;

/// Persistence contract for curated links.
///
/// Implementations acquire whatever resource they need per call and release
/// it before returning; nothing is held between calls.
pub trait LinkStore: Send + Sync {
    /// Looks up a link by its normalized url. No match is `Ok(None)`.
    fn find_by_url(&self, url: &str) -> Result<Option<Link>>;

    /// Links created inside the recency window ending now, whatever their
    /// approval state.
    fn find_recent(&self) -> Result<Vec<Link>>;

    /// Stores each link whose url is not already present and returns the
    /// created rows. A url that is already stored is skipped, not an error.
    fn insert(&self, links: &[NewLink]) -> Result<Vec<Link>>;

    /// Applies the approval changes atomically and returns those that matched
    /// a stored link.
    fn update_approval(&self, updates: &[ApprovalUpdate]) -> Result<Vec<ApprovalUpdate>>;
}

/// SQLite backed [`LinkStore`]. Opens a new connection for every call.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    location: String,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// `store_url` is a file path, a `sqlite://` prefixed path or a `file:` URI.
    pub fn new(store_url: &str, busy_timeout: Duration) -> SqliteStore {
        let location = store_url
            .strip_prefix("sqlite://")
            .unwrap_or(store_url)
            .to_string();
        SqliteStore {
            location,
            busy_timeout,
        }
    }

    #[inline]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Creates or upgrades the schema. Must run before any other call, read
    /// only connections cannot create the database file.
    pub fn migrate(&self) -> Result<()> {
        let mut conn = WriteableConn::open(&self.location, self.busy_timeout)?;
        migrations::migrate(&mut conn.conn)
    }

    #[inline]
    pub fn writable_db_call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(WriteableConn) -> rusqlite::Result<T>,
    {
        Ok(f(WriteableConn::open(&self.location, self.busy_timeout)?)?)
    }

    #[inline]
    pub fn read_only_db_call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(ReadOnlyConn) -> rusqlite::Result<T>,
    {
        Ok(f(ReadOnlyConn::open(&self.location, self.busy_timeout)?)?)
    }
}

impl LinkStore for SqliteStore {
    fn find_by_url(&self, url: &str) -> Result<Option<Link>> {
        self.read_only_db_call(|db| db.find_by_url(url))
    }

    fn find_recent(&self) -> Result<Vec<Link>> {
        let cutoff = recency_cutoff(Utc::now());
        debug!("querying links created since {cutoff}");
        self.read_only_db_call(|db| db.find_created_since(cutoff))
    }

    fn insert(&self, links: &[NewLink]) -> Result<Vec<Link>> {
        if links.is_empty() {
            return Ok(Vec::new());
        }
        self.writable_db_call(|mut db| db.insert_links(links, Utc::now()))
    }

    fn update_approval(&self, updates: &[ApprovalUpdate]) -> Result<Vec<ApprovalUpdate>> {
        if updates.is_empty() {
            return Ok(Vec::new());
        }
        self.writable_db_call(|mut db| db.update_approvals(updates))
    }
}
