use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Failure of a storage operation, independent of the backend that raised it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database version {found} is newer than the supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

impl StoreError {
    /// True when the backend gave up waiting on a lock held by another writer.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    || err.code == rusqlite::ErrorCode::DatabaseLocked
        )
    }
}
