mod errors;
mod migrations;
mod queries;
mod read_only_db;
mod store;
pub mod structs;
mod writeable_db;

pub use errors::{Result, StoreError};
pub use read_only_db::ReadOnlyDb;
pub use store::{LinkStore, SqliteStore};
pub use writeable_db::WriteableDb;

use rusqlite::{Connection, OpenFlags};
use std::time::Duration;

pub(crate) mod connections {
    use rusqlite::Connection;

    pub trait GetConnectionImmutable {
        fn get_connection(&self) -> &Connection;
    }

    pub trait GetConnectionMutable {
        fn get_mutable_connection(&mut self) -> &mut Connection;
    }
}

pub struct ReadOnlyConn {
    conn: Connection,
}

impl connections::GetConnectionImmutable for ReadOnlyConn {
    #[inline]
    fn get_connection(&self) -> &Connection {
        &self.conn
    }
}

impl ReadOnlyDb for ReadOnlyConn {}

pub struct WriteableConn {
    conn: Connection,
}

impl connections::GetConnectionImmutable for WriteableConn {
    #[inline]
    fn get_connection(&self) -> &Connection {
        &self.conn
    }
}

impl connections::GetConnectionMutable for WriteableConn {
    #[inline]
    fn get_mutable_connection(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl ReadOnlyDb for WriteableConn {}

impl WriteableDb for WriteableConn {}

/// Opens a fresh connection to `location`. `location` may be a plain path or
/// a `file:` URI. Every connection waits up to `busy_timeout` on a locked
/// database before failing with `SQLITE_BUSY`.
#[inline(always)]
fn open_database(location: &str, read_only: bool, busy_timeout: Duration) -> rusqlite::Result<Connection> {
    let mode = if read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
    };
    let conn = Connection::open_with_flags(
        location,
        mode | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(busy_timeout)?;
    Ok(conn)
}

impl ReadOnlyConn {
    #[inline(always)]
    fn open(location: &str, busy_timeout: Duration) -> rusqlite::Result<ReadOnlyConn> {
        Ok(ReadOnlyConn {
            conn: open_database(location, true, busy_timeout)?,
        })
    }
}

impl WriteableConn {
    #[inline(always)]
    fn open(location: &str, busy_timeout: Duration) -> rusqlite::Result<WriteableConn> {
        Ok(WriteableConn {
            conn: open_database(location, false, busy_timeout)?,
        })
    }
}
