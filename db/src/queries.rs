use crate::structs::Link;
use rusqlite::{Connection, OptionalExtension, Result, Row};

/// Column list matching the order `link_from_row` reads.
pub const LINK_COLUMNS: &str = "id, url, message_timestamp, channel_id, channel_name, \
    user_id, user_name, created_at, is_approved";

#[inline(always)]
pub fn get_version(conn: &Connection) -> Result<u32> {
    conn.query_row("SELECT user_version FROM pragma_user_version;", [], |row| {
        row.get(0)
    })
}

#[inline(always)]
pub fn set_version(conn: &Connection, version: u32) -> Result<()> {
    conn.pragma_update(None, "user_version", version)
}

#[inline(always)]
pub fn link_from_row(row: &Row<'_>) -> Result<Link> {
    Ok(Link {
        id: row.get(0)?,
        url: row.get(1)?,
        message_timestamp: row.get(2)?,
        channel_id: row.get(3)?,
        channel_name: row.get(4)?,
        user_id: row.get(5)?,
        user_name: row.get(6)?,
        created_at: row.get(7)?,
        is_approved: row.get(8)?,
    })
}

#[inline(always)]
pub fn get_link(conn: &Connection, id: i64) -> Result<Option<Link>> {
    conn.query_row(
        &format!("SELECT {LINK_COLUMNS} FROM link WHERE id=(?1)"),
        [id],
        link_from_row,
    )
    .optional()
}
