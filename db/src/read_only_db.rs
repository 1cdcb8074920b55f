use crate::connections::GetConnectionImmutable;
use crate::queries::{self, LINK_COLUMNS};
use crate::structs::Link;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result};

pub trait ReadOnlyDb: GetConnectionImmutable {
    /// Oldest stored link for `url`. Rows inserted before the url was
    /// deduplicated at insert time may share a url, hence the ordering.
    #[inline]
    fn find_by_url(&self, url: &str) -> Result<Option<Link>> {
        self.get_connection()
            .query_row(
                &format!(
                    "SELECT {LINK_COLUMNS} FROM link
                    WHERE url=(?1)
                    ORDER BY id
                    LIMIT 1"
                ),
                [url],
                queries::link_from_row,
            )
            .optional()
    }

    /// Every link with `created_at >= cutoff`, oldest first.
    #[inline]
    fn find_created_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Link>> {
        let mut stmt = self.get_connection().prepare(&format!(
            "SELECT {LINK_COLUMNS} FROM link
            WHERE created_at >= (?1)
            ORDER BY created_at, id"
        ))?;

        let rows = stmt.query_map([cutoff], queries::link_from_row)?;

        let mut links = Vec::new();
        for row in rows {
            links.push(row?)
        }
        Ok(links)
    }
}
