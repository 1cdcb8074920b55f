use crate::connections::GetConnectionMutable;
use crate::queries;
use crate::structs::{ApprovalUpdate, Link, NewLink};
use crate::ReadOnlyDb;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rusqlite::{Error, Result, TransactionBehavior};

pub trait WriteableDb: GetConnectionMutable + ReadOnlyDb {
    /// Inserts every link whose url is not stored yet, all stamped with
    /// `created_at`. The existence check and the insert are one statement, so
    /// two writers racing on the same url cannot both insert it.
    ///
    /// Returns only the rows that were created. The batch is a single
    /// transaction: a constraint failure on any row inserts nothing. The write
    /// lock is taken up front so concurrent writers queue on the busy timeout
    /// instead of failing on lock promotion.
    #[inline]
    fn insert_links(&mut self, links: &[NewLink], created_at: DateTime<Utc>) -> Result<Vec<Link>> {
        let tx = self
            .get_mutable_connection()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut inserted = Vec::with_capacity(links.len());

        {
            let mut stmt = tx.prepare(
                "INSERT INTO link (
                    created_at, message_timestamp, url,
                    channel_id, channel_name, user_id, user_name
                )
                SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
                WHERE NOT EXISTS (SELECT 1 FROM link WHERE url=(?3))",
            )?;

            for link in links {
                let count = stmt.execute((
                    created_at,
                    &link.message_timestamp,
                    &link.url,
                    &link.channel_id,
                    &link.channel_name,
                    &link.user_id,
                    &link.user_name,
                ))?;

                if count == 0 {
                    debug!("{} is already stored, skipping insert", link.url);
                    continue;
                }

                match queries::get_link(&tx, tx.last_insert_rowid())? {
                    Some(row) => inserted.push(row),
                    None => {
                        warn!("No link found for {} despite being just added", link.url);
                        return Err(Error::QueryReturnedNoRows);
                    }
                }
            }
        }

        tx.commit()?;

        if !inserted.is_empty() {
            info!("Inserted {} new link(s)", inserted.len());
        }
        Ok(inserted)
    }

    /// Applies every update in one transaction. Approval is monotonic: an
    /// update with `is_approved == false` never clears a stored approval.
    ///
    /// Returns the updates whose id matched a stored link.
    #[inline]
    fn update_approvals(&mut self, updates: &[ApprovalUpdate]) -> Result<Vec<ApprovalUpdate>> {
        let tx = self
            .get_mutable_connection()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut applied = Vec::with_capacity(updates.len());

        {
            let mut stmt = tx.prepare(
                "UPDATE link
                SET is_approved = MAX(is_approved, ?1)
                WHERE id=(?2)",
            )?;

            for update in updates {
                if stmt.execute((update.is_approved, update.id))? > 0 {
                    applied.push(*update);
                } else {
                    warn!("No link with id {} to update", update.id);
                }
            }
        }

        tx.commit()?;
        Ok(applied)
    }
}
