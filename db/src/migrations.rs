use super::queries;
use crate::errors::{Result, StoreError};
use log::{info, trace};

use rusqlite::Connection;

macro_rules! migration {
    ( $n:literal, $( $x:literal ),* ) => {
        paste::item! {
            fn [< migration_$n >] (conn: &Connection) -> rusqlite::Result<()> {
                trace!("running migration {}", $n);

                $(
                    conn.execute($x, [])?;
                )*
                queries::set_version(conn, $n)?;
                trace!("finished migration {}", $n);
                Ok(())
            }
        }
    };
}

migration![
    1,
    "CREATE TABLE link (
        id INTEGER PRIMARY KEY,
        created_at NUMERIC NOT NULL DEFAULT CURRENT_TIMESTAMP,
        message_timestamp TEXT NOT NULL CHECK (length(message_timestamp) <= 50),
        url TEXT NOT NULL CHECK (length(url) <= 500),
        channel_id TEXT NOT NULL CHECK (length(channel_id) <= 50),
        channel_name TEXT NOT NULL CHECK (length(channel_name) <= 100),
        user_id TEXT NOT NULL CHECK (length(user_id) <= 50),
        user_name TEXT NOT NULL CHECK (length(user_name) <= 100),
        is_approved BOOLEAN NOT NULL DEFAULT 0
    );"
];

migration![
    2,
    "CREATE INDEX idx_link_url ON link (url);",
    "CREATE INDEX idx_link_created_at ON link (created_at);"
];

pub fn migrate(conn: &mut Connection) -> Result<()> {
    // be sure to increment this everytime a new migration is added
    const FINAL_VER: u32 = 2;

    let ver = queries::get_version(conn)?;
    info!("database version is currently: {ver} with target ver {FINAL_VER}");
    if ver == FINAL_VER {
        return Ok(());
    }
    if ver > FINAL_VER {
        return Err(StoreError::UnsupportedVersion {
            found: ver,
            supported: FINAL_VER,
        });
    }

    let tx = conn.transaction()?;

    trace!("starting migration transaction");

    if ver < 1 {
        migration_1(&tx)?;
    }

    if ver < 2 {
        migration_2(&tx)?;
    }

    trace!("commiting migration transaction");
    tx.commit()?;
    info!("migration successful");
    Ok(())
}
