use std::collections::HashSet;

use anyhow::Result;
use tokio_rusqlite::{Connection, params, rusqlite};

/// Record an uploaded file version. Write-through: called once per
/// successful upload, not batched, so a crash mid-run loses at most the
/// in-flight file.
pub async fn record(conn: &Connection, key: String, file_name: String) -> Result<()> {
    conn.call(move |c| {
        c.execute(
            "INSERT OR IGNORE INTO upload_history (key, file_name) VALUES (?1, ?2)",
            params![key, file_name],
        )?;
        Ok::<(), rusqlite::Error>(())
    })
    .await?;
    Ok(())
}

pub async fn contains(conn: &Connection, key: String) -> Result<bool> {
    let found = conn
        .call(move |c| {
            let mut stmt = c.prepare("SELECT 1 FROM upload_history WHERE key = ?1")?;
            stmt.exists(params![key])
        })
        .await?;
    Ok(found)
}

/// Full key set, read once per selection pass.
pub async fn keys(conn: &Connection) -> Result<HashSet<String>> {
    let keys = conn
        .call(|c| {
            let mut stmt = c.prepare("SELECT key FROM upload_history")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<HashSet<String>>>()
        })
        .await?;
    Ok(keys)
}
