use anyhow::Result;
use tokio_rusqlite::{Connection, params, rusqlite};

pub async fn whitelist_add(conn: &Connection, hardware_id: String) -> Result<()> {
    conn.call(move |c| {
        c.execute(
            "INSERT OR IGNORE INTO whitelist (hardware_id) VALUES (?1)",
            params![hardware_id],
        )?;
        Ok::<(), rusqlite::Error>(())
    })
    .await?;
    Ok(())
}

pub async fn whitelist_contains(conn: &Connection, hardware_id: String) -> Result<bool> {
    let found = conn
        .call(move |c| {
            let mut stmt = c.prepare("SELECT 1 FROM whitelist WHERE hardware_id = ?1")?;
            stmt.exists(params![hardware_id])
        })
        .await?;
    Ok(found)
}

pub async fn whitelist_all(conn: &Connection) -> Result<Vec<String>> {
    let ids = conn
        .call(|c| {
            let mut stmt = c.prepare("SELECT hardware_id FROM whitelist")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<String>>>()
        })
        .await?;
    Ok(ids)
}

pub async fn last_device_set(conn: &Connection, address: String, hardware_id: String) -> Result<()> {
    conn.call(move |c| {
        c.execute(
            "INSERT INTO last_device (slot, address, hardware_id)
             VALUES (0, ?1, ?2)
             ON CONFLICT(slot) DO UPDATE SET
                address = excluded.address,
                hardware_id = excluded.hardware_id,
                remembered_at = CURRENT_TIMESTAMP",
            params![address, hardware_id],
        )?;
        Ok::<(), rusqlite::Error>(())
    })
    .await?;
    Ok(())
}

pub async fn last_device_get(conn: &Connection) -> Result<Option<(String, String)>> {
    use tokio_rusqlite::rusqlite::OptionalExtension;

    let row = conn
        .call(|c| {
            c.query_row(
                "SELECT address, hardware_id FROM last_device WHERE slot = 0",
                [],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
        })
        .await?;
    Ok(row)
}
