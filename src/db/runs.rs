use anyhow::Result;
use tokio_rusqlite::{Connection, params, rusqlite};

pub async fn create(conn: &Connection, run_id: String) -> Result<()> {
    conn.call(move |c| {
        c.execute("INSERT INTO runs (id) VALUES (?1)", params![run_id])?;
        Ok::<(), rusqlite::Error>(())
    })
    .await?;
    Ok(())
}

pub async fn finish(
    conn: &Connection,
    run_id: String,
    outcome: String,
    uploaded: Option<u64>,
    total: Option<u64>,
    target_address: Option<String>,
) -> Result<()> {
    conn.call(move |c| {
        c.execute(
            "UPDATE runs SET
                finished_at = CURRENT_TIMESTAMP,
                outcome = ?2,
                uploaded = ?3,
                total = ?4,
                target_address = ?5
             WHERE id = ?1",
            params![run_id, outcome, uploaded, total, target_address],
        )?;
        Ok::<(), rusqlite::Error>(())
    })
    .await?;
    Ok(())
}
