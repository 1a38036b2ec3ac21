use super::{NotificationChannel, RunEvent};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

/// Posts run results as JSON to a configured webhook endpoint.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }

    fn format_payload(&self, event: &RunEvent) -> serde_json::Value {
        match event {
            RunEvent::Completed {
                run_id,
                uploaded,
                total,
                target_address,
            } => json!({
                "event": "backup-completed",
                "run_id": run_id,
                "uploaded": uploaded,
                "total": total,
                "target": target_address,
                "text": format!("Uploaded {uploaded}/{total} files to {target_address}"),
            }),
            RunEvent::Failed { run_id, error } => json!({
                "event": "backup-failed",
                "run_id": run_id,
                "error": error,
                "text": format!("Backup failed: {error}"),
            }),
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookNotifier {
    async fn notify(&self, event: RunEvent) -> Result<()> {
        let payload = self.format_payload(&event);
        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
