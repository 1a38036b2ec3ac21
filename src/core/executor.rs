//! Sequential upload of selected files with bounded retry.
//!
//! Files go out strictly one at a time, in selection order. Each file gets a
//! fixed number of attempts with a fixed backoff between them; a file whose
//! source cannot even be opened is abandoned immediately without touching the
//! retry budget. History is committed write-through on the first success so a
//! crash mid-run never re-sends already-delivered files. One file's failure
//! never aborts the batch.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_rusqlite::Connection;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::models::{Device, SourceFile, UploadSummary};
use crate::core::status::StatusSink;
use crate::core::transfer::TransferClient;
use crate::db;

pub struct UploadExecutor {
    client: Arc<dyn TransferClient>,
    conn: Connection,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl UploadExecutor {
    pub fn new(
        client: Arc<dyn TransferClient>,
        conn: Connection,
        max_attempts: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            client,
            conn,
            max_attempts,
            retry_backoff,
        }
    }

    pub async fn upload_batch(
        &self,
        target: &Device,
        files: &[SourceFile],
        status: &dyn StatusSink,
        cancel: &CancellationToken,
    ) -> Result<UploadSummary> {
        let mut uploaded = 0;

        for file in files {
            if cancel.is_cancelled() {
                status.status("Upload batch cancelled; remaining files stay queued for the next run.");
                break;
            }

            // An unopenable source cannot be helped by retrying.
            if let Err(e) = std::fs::File::open(&file.path) {
                warn!(file = %file.name, error = %e, "cannot open file, skipping");
                continue;
            }

            if self.upload_with_retry(target, file).await {
                db::history::record(&self.conn, file.history_key.clone(), file.name.clone())
                    .await?;
                uploaded += 1;
                debug!(file = %file.name, "upload recorded");
            } else {
                warn!(
                    file = %file.name,
                    attempts = self.max_attempts,
                    "upload abandoned for this run"
                );
            }
        }

        let summary = UploadSummary {
            uploaded,
            total: files.len(),
        };
        info!(uploaded = summary.uploaded, total = summary.total, "upload batch finished");
        Ok(summary)
    }

    async fn upload_with_retry(&self, target: &Device, file: &SourceFile) -> bool {
        for attempt in 1..=self.max_attempts {
            match self
                .client
                .upload(target.address, &file.name, &file.path)
                .await
            {
                Ok(()) => return true,
                Err(e) => {
                    warn!(
                        file = %file.name,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "upload attempt failed"
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_backoff).await;
                    }
                }
            }
        }
        false
    }
}
