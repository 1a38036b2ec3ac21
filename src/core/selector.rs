//! Candidate selection for one backup run.
//!
//! Lists the immediate children of each configured folder (non-recursive),
//! applies the folder's extension filter, and drops every file whose history
//! key is already recorded. Folders that cannot be opened are skipped; only
//! the degenerate case where no folder resolves at all is an error, so the
//! orchestrator can tell "nothing to do" apart from "nothing worked".

use std::time::UNIX_EPOCH;

use thiserror::Error;
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

use crate::core::models::{BackupFolder, SourceFile, history_key};
use crate::db;

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("none of the configured backup folders could be opened")]
    NoFoldersResolvable,
    #[error("upload history query failed: {0}")]
    History(#[from] anyhow::Error),
}

pub struct FileSelector {
    conn: Connection,
}

impl FileSelector {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Result order is not guaranteed stable across runs.
    pub async fn select_candidates(
        &self,
        folders: &[BackupFolder],
    ) -> Result<Vec<SourceFile>, SelectError> {
        let history = db::history::keys(&self.conn).await?;

        let folders = folders.to_vec();
        let (listed, resolved) = tokio::task::spawn_blocking(move || list_folders(&folders))
            .await
            .unwrap_or((Vec::new(), 0));

        if resolved == 0 {
            return Err(SelectError::NoFoldersResolvable);
        }

        let candidates: Vec<SourceFile> = listed
            .into_iter()
            .filter(|file| !history.contains(&file.history_key))
            .collect();
        debug!(candidates = candidates.len(), "selection complete");
        Ok(candidates)
    }
}

/// Enumerate matching files across all folders; returns the files plus the
/// number of folders that could actually be read.
fn list_folders(folders: &[BackupFolder]) -> (Vec<SourceFile>, usize) {
    let mut files = Vec::new();
    let mut resolved = 0;

    for folder in folders {
        let entries = match std::fs::read_dir(&folder.path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(folder = %folder.path.display(), error = %e, "skipping unreadable backup folder");
                continue;
            }
        };
        resolved += 1;

        for entry in entries {
            let Ok(entry) = entry else { continue };
            let path = entry.path();

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
                continue;
            };
            if !folder.matches(&name) {
                continue;
            }

            let modified_ms = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);

            files.push(SourceFile {
                history_key: history_key(&folder.path, &name, modified_ms),
                path,
                name,
                modified_ms,
            });
        }
    }

    (files, resolved)
}
