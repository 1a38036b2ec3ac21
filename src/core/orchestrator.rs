//! The backup run state machine.
//!
//! One run walks: preconditions (folders, connectivity) → cached-device fast
//! path → subnet scan + whitelist classification → selection handoff →
//! file selection → upload. Every exit path reports through the status sink,
//! lands in the run log, and releases the process-wide guard, so concurrent
//! triggers (manual plus scheduled) stay safe without queueing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_rusqlite::Connection;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info_span, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::context::AppContext;
use crate::core::connectivity::ConnectivityProbe;
use crate::core::executor::UploadExecutor;
use crate::core::models::{Device, RunOutcome, SkipReason, UploadSummary};
use crate::core::neighbor::NeighborResolver;
use crate::core::notifications::{self, NotificationChannel, RunEvent};
use crate::core::registry::DeviceRegistry;
use crate::core::scanner::SubnetScanner;
use crate::core::selector::FileSelector;
use crate::core::status::{ScanObserver, StatusSink};
use crate::core::transfer::TransferClient;
use crate::db;

/// Presented with the discovered set when the whitelist does not identify a
/// single target. Returns the chosen device, or `None` to decline the run.
#[async_trait]
pub trait SelectionCollaborator: Send + Sync {
    async fn choose(&self, discovered: &[Device]) -> Option<Device>;
}

/// Process-wide at-most-one-run guard. The token releases the flag on every
/// exit path, including unwinds.
pub struct RunGuard {
    running: AtomicBool,
}

impl RunGuard {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
        }
    }

    fn try_acquire(&self) -> Option<RunToken<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunToken { guard: self })
    }
}

impl Default for RunGuard {
    fn default() -> Self {
        Self::new()
    }
}

struct RunToken<'a> {
    guard: &'a RunGuard,
}

impl Drop for RunToken<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

/// Forwards per-address probe completions to the status sink.
struct SinkScanObserver {
    sink: Arc<dyn StatusSink>,
}

impl ScanObserver for SinkScanObserver {
    fn probed(&self, address: std::net::Ipv4Addr, completed: usize, total: usize) {
        self.sink.scan_progress(address, completed, total);
    }
}

pub struct BackupOrchestrator {
    config: Arc<AppConfig>,
    conn: Connection,
    scanner: SubnetScanner,
    registry: DeviceRegistry,
    selector: FileSelector,
    executor: UploadExecutor,
    resolver: Arc<dyn NeighborResolver>,
    connectivity: Box<dyn ConnectivityProbe>,
    notifier: Option<Arc<dyn NotificationChannel>>,
    guard: RunGuard,
}

impl BackupOrchestrator {
    pub fn new(
        ctx: &AppContext,
        resolver: Arc<dyn NeighborResolver>,
        connectivity: Box<dyn ConnectivityProbe>,
        client: Arc<dyn TransferClient>,
    ) -> Self {
        let config = Arc::clone(&ctx.config);
        Self {
            scanner: SubnetScanner::new(Arc::clone(&resolver), &config.scan),
            registry: DeviceRegistry::new(ctx.db.clone()),
            selector: FileSelector::new(ctx.db.clone()),
            executor: UploadExecutor::new(
                client,
                ctx.db.clone(),
                config.retry_attempts,
                Duration::from_millis(config.retry_backoff_ms),
            ),
            notifier: notifications::create_notifier(&config.notification),
            conn: ctx.db.clone(),
            config,
            resolver,
            connectivity,
            guard: RunGuard::new(),
        }
    }

    /// Drop the scanner's cached snapshot; the next run probes fresh.
    pub async fn invalidate_scan_cache(&self) {
        self.scanner.invalidate().await;
    }

    /// Execute one backup run to a terminal state.
    ///
    /// The selection collaborator is an explicit parameter: headless callers
    /// pass `None` and ambiguous discovery skips the run.
    pub async fn run(
        &self,
        selection: Option<&dyn SelectionCollaborator>,
        status: Arc<dyn StatusSink>,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let Some(_token) = self.guard.try_acquire() else {
            status.status("Backup already running, skipping this trigger.");
            return RunOutcome::Skipped(SkipReason::AlreadyRunning);
        };

        let run_id = Uuid::now_v7().to_string();
        let span = info_span!("backup_run", run_id = %run_id);
        let outcome = self
            .execute(&run_id, selection, &status, cancel)
            .instrument(span)
            .await;

        self.record_outcome(&run_id, &outcome).await;
        self.notify(&run_id, &outcome).await;
        outcome
    }

    async fn execute(
        &self,
        run_id: &str,
        selection: Option<&dyn SelectionCollaborator>,
        status: &Arc<dyn StatusSink>,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        if let Err(e) = db::runs::create(&self.conn, run_id.to_string()).await {
            warn!(error = %e, "failed to open run log entry");
        }

        if self.config.folders.is_empty() {
            status.status("No backup folders configured. Aborting backup.");
            return RunOutcome::Skipped(SkipReason::NoFolders);
        }

        if !(self.connectivity.is_wifi_connected() || self.connectivity.is_tethering_active()) {
            status.status("Not connected to Wi-Fi or hotspot. Skipping backup.");
            return RunOutcome::Skipped(SkipReason::NoConnectivity);
        }

        // Fast path: a validated cached device skips the scan entirely.
        match self.registry.recall().await {
            Ok(Some(device)) => {
                let probe_timeout = Duration::from_millis(self.config.scan.probe_timeout_ms);
                if self
                    .registry
                    .validate(&device, self.resolver.as_ref(), probe_timeout)
                    .await
                {
                    status.status(&format!("Using last chosen device {}", device.address));
                    return self.upload_to(device, status, cancel).await;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to read cached device"),
        }

        status.status("Scanning subnet for devices...");
        let observer: Arc<dyn ScanObserver> = Arc::new(SinkScanObserver {
            sink: Arc::clone(status),
        });
        let snapshot = self.scanner.scan(Some(observer), cancel).await;

        let trusted = match self.registry.classify(&snapshot.devices).await {
            Ok(trusted) => trusted,
            Err(e) => return RunOutcome::Failed(e),
        };

        if let [device] = trusted.as_slice() {
            let device = device.clone();
            if let Err(e) = self.registry.remember(&device).await {
                warn!(error = %e, "failed to cache chosen device");
            }
            return self.upload_to(device, status, cancel).await;
        }

        let Some(selection) = selection else {
            status.status("Multiple or no whitelisted devices and no selector; skipping backup.");
            return RunOutcome::Skipped(SkipReason::NoSelection);
        };

        match selection.choose(&snapshot.devices).await {
            Some(chosen) => {
                if let Err(e) = self.registry.approve(&chosen.hardware_id).await {
                    return RunOutcome::Failed(e);
                }
                if let Err(e) = self.registry.remember(&chosen).await {
                    warn!(error = %e, "failed to cache chosen device");
                }
                self.upload_to(chosen, status, cancel).await
            }
            None => {
                status.status("Backup canceled: no device selected.");
                RunOutcome::Skipped(SkipReason::NoSelection)
            }
        }
    }

    async fn upload_to(
        &self,
        target: Device,
        status: &Arc<dyn StatusSink>,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        status.status(&format!("Starting backup to {}...", target.address));

        let files = match self.selector.select_candidates(&self.config.folders).await {
            Ok(files) => files,
            Err(e) => {
                status.status(&format!("Backup failed: {e}"));
                return RunOutcome::Failed(e.into());
            }
        };

        if files.is_empty() {
            status.status("No new or changed files to back up.");
            return RunOutcome::Completed {
                summary: UploadSummary::default(),
                target,
            };
        }

        match self
            .executor
            .upload_batch(&target, &files, status.as_ref(), cancel)
            .await
        {
            Ok(summary) => {
                status.status(&format!(
                    "Backup complete to {} ({}/{} files uploaded)",
                    target.address, summary.uploaded, summary.total
                ));
                RunOutcome::Completed { summary, target }
            }
            Err(e) => {
                status.status(&format!("Backup failed: {e}"));
                RunOutcome::Failed(e)
            }
        }
    }

    async fn record_outcome(&self, run_id: &str, outcome: &RunOutcome) {
        let (label, uploaded, total, target) = match outcome {
            RunOutcome::Completed { summary, target } => (
                "completed".to_string(),
                Some(summary.uploaded as u64),
                Some(summary.total as u64),
                Some(target.address.to_string()),
            ),
            RunOutcome::Skipped(reason) => {
                (format!("skipped:{}", reason.as_str()), None, None, None)
            }
            RunOutcome::Failed(_) => ("failed".to_string(), None, None, None),
        };

        if let Err(e) =
            db::runs::finish(&self.conn, run_id.to_string(), label, uploaded, total, target).await
        {
            warn!(error = %e, "failed to close run log entry");
        }
    }

    async fn notify(&self, run_id: &str, outcome: &RunOutcome) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        let event = match outcome {
            RunOutcome::Completed { summary, target } => RunEvent::Completed {
                run_id: run_id.to_string(),
                uploaded: summary.uploaded,
                total: summary.total,
                target_address: target.address.to_string(),
            },
            RunOutcome::Failed(e) => RunEvent::Failed {
                run_id: run_id.to_string(),
                error: e.to_string(),
            },
            RunOutcome::Skipped(_) => return,
        };

        if let Err(e) = notifier.notify(event).await {
            warn!(error = %e, "result notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_admits_one_holder_at_a_time() {
        let guard = RunGuard::new();

        let token = guard.try_acquire().expect("first acquire succeeds");
        assert!(guard.try_acquire().is_none(), "second acquire is refused");

        drop(token);
        assert!(guard.try_acquire().is_some(), "released guard is reusable");
    }
}
