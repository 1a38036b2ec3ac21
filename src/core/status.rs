//! Run status and scan progress reporting.
//!
//! Both traits are purely observational: implementations must not block and
//! must not influence the run. The orchestrator reports every terminal state
//! through the status sink so a caller can distinguish "nothing to do" from
//! "tried and partially failed" from "tried and failed completely".

use std::net::Ipv4Addr;

use tracing::info;

/// Receives human-readable status lines during a run.
pub trait StatusSink: Send + Sync {
    fn status(&self, message: &str);

    /// Optional per-address scan progress. Default implementation drops it.
    fn scan_progress(&self, _address: Ipv4Addr, _completed: usize, _total: usize) {}
}

/// Observes individual probe completions during a subnet scan.
pub trait ScanObserver: Send + Sync {
    fn probed(&self, address: Ipv4Addr, completed: usize, total: usize);
}

/// Default sink that forwards status lines to the tracing subscriber.
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn status(&self, message: &str) {
        info!("{message}");
    }
}
