use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{TransferClient, TransferError};

/// Scriptable transfer client for tests and `--simulation` runs.
///
/// Fails the first `fail_first` attempts for every file, then succeeds, and
/// records attempt counts and delivered names for assertions.
pub struct SimulatedClient {
    fail_first: u32,
    attempts: Mutex<HashMap<String, u32>>,
    uploaded: Mutex<Vec<String>>,
}

impl SimulatedClient {
    pub fn new() -> Self {
        Self::failing_first(0)
    }

    pub fn failing_first(fail_first: u32) -> Self {
        Self {
            fail_first,
            attempts: Mutex::new(HashMap::new()),
            uploaded: Mutex::new(Vec::new()),
        }
    }

    /// Client that never succeeds.
    pub fn always_failing() -> Self {
        Self::failing_first(u32::MAX)
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }

    pub fn attempt_count(&self, remote_name: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(remote_name)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for SimulatedClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransferClient for SimulatedClient {
    async fn upload(
        &self,
        _address: Ipv4Addr,
        remote_name: &str,
        source: &Path,
    ) -> Result<(), TransferError> {
        // Read the source like a real client would stream it.
        tokio::fs::read(source).await?;

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let entry = attempts.entry(remote_name.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        if attempt <= self.fail_first {
            return Err(TransferError::Rejected("simulated failure".into()));
        }

        self.uploaded.lock().unwrap().push(remote_name.to_string());
        Ok(())
    }
}
