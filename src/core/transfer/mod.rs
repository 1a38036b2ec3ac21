//! The "upload one file to one endpoint" boundary.
//!
//! Everything wire-level — authentication handshake, share mount, byte
//! streaming — lives behind [`TransferClient`]. The core only inspects the
//! outcome.

mod simulated;
mod smb_process;

pub use simulated::SimulatedClient;
pub use smb_process::SmbProcessClient;

use std::net::Ipv4Addr;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("failed to spawn transfer process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("transfer rejected by peer: {0}")]
    Rejected(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Deliver one local file to the endpoint under `remote_name`.
    /// Synchronous from the caller's point of view: resolves only once the
    /// transfer has fully succeeded or failed.
    async fn upload(
        &self,
        address: Ipv4Addr,
        remote_name: &str,
        source: &Path,
    ) -> Result<(), TransferError>;
}
