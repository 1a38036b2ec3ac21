use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Link-layer (MAC) address used as the durable device identity.
///
/// Addresses on the LAN come and go with DHCP leases; the hardware id is the
/// only identity that survives a reassignment. Normalized to uppercase on
/// construction so lookups are case-insensitive everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HardwareId(String);

impl HardwareId {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A peer discovered on the local subnet.
///
/// Equality is by hardware id, not address: two sightings of the same machine
/// under different DHCP leases are the same device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub address: Ipv4Addr,
    pub hardware_id: HardwareId,
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.hardware_id == other.hardware_id
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hardware_id.hash(state);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.address, self.hardware_id)
    }
}

/// Immutable result of one discovery scan, replaced atomically at scan end.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoverySnapshot {
    pub devices: Vec<Device>,
    pub captured_at: DateTime<Utc>,
}

/// One configured backup source: a folder and an optional extension filter.
/// An empty filter admits every file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupFolder {
    pub path: PathBuf,
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl BackupFolder {
    /// Case-insensitive extension match against the folder's filter.
    pub fn matches(&self, file_name: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let name = file_name.to_lowercase();
        self.extensions
            .iter()
            .any(|ext| name.ends_with(&format!(".{}", ext.to_lowercase())))
    }
}

/// A file picked for upload, with its precomputed history key.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: String,
    pub modified_ms: i64,
    pub history_key: String,
}

/// Derive the upload-history key for one file version.
///
/// The key covers folder identity, file name, and modification time, so an
/// unchanged file is suppressed on later runs while a touched file gets a new
/// key and is picked up again.
pub fn history_key(folder: &Path, file_name: &str, modified_ms: i64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(folder.as_os_str().as_encoded_bytes());
    hasher.update(b"|");
    hasher.update(file_name.as_bytes());
    hasher.update(b"|");
    hasher.update(&modified_ms.to_le_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Aggregate counts from one upload batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub total: usize,
}

/// Why a run ended without attempting any upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another run holds the process-wide guard.
    AlreadyRunning,
    /// No backup folders are configured; no network activity occurs.
    NoFolders,
    /// Neither Wi-Fi nor tethering is active.
    NoConnectivity,
    /// Zero or multiple whitelisted candidates and no device was chosen.
    NoSelection,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyRunning => "already-running",
            Self::NoFolders => "no-folders",
            Self::NoConnectivity => "no-connectivity",
            Self::NoSelection => "no-selection",
        }
    }
}

/// Terminal state of one backup run.
#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        summary: UploadSummary,
        target: Device,
    },
    Skipped(SkipReason),
    Failed(anyhow::Error),
}
