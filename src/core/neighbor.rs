//! Reachability probing and hardware-address resolution.
//!
//! The scan logic only depends on the [`NeighborResolver`] trait; the system
//! implementation probes with ICMP echo and reads the kernel neighbor table.
//! Keeping the substrate behind the trait lets tests substitute a scripted
//! resolver and leaves room for a native netlink lookup later.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::trace;

use crate::core::models::HardwareId;

const NEIGHBOR_TABLE_PATH: &str = "/proc/net/arp";

#[async_trait]
pub trait NeighborResolver: Send + Sync {
    /// Liveness probe bounded by `timeout`. Probe failure and "host absent"
    /// are indistinguishable; both report false.
    async fn reachable(&self, address: Ipv4Addr, timeout: Duration) -> bool;

    /// Hardware id currently registered for `address` in the neighbor table,
    /// or `None` if the address has no resident entry. An entry can expire
    /// between a successful probe and this lookup; callers treat that as
    /// "not discovered".
    async fn resolve(&self, address: Ipv4Addr) -> Option<HardwareId>;
}

/// Resolver backed by ICMP echo and the kernel's line-oriented neighbor
/// table. The table is read fresh on every resolution call.
pub struct SystemNeighborResolver {
    table_path: PathBuf,
    mac_pattern: Regex,
}

impl SystemNeighborResolver {
    pub fn new() -> Self {
        Self::with_table_path(PathBuf::from(NEIGHBOR_TABLE_PATH))
    }

    /// Read the neighbor table from a non-default location.
    pub fn with_table_path(table_path: PathBuf) -> Self {
        Self {
            table_path,
            mac_pattern: Regex::new(r"^[0-9a-fA-F]{2}(:[0-9a-fA-F]{2}){5}$").unwrap(),
        }
    }

    /// Expected columns: address, hardware type, flags, hardware id, mask,
    /// device. Matches on address equality plus a well-formed hardware id.
    fn parse_entry(&self, table: &str, address: Ipv4Addr) -> Option<HardwareId> {
        let needle = address.to_string();
        for line in table.lines().skip(1) {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 4 && parts[0] == needle && self.mac_pattern.is_match(parts[3]) {
                return Some(HardwareId::new(parts[3]));
            }
        }
        None
    }
}

impl Default for SystemNeighborResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NeighborResolver for SystemNeighborResolver {
    async fn reachable(&self, address: Ipv4Addr, timeout: Duration) -> bool {
        let payload = [0u8; 56];
        match tokio::time::timeout(timeout, surge_ping::ping(address.into(), &payload)).await {
            Ok(Ok((_packet, rtt))) => {
                trace!(%address, rtt_ms = rtt.as_millis() as u64, "echo reply");
                true
            }
            Ok(Err(_)) | Err(_) => false,
        }
    }

    async fn resolve(&self, address: Ipv4Addr) -> Option<HardwareId> {
        let table = tokio::fs::read_to_string(&self.table_path).await.ok()?;
        self.parse_entry(&table, address)
    }
}
