//! Trust and selection state for discovered devices.
//!
//! Two pieces of durable state: the whitelist of approved hardware ids, and
//! the single-slot last-chosen-device cache that lets repeated backups skip
//! the subnet scan. The cache is advisory — DHCP can hand its address to a
//! different host, so [`DeviceRegistry::validate`] re-checks reachability and
//! identity before the device is reused.

use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::Result;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::core::models::{Device, HardwareId};
use crate::core::neighbor::NeighborResolver;
use crate::db;

pub struct DeviceRegistry {
    conn: Connection,
}

impl DeviceRegistry {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Case-insensitive membership test; ids are normalized on both write
    /// and query.
    pub async fn is_whitelisted(&self, hardware_id: &HardwareId) -> Result<bool> {
        db::registry::whitelist_contains(&self.conn, hardware_id.as_str().to_string()).await
    }

    /// Idempotent whitelist add.
    pub async fn approve(&self, hardware_id: &HardwareId) -> Result<()> {
        db::registry::whitelist_add(&self.conn, hardware_id.as_str().to_string()).await
    }

    /// Filter a discovered set down to the whitelisted devices.
    pub async fn classify(&self, devices: &[Device]) -> Result<Vec<Device>> {
        let whitelist = db::registry::whitelist_all(&self.conn).await?;
        Ok(devices
            .iter()
            .filter(|device| {
                whitelist
                    .iter()
                    .any(|approved| approved == device.hardware_id.as_str())
            })
            .cloned()
            .collect())
    }

    /// Store the device as the last chosen target. Single slot,
    /// last-write-wins.
    pub async fn remember(&self, device: &Device) -> Result<()> {
        db::registry::last_device_set(
            &self.conn,
            device.address.to_string(),
            device.hardware_id.as_str().to_string(),
        )
        .await
    }

    pub async fn recall(&self) -> Result<Option<Device>> {
        let Some((address, hardware_id)) = db::registry::last_device_get(&self.conn).await? else {
            return Ok(None);
        };
        let Ok(address) = address.parse::<Ipv4Addr>() else {
            debug!(address, "discarding unparseable cached device address");
            return Ok(None);
        };
        Ok(Some(Device {
            address,
            hardware_id: HardwareId::new(&hardware_id),
        }))
    }

    /// A recalled device is usable only if it still answers at its cached
    /// address AND the hardware id resolved there matches. Detects address
    /// reassignment and keeps the backup off the wrong machine.
    pub async fn validate(
        &self,
        device: &Device,
        resolver: &dyn NeighborResolver,
        probe_timeout: Duration,
    ) -> bool {
        if !resolver.reachable(device.address, probe_timeout).await {
            return false;
        }
        match resolver.resolve(device.address).await {
            Some(current) => current == device.hardware_id,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedResolver {
        reachable: bool,
        resolves_to: Option<HardwareId>,
    }

    #[async_trait]
    impl NeighborResolver for FixedResolver {
        async fn reachable(&self, _address: Ipv4Addr, _timeout: Duration) -> bool {
            self.reachable
        }

        async fn resolve(&self, _address: Ipv4Addr) -> Option<HardwareId> {
            self.resolves_to.clone()
        }
    }

    fn device(address: [u8; 4], mac: &str) -> Device {
        Device {
            address: Ipv4Addr::new(address[0], address[1], address[2], address[3]),
            hardware_id: HardwareId::new(mac),
        }
    }

    async fn registry() -> DeviceRegistry {
        DeviceRegistry::new(db::init_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn whitelist_is_case_insensitive() {
        let registry = registry().await;

        registry
            .approve(&HardwareId::new("aa:bb:cc:dd:ee:ff"))
            .await
            .unwrap();

        assert!(registry
            .is_whitelisted(&HardwareId::new("AA:BB:CC:DD:EE:FF"))
            .await
            .unwrap());
        assert!(registry
            .is_whitelisted(&HardwareId::new("aa:bb:cc:dd:ee:ff"))
            .await
            .unwrap());
        assert!(!registry
            .is_whitelisted(&HardwareId::new("11:22:33:44:55:66"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn approve_is_idempotent() {
        let registry = registry().await;
        let id = HardwareId::new("aa:bb:cc:dd:ee:ff");

        registry.approve(&id).await.unwrap();
        registry.approve(&id).await.unwrap();
        assert!(registry.is_whitelisted(&id).await.unwrap());
    }

    #[tokio::test]
    async fn classify_filters_to_whitelist() {
        let registry = registry().await;
        registry
            .approve(&HardwareId::new("aa:aa:aa:aa:aa:aa"))
            .await
            .unwrap();

        let discovered = vec![
            device([10, 0, 0, 5], "AA:AA:AA:AA:AA:AA"),
            device([10, 0, 0, 6], "bb:bb:bb:bb:bb:bb"),
        ];
        let trusted = registry.classify(&discovered).await.unwrap();
        assert_eq!(trusted.len(), 1);
        assert_eq!(trusted[0].hardware_id.as_str(), "AA:AA:AA:AA:AA:AA");
    }

    #[tokio::test]
    async fn remember_recall_roundtrip_last_write_wins() {
        let registry = registry().await;

        registry
            .remember(&device([10, 0, 0, 5], "aa:aa:aa:aa:aa:aa"))
            .await
            .unwrap();
        registry
            .remember(&device([10, 0, 0, 6], "bb:bb:bb:bb:bb:bb"))
            .await
            .unwrap();

        let recalled = registry.recall().await.unwrap().unwrap();
        assert_eq!(recalled.address, Ipv4Addr::new(10, 0, 0, 6));
        assert_eq!(recalled.hardware_id.as_str(), "BB:BB:BB:BB:BB:BB");
    }

    #[tokio::test]
    async fn recall_empty_slot_is_none() {
        let registry = registry().await;
        assert!(registry.recall().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn validate_rejects_reassigned_address() {
        let registry = registry().await;
        let cached = device([10, 0, 0, 5], "aa:aa:aa:aa:aa:aa");

        // Address is alive but now owned by a different machine.
        let resolver = FixedResolver {
            reachable: true,
            resolves_to: Some(HardwareId::new("bb:bb:bb:bb:bb:bb")),
        };
        assert!(!registry.validate(&cached, &resolver, Duration::from_millis(1)).await);

        let resolver = FixedResolver {
            reachable: true,
            resolves_to: Some(HardwareId::new("AA:AA:AA:AA:AA:AA")),
        };
        assert!(registry.validate(&cached, &resolver, Duration::from_millis(1)).await);

        let resolver = FixedResolver {
            reachable: false,
            resolves_to: Some(HardwareId::new("aa:aa:aa:aa:aa:aa")),
        };
        assert!(!registry.validate(&cached, &resolver, Duration::from_millis(1)).await);
    }
}
