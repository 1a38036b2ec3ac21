//! Concurrent subnet discovery.
//!
//! Enumerates the host suffixes of the local /24 prefix, probes them through
//! a bounded worker pool, and resolves the hardware id of every responsive
//! address. The scan never fails as a whole: unreachable hosts and entries
//! that drop out of the neighbor table between probe and lookup are silently
//! absent from the snapshot.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::core::models::{Device, DiscoverySnapshot};
use crate::core::neighbor::NeighborResolver;
use crate::core::status::ScanObserver;

/// Host suffixes probed within the /24 prefix. .0, .1 and .255 are left out
/// as network, gateway and broadcast by convention.
const FIRST_HOST_SUFFIX: u8 = 2;
const LAST_HOST_SUFFIX: u8 = 254;

/// Prefix used when the local interface address cannot be determined, the
/// usual tethering subnet. Degraded but non-fatal.
const FALLBACK_PREFIX: [u8; 3] = [192, 168, 43];

struct CachedScan {
    snapshot: DiscoverySnapshot,
    completed_at: Instant,
}

pub struct SubnetScanner {
    resolver: Arc<dyn NeighborResolver>,
    probe_timeout: Duration,
    worker_width: usize,
    cache_validity: Duration,
    prefix_override: Option<[u8; 3]>,
    cache: Mutex<Option<CachedScan>>,
}

impl SubnetScanner {
    pub fn new(resolver: Arc<dyn NeighborResolver>, config: &ScanConfig) -> Self {
        let prefix_override = config
            .subnet_prefix
            .as_deref()
            .and_then(|raw| {
                let parsed = parse_prefix(raw);
                if parsed.is_none() {
                    warn!(prefix = raw, "ignoring unparseable subnet prefix override");
                }
                parsed
            });

        Self {
            resolver,
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            worker_width: config.worker_width,
            cache_validity: Duration::from_secs(config.cache_validity_secs),
            prefix_override,
            cache: Mutex::new(None),
        }
    }

    /// Probe the subnet and assemble a deduplicated snapshot.
    ///
    /// A scan started within the validity window of the previous scan's
    /// completion returns that snapshot unchanged, without new probes. The
    /// cache lock is held across the probe phase, so concurrent callers get
    /// the fresh result instead of racing a second sweep.
    ///
    /// Cancellation stops further probes; a cancelled scan returns the
    /// partial snapshot but does not cache it.
    pub async fn scan(
        &self,
        observer: Option<Arc<dyn ScanObserver>>,
        cancel: &CancellationToken,
    ) -> DiscoverySnapshot {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.completed_at.elapsed() < self.cache_validity {
                info!("using cached scan results");
                return cached.snapshot.clone();
            }
        }

        let prefix = self.detect_prefix();
        let total = usize::from(LAST_HOST_SUFFIX - FIRST_HOST_SUFFIX) + 1;
        debug!(
            prefix = %format!("{}.{}.{}.", prefix[0], prefix[1], prefix[2]),
            total, "starting subnet scan"
        );

        let semaphore = Arc::new(Semaphore::new(self.worker_width));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut workers: JoinSet<Option<Device>> = JoinSet::new();
        let mut cancelled = false;

        for suffix in FIRST_HOST_SUFFIX..=LAST_HOST_SUFFIX {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let address = Ipv4Addr::new(prefix[0], prefix[1], prefix[2], suffix);
            let resolver = Arc::clone(&self.resolver);
            let semaphore = Arc::clone(&semaphore);
            let completed = Arc::clone(&completed);
            let observer = observer.clone();
            let probe_timeout = self.probe_timeout;

            workers.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;

                let mut found = None;
                if resolver.reachable(address, probe_timeout).await {
                    if let Some(hardware_id) = resolver.resolve(address).await {
                        debug!(%address, %hardware_id, "found device");
                        found = Some(Device {
                            address,
                            hardware_id,
                        });
                    }
                }

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(observer) = observer {
                    observer.probed(address, done, total);
                }
                found
            });
        }

        let mut devices: Vec<Device> = Vec::new();
        while let Some(result) = workers.join_next().await {
            if let Ok(Some(device)) = result {
                // Device equality is by hardware id, so this also collapses
                // one machine answering on two addresses.
                if !devices.contains(&device) {
                    devices.push(device);
                }
            }
        }

        let snapshot = DiscoverySnapshot {
            devices,
            captured_at: Utc::now(),
        };
        info!(devices = snapshot.devices.len(), "subnet scan complete");

        if cancelled {
            debug!("scan cancelled, keeping partial snapshot out of the cache");
        } else {
            *cache = Some(CachedScan {
                snapshot: snapshot.clone(),
                completed_at: Instant::now(),
            });
        }
        snapshot
    }

    /// Drop the cached snapshot so the next scan probes fresh. Nothing calls
    /// this automatically; it exists for callers that detect a network
    /// change.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
    }

    fn detect_prefix(&self) -> [u8; 3] {
        if let Some(prefix) = self.prefix_override {
            return prefix;
        }
        match local_ipv4() {
            Some(ip) => {
                let octets = ip.octets();
                [octets[0], octets[1], octets[2]]
            }
            None => {
                warn!("could not determine local address, falling back to default prefix");
                FALLBACK_PREFIX
            }
        }
    }
}

/// Local interface address via the routing table: connecting a UDP socket
/// picks the outbound interface without sending a datagram.
fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:53").ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(_) => None,
    }
}

fn parse_prefix(raw: &str) -> Option<[u8; 3]> {
    let mut octets = raw.trim().trim_end_matches('.').split('.');
    let a = octets.next()?.parse().ok()?;
    let b = octets.next()?.parse().ok()?;
    let c = octets.next()?.parse().ok()?;
    if octets.next().is_some() {
        return None;
    }
    Some([a, b, c])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::HardwareId;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// Scripted resolver that records every probed address.
    struct ScriptedResolver {
        probed: StdMutex<Vec<Ipv4Addr>>,
        hosts: HashMap<Ipv4Addr, HardwareId>,
    }

    impl ScriptedResolver {
        fn new(hosts: Vec<(Ipv4Addr, &str)>) -> Self {
            Self {
                probed: StdMutex::new(Vec::new()),
                hosts: hosts
                    .into_iter()
                    .map(|(ip, mac)| (ip, HardwareId::new(mac)))
                    .collect(),
            }
        }

        fn probed(&self) -> Vec<Ipv4Addr> {
            self.probed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NeighborResolver for ScriptedResolver {
        async fn reachable(&self, address: Ipv4Addr, _timeout: Duration) -> bool {
            self.probed.lock().unwrap().push(address);
            self.hosts.contains_key(&address)
        }

        async fn resolve(&self, address: Ipv4Addr) -> Option<HardwareId> {
            self.hosts.get(&address).cloned()
        }
    }

    fn scan_config(cache_validity_secs: u64) -> ScanConfig {
        ScanConfig {
            subnet_prefix: Some("10.0.0.".into()),
            probe_timeout_ms: 1,
            worker_width: 20,
            cache_validity_secs,
        }
    }

    #[tokio::test]
    async fn probes_exactly_the_host_range() {
        let resolver = Arc::new(ScriptedResolver::new(vec![]));
        let scanner = SubnetScanner::new(resolver.clone(), &scan_config(300));

        scanner.scan(None, &CancellationToken::new()).await;

        let mut probed = resolver.probed();
        probed.sort();
        probed.dedup();
        assert_eq!(probed.len(), 253, "each suffix probed exactly once");
        assert_eq!(resolver.probed().len(), 253);
        for address in &probed {
            let suffix = address.octets()[3];
            assert!((2..=254).contains(&suffix), "unexpected suffix {suffix}");
        }
    }

    #[tokio::test]
    async fn discovers_and_dedups_devices() {
        let resolver = Arc::new(ScriptedResolver::new(vec![
            (Ipv4Addr::new(10, 0, 0, 5), "aa:aa:aa:aa:aa:aa"),
            // Same machine answering on a second lease.
            (Ipv4Addr::new(10, 0, 0, 9), "aa:aa:aa:aa:aa:aa"),
            (Ipv4Addr::new(10, 0, 0, 7), "bb:bb:bb:bb:bb:bb"),
        ]));
        let scanner = SubnetScanner::new(resolver, &scan_config(300));

        let snapshot = scanner.scan(None, &CancellationToken::new()).await;
        assert_eq!(snapshot.devices.len(), 2);
    }

    #[tokio::test]
    async fn second_scan_within_window_reuses_snapshot() {
        let resolver = Arc::new(ScriptedResolver::new(vec![(
            Ipv4Addr::new(10, 0, 0, 5),
            "aa:aa:aa:aa:aa:aa",
        )]));
        let scanner = SubnetScanner::new(resolver.clone(), &scan_config(300));
        let cancel = CancellationToken::new();

        let first = scanner.scan(None, &cancel).await;
        let probes_after_first = resolver.probed().len();
        let second = scanner.scan(None, &cancel).await;

        assert_eq!(resolver.probed().len(), probes_after_first, "no new probes");
        assert_eq!(first.devices, second.devices);
        assert_eq!(first.captured_at, second.captured_at);
    }

    #[tokio::test]
    async fn expired_window_probes_fresh() {
        let resolver = Arc::new(ScriptedResolver::new(vec![]));
        let scanner = SubnetScanner::new(resolver.clone(), &scan_config(0));
        let cancel = CancellationToken::new();

        scanner.scan(None, &cancel).await;
        scanner.scan(None, &cancel).await;
        assert_eq!(resolver.probed().len(), 506);
    }

    #[tokio::test]
    async fn invalidate_forces_fresh_probes() {
        let resolver = Arc::new(ScriptedResolver::new(vec![]));
        let scanner = SubnetScanner::new(resolver.clone(), &scan_config(300));
        let cancel = CancellationToken::new();

        scanner.scan(None, &cancel).await;
        scanner.invalidate().await;
        scanner.scan(None, &cancel).await;
        assert_eq!(resolver.probed().len(), 506);
    }

    #[tokio::test]
    async fn observer_sees_every_probe() {
        struct Counting(AtomicUsize);
        impl ScanObserver for Counting {
            fn probed(&self, _address: Ipv4Addr, _completed: usize, total: usize) {
                assert_eq!(total, 253);
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let resolver = Arc::new(ScriptedResolver::new(vec![]));
        let scanner = SubnetScanner::new(resolver, &scan_config(300));
        let observer = Arc::new(Counting(AtomicUsize::new(0)));

        scanner
            .scan(Some(observer.clone() as Arc<dyn ScanObserver>), &CancellationToken::new())
            .await;
        assert_eq!(observer.0.load(Ordering::Relaxed), 253);
    }

    #[tokio::test]
    async fn cancelled_scan_is_not_cached() {
        let resolver = Arc::new(ScriptedResolver::new(vec![]));
        let scanner = SubnetScanner::new(resolver.clone(), &scan_config(300));

        let cancel = CancellationToken::new();
        cancel.cancel();
        scanner.scan(None, &cancel).await;
        assert_eq!(resolver.probed().len(), 0);

        // A later un-cancelled scan must probe; nothing was cached.
        scanner.scan(None, &CancellationToken::new()).await;
        assert_eq!(resolver.probed().len(), 253);
    }

    #[test]
    fn prefix_parsing() {
        assert_eq!(parse_prefix("192.168.1."), Some([192, 168, 1]));
        assert_eq!(parse_prefix("10.0.0"), Some([10, 0, 0]));
        assert_eq!(parse_prefix("10.0"), None);
        assert_eq!(parse_prefix("10.0.0.1"), None);
        assert_eq!(parse_prefix("not.a.prefix"), None);
    }
}
