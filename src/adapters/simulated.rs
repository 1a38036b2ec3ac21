use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::connectivity::ConnectivityProbe;

/// Connectivity probe with externally settable state, for tests and
/// simulation runs.
#[derive(Clone)]
pub struct SimulatedConnectivity {
    wifi: Arc<AtomicBool>,
    tethering: Arc<AtomicBool>,
}

impl SimulatedConnectivity {
    pub fn new(wifi: bool, tethering: bool) -> Self {
        Self {
            wifi: Arc::new(AtomicBool::new(wifi)),
            tethering: Arc::new(AtomicBool::new(tethering)),
        }
    }

    pub fn set_wifi(&self, connected: bool) {
        self.wifi.store(connected, Ordering::Relaxed);
    }

    pub fn set_tethering(&self, active: bool) {
        self.tethering.store(active, Ordering::Relaxed);
    }
}

impl ConnectivityProbe for SimulatedConnectivity {
    fn is_wifi_connected(&self) -> bool {
        self.wifi.load(Ordering::Relaxed)
    }

    fn is_tethering_active(&self) -> bool {
        self.tethering.load(Ordering::Relaxed)
    }
}
