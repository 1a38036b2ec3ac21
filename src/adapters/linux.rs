use std::path::PathBuf;

use crate::core::connectivity::ConnectivityProbe;

const NET_CLASS_PATH: &str = "/sys/class/net";

/// Interface names commonly used for a hosted access point.
const TETHER_INTERFACES: &[&str] = &["ap0", "uap0", "softap0"];

/// Connectivity probe backed by the sysfs network class tree.
pub struct LinuxConnectivity {
    net_class: PathBuf,
}

impl LinuxConnectivity {
    pub fn new() -> Self {
        Self {
            net_class: PathBuf::from(NET_CLASS_PATH),
        }
    }

    #[cfg(test)]
    fn with_root(net_class: PathBuf) -> Self {
        Self { net_class }
    }

    fn interface_is_up(&self, name: &str) -> bool {
        let operstate = self.net_class.join(name).join("operstate");
        matches!(std::fs::read_to_string(operstate), Ok(state) if state.trim() == "up")
    }

    fn interfaces(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.net_class) else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect()
    }
}

impl Default for LinuxConnectivity {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityProbe for LinuxConnectivity {
    fn is_wifi_connected(&self) -> bool {
        self.interfaces().iter().any(|name| {
            self.net_class.join(name).join("wireless").is_dir() && self.interface_is_up(name)
        })
    }

    fn is_tethering_active(&self) -> bool {
        self.interfaces()
            .iter()
            .any(|name| TETHER_INTERFACES.contains(&name.as_str()) && self.interface_is_up(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn fake_interface(root: &std::path::Path, name: &str, operstate: &str, wireless: bool) {
        let iface = root.join(name);
        fs::create_dir_all(&iface).unwrap();
        fs::write(iface.join("operstate"), operstate).unwrap();
        if wireless {
            fs::create_dir(iface.join("wireless")).unwrap();
        }
    }

    #[test]
    fn wifi_requires_wireless_interface_up() {
        let root = tempdir().unwrap();
        fake_interface(root.path(), "eth0", "up", false);
        fake_interface(root.path(), "wlan0", "down", true);

        let probe = LinuxConnectivity::with_root(root.path().to_path_buf());
        assert!(!probe.is_wifi_connected());

        fs::write(root.path().join("wlan0/operstate"), "up").unwrap();
        assert!(probe.is_wifi_connected());
    }

    #[test]
    fn tethering_matches_known_ap_interfaces() {
        let root = tempdir().unwrap();
        fake_interface(root.path(), "wlan0", "up", true);

        let probe = LinuxConnectivity::with_root(root.path().to_path_buf());
        assert!(!probe.is_tethering_active());

        fake_interface(root.path(), "ap0", "up", true);
        assert!(probe.is_tethering_active());
    }

    #[test]
    fn missing_sysfs_tree_reports_offline() {
        let probe = LinuxConnectivity::with_root(PathBuf::from("/nonexistent/sysfs"));
        assert!(!probe.is_wifi_connected());
        assert!(!probe.is_tethering_active());
    }
}
