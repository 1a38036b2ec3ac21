use crate::core::connectivity::ConnectivityProbe;

#[cfg(target_os = "linux")]
mod linux;
mod simulated;

pub use simulated::SimulatedConnectivity;

pub fn get_probe(simulation: bool) -> Box<dyn ConnectivityProbe> {
    if simulation {
        return Box::new(SimulatedConnectivity::new(true, false));
    }

    #[cfg(target_os = "linux")]
    {
        return Box::new(linux::LinuxConnectivity::new());
    }

    #[cfg(not(target_os = "linux"))]
    {
        return Box::new(SimulatedConnectivity::new(true, false));
    }
}
