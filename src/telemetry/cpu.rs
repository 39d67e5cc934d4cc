use crate::model::round2;
use std::time::Instant;
use sysinfo::{Components, System, MINIMUM_CPU_UPDATE_INTERVAL};

/// Sensor labels tried first when looking for a CPU package temperature.
const PREFERRED_SENSORS: [&str; 3] = ["coretemp", "cpu-thermal", "k10temp"];

/// CPU utilization and temperature
pub struct CpuMonitor {
    system: System,
    components: Components,
    last_refresh: Instant,
}

impl CpuMonitor {
    pub fn new() -> Self {
        let mut system = System::new();
        // Usage is a delta between two refreshes; prime the first one here.
        system.refresh_cpu();
        Self {
            system,
            components: Components::new_with_refreshed_list(),
            last_refresh: Instant::now(),
        }
    }

    /// Mean utilization across logical cores since the previous call.
    ///
    /// Blocks until at least `MINIMUM_CPU_UPDATE_INTERVAL` has passed since
    /// the last refresh; a shorter gap reads as 0%.
    pub fn utilization(&mut self) -> Option<f64> {
        let since = self.last_refresh.elapsed();
        if since < MINIMUM_CPU_UPDATE_INTERVAL {
            std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL - since);
        }
        self.system.refresh_cpu();
        self.last_refresh = Instant::now();

        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return None;
        }
        let total: f32 = cpus.iter().map(|cpu| cpu.cpu_usage()).sum();
        let avg = f64::from(total) / cpus.len() as f64;
        avg.is_finite().then(|| round2(avg.clamp(0.0, 100.0)))
    }

    pub fn temperature(&mut self) -> Option<f64> {
        self.components.refresh();

        let readings: Vec<(String, f32)> = self
            .components
            .iter()
            .map(|c| (c.label().to_lowercase(), c.temperature()))
            .collect();
        pick_temperature(&readings)
    }

    pub fn logical_threads(&self) -> usize {
        self.system.cpus().len()
    }

    pub fn brand(&self) -> Option<String> {
        self.system
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
    }
}

impl Default for CpuMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Choose a CPU temperature from `(label, celsius)` readings: a known CPU
/// sensor if present, otherwise the first usable reading.
fn pick_temperature(readings: &[(String, f32)]) -> Option<f64> {
    let usable = |t: f32| t.is_finite() && t > 0.0;

    let preferred = PREFERRED_SENSORS.iter().find_map(|key| {
        readings
            .iter()
            .find(|(label, t)| label.contains(key) && usable(*t))
            .map(|(_, t)| *t)
    });

    preferred
        .or_else(|| readings.iter().map(|(_, t)| *t).find(|t| usable(*t)))
        .map(|t| round2(f64::from(t)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(label: &str, t: f32) -> (String, f32) {
        (label.to_string(), t)
    }

    #[test]
    fn prefers_known_cpu_sensor() {
        let readings = vec![
            reading("acpitz temp1", 30.0),
            reading("k10temp tctl", 61.25),
            reading("nvme composite", 40.0),
        ];
        assert_eq!(pick_temperature(&readings), Some(61.25));
    }

    #[test]
    fn falls_back_to_first_usable_sensor() {
        let readings = vec![reading("acpitz temp1", f32::NAN), reading("nvme composite", 42.0)];
        assert_eq!(pick_temperature(&readings), Some(42.0));
    }

    #[test]
    fn no_sensors_means_no_temperature() {
        assert_eq!(pick_temperature(&[]), None);
    }

    #[test]
    fn first_reading_waits_for_a_measurable_interval() {
        let mut monitor = CpuMonitor::new();
        let primed = monitor.last_refresh;
        monitor.utilization();
        assert!(monitor.last_refresh.duration_since(primed) >= MINIMUM_CPU_UPDATE_INTERVAL);
    }

    #[test]
    fn first_reading_under_load_is_not_zero() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let busy = Arc::new(AtomicBool::new(true));
        let spinners: Vec<_> = (0..num_cpus::get())
            .map(|_| {
                let busy = Arc::clone(&busy);
                std::thread::spawn(move || {
                    while busy.load(Ordering::Relaxed) {
                        std::hint::spin_loop();
                    }
                })
            })
            .collect();

        let reading = CpuMonitor::new().utilization();
        busy.store(false, Ordering::Relaxed);
        for spinner in spinners {
            spinner.join().unwrap();
        }

        if let Some(percent) = reading {
            assert!(percent > 0.0, "first reading was {}", percent);
        }
    }
}
