// Host inspection for the report header and for sanity warnings.

use sysinfo::{CpuExt, System, SystemExt};

pub fn machine_name() -> String {
    let sys = System::new();
    sys.host_name().unwrap_or_else(|| "unknown".to_string())
}

pub fn arch_bits() -> u32 {
    usize::BITS
}

pub fn page_size() -> Option<usize> {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    (size > 0).then_some(size as usize)
}

/// L1 data cache line size as reported by the kernel.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub fn detected_cache_line() -> Option<usize> {
    let size = unsafe { libc::sysconf(libc::_SC_LEVEL1_DCACHE_LINESIZE) };
    // some kernels and containers report 0
    (size > 0).then_some(size as usize)
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub fn detected_cache_line() -> Option<usize> {
    None
}

#[derive(Debug, Clone, Default)]
pub struct HostInfo {
    pub machine: String,
    pub cpu_brand: String,
    pub logical_cores: usize,
    pub physical_cores: Option<usize>,
    pub total_memory_bytes: u64,
    pub os_release: Option<String>,
    pub load_one: Option<f64>,
    pub cache_line: Option<usize>,
    pub page_size: Option<usize>,
    pub arch_bits: u32,
}

impl HostInfo {
    pub fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();

        let cpu_brand = sys.global_cpu_info().brand().trim().to_string();
        HostInfo {
            machine: machine_name(),
            cpu_brand: if cpu_brand.is_empty() {
                "unknown".to_string()
            } else {
                cpu_brand
            },
            logical_cores: num_cpus::get(),
            physical_cores: sys.physical_core_count(),
            total_memory_bytes: sys.total_memory(),
            os_release: sys_info::os_release().ok(),
            load_one: sys_info::loadavg().ok().map(|load| load.one),
            cache_line: detected_cache_line(),
            page_size: page_size(),
            arch_bits: arch_bits(),
        }
    }

    /// Conditions that make the numbers less trustworthy; none are fatal.
    pub fn warnings(&self, workers: usize, readers: usize, stride: usize) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(line) = self.cache_line {
            if stride < line {
                warnings.push(format!(
                    "stride {stride} B is smaller than the detected {line} B cache line; \
                     padded slots may still share lines"
                ));
            }
        }
        let threads = workers.saturating_add(readers);
        if self.logical_cores > 0 && threads > self.logical_cores {
            warnings.push(format!(
                "{threads} threads on {} logical cores; timings will include scheduler noise",
                self.logical_cores
            ));
        }
        if workers == 1 && readers == 0 {
            warnings.push(
                "a single worker cannot contend with anyone; expect no difference".to_string(),
            );
        }
        if let Some(load) = self.load_one {
            if self.logical_cores > 0 && load > self.logical_cores as f64 / 2.0 {
                warnings.push(format!(
                    "one-minute load average {load:.2} is high for {} cores",
                    self.logical_cores
                ));
            }
        }
        warnings
    }
}
