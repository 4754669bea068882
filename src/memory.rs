//! Physical memory queries used by the reader's back-pressure.

use crate::error::HashError;
use log::debug;

/// Source of memory figures for the reader.
pub trait MemoryMonitor: Send + Sync {
    /// Free physical memory right now, in bytes.
    fn available_bytes(&self) -> Result<u64, HashError>;

    /// Installed physical memory in bytes. Queried once and cached.
    fn total_bytes(&self) -> u64;

    /// Ask the process to give memory back. Not guaranteed to free anything.
    fn reclaim(&self) {
        trim_allocator();
    }
}

/// Reads memory figures from the operating system.
#[derive(Debug, Clone)]
pub struct SystemMemory {
    total: u64,
}

impl SystemMemory {
    /// Query the system once. Fails if memory cannot be queried on this host.
    pub fn new() -> Result<Self, HashError> {
        let snapshot = query()?;
        debug!(
            "System memory: {} total, {} available",
            snapshot.total, snapshot.available
        );
        Ok(Self {
            total: snapshot.total,
        })
    }
}

impl MemoryMonitor for SystemMemory {
    fn available_bytes(&self) -> Result<u64, HashError> {
        query().map(|s| s.available)
    }

    fn total_bytes(&self) -> u64 {
        self.total
    }
}

struct Snapshot {
    total: u64,
    available: u64,
}

#[cfg(target_os = "linux")]
fn query() -> Result<Snapshot, HashError> {
    // MemAvailable accounts for reclaimable page cache; sysinfo's freeram does not.
    if let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") {
        if let Some(snapshot) = parse_meminfo(&meminfo) {
            return Ok(snapshot);
        }
    }
    sysinfo()
}

#[cfg(target_os = "linux")]
fn sysinfo() -> Result<Snapshot, HashError> {
    let mut info: libc::sysinfo = unsafe { std::mem::zeroed() };
    if unsafe { libc::sysinfo(&mut info) } != 0 {
        return Err(HashError::MemoryQuery(
            std::io::Error::last_os_error().to_string(),
        ));
    }
    let unit = info.mem_unit.max(1) as u64;
    Ok(Snapshot {
        total: (info.totalram as u64).saturating_mul(unit),
        available: (info.freeram as u64).saturating_mul(unit),
    })
}

#[cfg(not(target_os = "linux"))]
fn query() -> Result<Snapshot, HashError> {
    Err(HashError::MemoryQuery(
        "available memory cannot be queried on this platform".to_string(),
    ))
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_meminfo(meminfo: &str) -> Option<Snapshot> {
    let mut total = None;
    let mut available = None;
    for line in meminfo.lines() {
        let mut fields = line.split_whitespace();
        let key = fields.next();
        let kib = fields.next().and_then(|v| v.parse::<u64>().ok());
        match key {
            Some("MemTotal:") => total = kib,
            Some("MemAvailable:") => available = kib,
            _ => continue,
        }
        if total.is_some() && available.is_some() {
            break;
        }
    }
    Some(Snapshot {
        total: total? * 1024,
        available: available? * 1024,
    })
}

/// Return freed heap pages to the operating system where the allocator supports it.
pub fn trim_allocator() {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    {
        let released = unsafe { libc::malloc_trim(0) };
        debug!("malloc_trim released memory: {}", released != 0);
    }
}
