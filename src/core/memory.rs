//! Memory-pressure guard consulted while shaping large responses

use crate::core::error::ShapeError;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Returns the current memory usage of the process in bytes, if known
pub type MemoryProbe = Arc<dyn Fn() -> Option<u64> + Send + Sync>;

/// Resident set size from `/proc/self/status`; `None` off Linux
pub fn resident_memory() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

/// `VmRSS:  1234 kB` in bytes
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let mut parts = line["VmRSS:".len()..].split_whitespace();
    let amount: u64 = parts.next()?.parse().ok()?;
    match parts.next() {
        Some("kB") | None => Some(amount * 1024),
        Some(_) => None,
    }
}

/// Trips once usage exceeds 90% of the configured ceiling
///
/// The probe only runs on every `interval`-th call; calls in between pass.
pub struct MemoryGuard {
    critical: Option<u64>,
    interval: u32,
    calls: AtomicU32,
    probe: MemoryProbe,
}

impl MemoryGuard {
    pub fn new(limit_bytes: Option<u64>, interval: u32) -> Self {
        Self::with_probe(limit_bytes, interval, Arc::new(resident_memory))
    }

    pub fn with_probe(limit_bytes: Option<u64>, interval: u32, probe: MemoryProbe) -> Self {
        Self {
            critical: limit_bytes.map(|limit| limit / 10 * 9),
            interval: interval.max(1),
            calls: AtomicU32::new(0),
            probe,
        }
    }

    /// A guard that never trips
    pub fn disabled() -> Self {
        Self::with_probe(None, 1, Arc::new(|| None))
    }

    pub fn check(&self) -> Result<(), ShapeError> {
        let Some(critical) = self.critical else {
            return Ok(());
        };
        if self.calls.fetch_add(1, Ordering::Relaxed) % self.interval != 0 {
            return Ok(());
        }
        match (self.probe)() {
            Some(used) if used > critical => {
                tracing::warn!(used, critical, "memory guard tripped");
                Err(ShapeError::ResourceExhausted { used, critical })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for MemoryGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryGuard")
            .field("critical", &self.critical)
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_guard_never_trips() {
        let guard = MemoryGuard::disabled();
        for _ in 0..10 {
            assert!(guard.check().is_ok());
        }
    }

    #[test]
    fn test_trips_above_ninety_percent() {
        let guard = MemoryGuard::with_probe(Some(1000), 1, Arc::new(|| Some(950)));
        match guard.check() {
            Err(ShapeError::ResourceExhausted { used, critical }) => {
                assert_eq!(used, 950);
                assert_eq!(critical, 900);
            }
            other => panic!("Expected ResourceExhausted, got {:?}", other),
        }

        let fine = MemoryGuard::with_probe(Some(1000), 1, Arc::new(|| Some(900)));
        assert!(fine.check().is_ok());
    }

    #[test]
    fn test_probe_runs_on_interval() {
        let guard = MemoryGuard::with_probe(Some(1000), 3, Arc::new(|| Some(999)));
        assert!(guard.check().is_err());
        assert!(guard.check().is_ok());
        assert!(guard.check().is_ok());
        assert!(guard.check().is_err());
    }

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\trestack\nVmPeak:\t  20480 kB\nVmRSS:\t   8192 kB\nThreads:\t4\n";
        assert_eq!(parse_vm_rss(status), Some(8192 * 1024));
        assert_eq!(parse_vm_rss("Name:\trestack\n"), None);
        assert_eq!(parse_vm_rss("VmRSS:\t   abc kB\n"), None);
    }

    #[test]
    fn test_unknown_usage_passes() {
        let guard = MemoryGuard::with_probe(Some(1), 1, Arc::new(|| None));
        assert!(guard.check().is_ok());
    }
}
