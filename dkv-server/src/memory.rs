//! Resident-memory probe for the statistics page.

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};

use dkv_common::bytes_to_mib;

/// Reads this process's resident set size.
///
/// `System` caches process tables, so one instance is kept behind a mutex and
/// only the current PID is refreshed per call.
pub struct MemoryProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl MemoryProbe {
    pub fn new() -> Self {
        MemoryProbe {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    /// Resident bytes, or 0 when the process table cannot be read.
    pub fn resident_bytes(&self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(|process| process.memory()).unwrap_or(0)
    }

    pub fn resident_mib(&self) -> u64 {
        bytes_to_mib(self.resident_bytes())
    }
}

impl Default for MemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_os = "linux")]
    fn reports_nonzero_resident_size() {
        let probe = MemoryProbe::new();
        assert!(probe.resident_bytes() > 0);
        // A second refresh reuses the cached process table.
        assert!(probe.resident_bytes() > 0);
    }
}
