//! Resident memory of the harness process.

/// Current resident set size, or `None` where it cannot be read.
pub fn resident_set_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        parse_vm_rss(&status)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// `VmRSS:     1234 kB` → bytes
pub fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let mut fields = line["VmRSS:".len()..].split_whitespace();
    let value: u64 = fields.next()?.parse().ok()?;
    let unit = fields.next().unwrap_or("kB");
    let scale = match unit {
        "kB" | "KB" | "kb" => 1024,
        "mB" | "MB" => 1024 * 1024,
        "B" => 1,
        _ => return None,
    };
    Some(value * scale)
}

/// Baseline taken before a workload; reports growth afterwards.
#[derive(Debug, Clone, Copy)]
pub struct MemorySampler {
    baseline: Option<u64>,
}

impl MemorySampler {
    pub fn start() -> Self {
        Self {
            baseline: resident_set_bytes(),
        }
    }

    pub fn baseline(&self) -> Option<u64> {
        self.baseline
    }

    /// Signed growth in bytes since [`MemorySampler::start`].
    pub fn growth(&self) -> Option<i64> {
        let before = self.baseline?;
        let after = resident_set_bytes()?;
        Some(after as i64 - before as i64)
    }
}

pub fn mebibytes(bytes: i64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tharness\nVmPeak:\t  20000 kB\nVmRSS:\t    5120 kB\nThreads:\t4\n";
        assert_eq!(parse_vm_rss(status), Some(5120 * 1024));
        assert_eq!(parse_vm_rss("Name:\tharness\n"), None);
        assert_eq!(parse_vm_rss("VmRSS:\tlots kB\n"), None);
    }

    #[test]
    fn test_mebibytes() {
        assert_eq!(mebibytes(16 * 1024 * 1024), 16.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_resident_set_is_readable_on_linux() {
        let rss = resident_set_bytes().unwrap();
        assert!(rss > 0);
        assert!(MemorySampler::start().growth().is_some());
    }
}
