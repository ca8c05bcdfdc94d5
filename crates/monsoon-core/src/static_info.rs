//! One-shot host information: system identity and CPU facts.
//!
//! These never stream. Providers fill them in on request; fields a platform
//! cannot report are left empty or "Unknown".

use serde::{Deserialize, Serialize};

/// Host identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os_name: String,
    pub os_version: String,
    pub kernel_version: String,
    pub hostname: String,
    /// Boot time, seconds since the unix epoch.
    pub boot_time: u64,
    pub distribution_id: String,
    pub cpu_arch: String,
    /// Seconds since boot.
    pub uptime: u64,
}

/// One CPU cache level as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
    /// e.g. "L1 Data Cache".
    pub name: String,
    pub size_bytes: u64,
}

/// CPU model and capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuInfo {
    pub brand: String,
    pub physical_cores: usize,
    pub logical_cores: usize,
    pub cache_sizes: Vec<CacheInfo>,
    pub features: Vec<String>,
}

/// Reply to a static info request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StaticInfo {
    System(SystemInfo),
    Cpu(CpuInfo),
}

impl StaticInfo {
    /// Human-readable `key: value` lines for terminal output.
    pub fn lines(&self) -> Vec<(String, String)> {
        match self {
            Self::System(s) => vec![
                ("OS".into(), format!("{} {}", s.os_name, s.os_version)),
                ("Kernel".into(), s.kernel_version.clone()),
                ("Hostname".into(), s.hostname.clone()),
                ("Distribution".into(), s.distribution_id.clone()),
                ("Architecture".into(), s.cpu_arch.clone()),
                ("Boot time".into(), s.boot_time.to_string()),
                ("Uptime".into(), format_uptime(s.uptime)),
            ],
            Self::Cpu(c) => {
                let mut lines = vec![
                    ("Brand".into(), c.brand.clone()),
                    ("Physical cores".into(), c.physical_cores.to_string()),
                    ("Logical cores".into(), c.logical_cores.to_string()),
                ];
                for cache in &c.cache_sizes {
                    lines.push((cache.name.clone(), format_bytes(cache.size_bytes)));
                }
                if !c.features.is_empty() {
                    lines.push(("Features".into(), c.features.join(" ")));
                }
                lines
            }
        }
    }
}

/// `3d 4h 05m`, dropping leading zero units.
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let mins = (secs % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {mins:02}m")
    } else if hours > 0 {
        format!("{hours}h {mins:02}m")
    } else {
        format!("{mins}m {:02}s", secs % 60)
    }
}

/// Binary-prefixed byte count: `512 B`, `32.0 KiB`, `15.6 GiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

// ---------------------------------------------------------------------------
// Linux sysfs/procfs parsing
// ---------------------------------------------------------------------------

/// Parse a sysfs cache size such as `32K`, `1024K` or `8M`.
pub fn parse_cache_size(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let (digits, mult) = match raw.chars().last()? {
        'K' | 'k' => (&raw[..raw.len() - 1], 1024),
        'M' | 'm' => (&raw[..raw.len() - 1], 1024 * 1024),
        'G' | 'g' => (&raw[..raw.len() - 1], 1024 * 1024 * 1024),
        _ => (raw, 1),
    };
    digits.trim().parse::<u64>().ok().map(|n| n * mult)
}

/// Feature flags from `/proc/cpuinfo` text: the first `flags` (x86) or
/// `Features` (arm) line.
pub fn parse_cpu_flags(cpuinfo: &str) -> Vec<String> {
    cpuinfo
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            matches!(key.trim(), "flags" | "Features").then_some(value)
        })
        .map(|value| value.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Build a cache entry name from sysfs `level` and `type` files.
pub fn cache_name(level: &str, kind: &str) -> String {
    let kind = match kind.trim() {
        "Data" => "Data",
        "Instruction" => "Instruction",
        "Unified" => "Unified",
        _ => "Unknown",
    };
    format!("L{} {kind} Cache", level.trim())
}
