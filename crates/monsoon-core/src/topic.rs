//! Topics and their column catalogs.
//!
//! A topic is one named stream of metrics. Each topic declares which record
//! field carries the entity key, which columns a view can show, and which
//! columns are visible by default.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A streamed metrics topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// One record per logical CPU core.
    CpuCores,
    /// A single host-wide memory reading.
    Memory,
    /// One record per running process.
    Processes,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::CpuCores, Topic::Memory, Topic::Processes];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CpuCores => "cpu_cores",
            Self::Memory => "memory",
            Self::Processes => "processes",
        }
    }

    /// Tab title used by the dashboard.
    pub fn title(self) -> &'static str {
        match self {
            Self::CpuCores => "CPU",
            Self::Memory => "Memory",
            Self::Processes => "Processes",
        }
    }

    /// Name of the record field that carries the entity key.
    pub fn key_field(self) -> &'static str {
        match self {
            Self::CpuCores => "core_name",
            Self::Memory => "reading",
            Self::Processes => "pid",
        }
    }

    /// Key used when a record omits the key field. Only single-entity topics
    /// have one.
    pub fn implicit_key(self) -> Option<&'static str> {
        match self {
            Self::Memory => Some("memory"),
            Self::CpuCores | Self::Processes => None,
        }
    }

    /// Numeric field used by the "cpu" sort key.
    pub fn cpu_field(self) -> Option<&'static str> {
        match self {
            Self::CpuCores => Some("core_usage"),
            Self::Processes => Some("cpu_usage"),
            Self::Memory => None,
        }
    }

    /// Numeric field used by the "memory" sort key.
    pub fn memory_field(self) -> Option<&'static str> {
        match self {
            Self::Memory => Some("used"),
            Self::Processes => Some("memory"),
            Self::CpuCores => None,
        }
    }

    /// Every column this topic can display, in catalog order.
    pub fn columns(self) -> &'static [Column] {
        match self {
            Self::CpuCores => CPU_CORE_COLUMNS,
            Self::Memory => MEMORY_COLUMNS,
            Self::Processes => PROCESS_COLUMNS,
        }
    }

    /// Columns shown when a view is first opened.
    pub fn default_columns(self) -> &'static [&'static str] {
        match self {
            Self::CpuCores => &["core", "usage", "frequency"],
            Self::Memory => &["total", "used", "available", "swap_used"],
            Self::Processes => &["name", "pid", "cpu", "memory", "command"],
        }
    }

    /// Look up a column by name.
    pub fn column(self, name: &str) -> Option<&'static Column> {
        self.columns().iter().find(|c| c.name == name)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu_cores" | "cpu" | "cores" => Ok(Self::CpuCores),
            "memory" | "mem" => Ok(Self::Memory),
            "processes" | "procs" | "ps" => Ok(Self::Processes),
            other => Err(Error::UnknownTopic(other.to_string())),
        }
    }
}

/// One-shot, request/response records that never stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaticTopic {
    /// Host identity: OS, kernel, hostname, uptime.
    System,
    /// CPU model, core counts, caches and feature flags.
    Cpu,
}

impl fmt::Display for StaticTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::Cpu => f.write_str("cpu"),
        }
    }
}

impl FromStr for StaticTopic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" | "sys" => Ok(Self::System),
            "cpu" => Ok(Self::Cpu),
            other => Err(Error::UnknownTopic(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// Where a column reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    /// The entity key itself.
    Key,
    /// A numeric field recorded into history.
    Field(&'static str),
    /// A textual label carried only by the latest snapshot.
    Label(&'static str),
}

/// A displayable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub title: &'static str,
    pub source: ColumnSource,
    /// Unit hint for formatting (`"bytes"`, `"pct"`, `"MHz"`, `"s"`, ...).
    pub unit: &'static str,
}

const fn col(
    name: &'static str,
    title: &'static str,
    source: ColumnSource,
    unit: &'static str,
) -> Column {
    Column {
        name,
        title,
        source,
        unit,
    }
}

const CPU_CORE_COLUMNS: &[Column] = &[
    col("core", "Core", ColumnSource::Key, ""),
    col("usage", "Usage", ColumnSource::Field("core_usage"), "pct"),
    col("frequency", "Freq", ColumnSource::Field("frequency"), "MHz"),
    col("global", "Global", ColumnSource::Field("global_usage"), "pct"),
];

const MEMORY_COLUMNS: &[Column] = &[
    col("total", "Total", ColumnSource::Field("total"), "bytes"),
    col("free", "Free", ColumnSource::Field("free"), "bytes"),
    col("available", "Available", ColumnSource::Field("available"), "bytes"),
    col("used", "Used", ColumnSource::Field("used"), "bytes"),
    col("swap_total", "Swap total", ColumnSource::Field("swap_total"), "bytes"),
    col("swap_free", "Swap free", ColumnSource::Field("swap_free"), "bytes"),
    col("swap_used", "Swap used", ColumnSource::Field("swap_used"), "bytes"),
];

const PROCESS_COLUMNS: &[Column] = &[
    col("pid", "PID", ColumnSource::Key, ""),
    col("name", "Name", ColumnSource::Label("name"), ""),
    col("cpu", "CPU", ColumnSource::Field("cpu_usage"), "pct"),
    col("memory", "Memory", ColumnSource::Field("memory"), "bytes"),
    col("command", "Command", ColumnSource::Label("cmd"), ""),
    col("run_time", "Run time", ColumnSource::Field("run_time"), "s"),
    col("parent", "Parent", ColumnSource::Field("parent"), ""),
    col("virtual_memory", "Virt", ColumnSource::Field("virtual_memory"), "bytes"),
    col("status", "Status", ColumnSource::Label("status"), ""),
    col("exe", "Executable", ColumnSource::Label("exe"), ""),
];
