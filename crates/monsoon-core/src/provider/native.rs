//! Host provider backed by `sysinfo`.
//!
//! Each started session gets its own polling thread that refreshes only the
//! subsystem its topic needs, pushes one snapshot per interval, and exits as
//! soon as its stop flag is set or its sink reports a closed channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use sysinfo::{CpuRefreshKind, MemoryRefreshKind, ProcessesToUpdate, RefreshKind, System};

use crate::error::{Error, Result};
use crate::provider::{MIN_INTERVAL, MetricsProvider, SnapshotSink, TopicParams};
use crate::session::SessionId;
use crate::snapshot::EntityRecord;
use crate::static_info::{CpuInfo, StaticInfo, SystemInfo};
use crate::topic::{StaticTopic, Topic};

/// Granularity at which a sleeping worker re-checks its stop flag.
const STOP_POLL: Duration = Duration::from_millis(25);

struct Worker {
    topic: Topic,
    stop: Arc<AtomicBool>,
}

/// Reads the local host.
#[derive(Default)]
pub struct NativeProvider {
    workers: Mutex<HashMap<SessionId, Worker>>,
}

impl NativeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with a running poll loop.
    pub fn active_sessions(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, Worker>> {
        self.workers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for NativeProvider {
    fn drop(&mut self) {
        for worker in self.lock().values() {
            worker.stop.store(true, Ordering::Relaxed);
        }
    }
}

impl MetricsProvider for NativeProvider {
    fn name(&self) -> &'static str {
        "native"
    }

    fn start_topic(&self, topic: Topic, params: &TopicParams, sink: SnapshotSink) -> Result<()> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(Error::ProviderUnavailable(format!(
                "sysinfo does not support {}",
                std::env::consts::OS
            )));
        }

        let session = sink.session();
        let interval = params.interval.max(MIN_INTERVAL);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        thread::Builder::new()
            .name(format!("monsoon-{topic}"))
            .spawn(move || poll_loop(topic, interval, sink, stop_flag))
            .map_err(|e| Error::ProviderUnavailable(format!("cannot spawn poller: {e}")))?;

        self.lock().insert(session, Worker { topic, stop });
        log::debug!("native: started {topic} session {session} every {interval:?}");
        Ok(())
    }

    fn stop_topic(&self, topic: Topic, session: SessionId) {
        match self.lock().remove(&session) {
            Some(worker) => {
                worker.stop.store(true, Ordering::Relaxed);
                log::debug!("native: stopped {} session {session}", worker.topic);
            }
            None => log::debug!("native: stop for unknown {topic} session {session}"),
        }
    }

    fn static_info(&self, kind: StaticTopic) -> Result<StaticInfo> {
        Ok(match kind {
            StaticTopic::System => StaticInfo::System(system_info()),
            StaticTopic::Cpu => StaticInfo::Cpu(cpu_info()),
        })
    }

    fn kill_entity(&self, pid: u32) -> Result<()> {
        send_sigterm(pid)
    }
}

// ---------------------------------------------------------------------------
// Poll loop
// ---------------------------------------------------------------------------

fn poll_loop(topic: Topic, interval: Duration, sink: SnapshotSink, stop: Arc<AtomicBool>) {
    let mut sys = match topic {
        Topic::CpuCores => {
            System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::everything()))
        }
        Topic::Memory => System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        ),
        Topic::Processes => System::new(),
    };

    // CPU usage is a delta between two refreshes; prime the counters so the
    // first push is not all zeros.
    if matches!(topic, Topic::CpuCores | Topic::Processes) {
        refresh(&mut sys, topic);
        if sleep_unless_stopped(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL, &stop) {
            return;
        }
    }

    let mut ticks: u64 = 0;
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        refresh(&mut sys, topic);
        let records = match topic {
            Topic::CpuCores => cpu_records(&sys),
            Topic::Memory => vec![memory_record(&sys)],
            Topic::Processes => process_records(&sys),
        };
        if sink.push(records).is_err() {
            log::debug!("native: {topic} sink closed, exiting after {ticks} pushes");
            break;
        }
        ticks += 1;
        if sleep_unless_stopped(interval, &stop) {
            break;
        }
    }
    log::trace!("native: {topic} poller for {} exited", sink.session());
}

/// Sleep for `total`, waking early when `stop` is set. Returns true if
/// stopped.
fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if stop.load(Ordering::Relaxed) {
            return true;
        }
        let step = remaining.min(STOP_POLL);
        thread::sleep(step);
        remaining -= step;
    }
    stop.load(Ordering::Relaxed)
}

fn refresh(sys: &mut System, topic: Topic) {
    match topic {
        Topic::CpuCores => {
            sys.refresh_cpu_usage();
            sys.refresh_cpu_frequency();
        }
        Topic::Memory => sys.refresh_memory(),
        Topic::Processes => {
            sys.refresh_memory();
            sys.refresh_processes(ProcessesToUpdate::All, true);
        }
    }
}

fn cpu_records(sys: &System) -> Vec<EntityRecord> {
    let global = f64::from(sys.global_cpu_usage());
    sys.cpus()
        .iter()
        .map(|cpu| {
            EntityRecord::new(cpu.name())
                .field("core_usage", f64::from(cpu.cpu_usage()))
                .field("frequency", cpu.frequency() as f64)
                .field("global_usage", global)
                .label("vendor_id", cpu.vendor_id())
        })
        .collect()
}

fn memory_record(sys: &System) -> EntityRecord {
    EntityRecord::new("memory")
        .field("total", sys.total_memory() as f64)
        .field("free", sys.free_memory() as f64)
        .field("available", sys.available_memory() as f64)
        .field("used", sys.used_memory() as f64)
        .field("swap_total", sys.total_swap() as f64)
        .field("swap_free", sys.free_swap() as f64)
        .field("swap_used", sys.used_swap() as f64)
}

/// One record per process, ordered by pid so provider order is stable
/// between pushes.
fn process_records(sys: &System) -> Vec<EntityRecord> {
    let mut procs: Vec<_> = sys.processes().iter().collect();
    procs.sort_by_key(|(pid, _)| pid.as_u32());
    procs
        .into_iter()
        .map(|(pid, p)| {
            let cmd: Vec<String> = p
                .cmd()
                .iter()
                .map(|part| part.to_string_lossy().into_owned())
                .collect();
            let mut record = EntityRecord::new(pid.as_u32())
                .label("name", p.name().to_string_lossy())
                .label("cmd", cmd.join(" "))
                .label("status", p.status().to_string())
                .field("cpu_usage", f64::from(p.cpu_usage()))
                .field("memory", p.memory() as f64)
                .field("virtual_memory", p.virtual_memory() as f64)
                .field("run_time", p.run_time() as f64);
            if let Some(exe) = p.exe() {
                record = record.label("exe", exe.to_string_lossy());
            }
            if let Some(parent) = p.parent() {
                record = record.field("parent", f64::from(parent.as_u32()));
            }
            record
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Static info
// ---------------------------------------------------------------------------

fn unknown(value: Option<String>) -> String {
    value.unwrap_or_else(|| "Unknown".to_string())
}

fn system_info() -> SystemInfo {
    SystemInfo {
        os_name: unknown(System::name()),
        os_version: unknown(System::os_version()),
        kernel_version: unknown(System::kernel_version()),
        hostname: unknown(System::host_name()),
        boot_time: System::boot_time(),
        distribution_id: System::distribution_id(),
        cpu_arch: unknown(System::cpu_arch()),
        uptime: System::uptime(),
    }
}

fn cpu_info() -> CpuInfo {
    let sys = System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::everything()));
    let brand = sys
        .cpus()
        .first()
        .map(|c| c.brand().trim().to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    CpuInfo {
        brand,
        physical_cores: sys.physical_core_count().unwrap_or(0),
        logical_cores: sys.cpus().len(),
        cache_sizes: read_cache_sizes(),
        features: read_cpu_features(),
    }
}

#[cfg(target_os = "linux")]
fn read_cache_sizes() -> Vec<crate::static_info::CacheInfo> {
    use crate::static_info::{CacheInfo, cache_name, parse_cache_size};
    use std::path::Path;

    let root = Path::new("/sys/devices/system/cpu/cpu0/cache");
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut dirs: Vec<_> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("index"))
        })
        .collect();
    dirs.sort();

    dirs.iter()
        .filter_map(|dir| {
            let read = |f: &str| std::fs::read_to_string(dir.join(f)).ok();
            let size_bytes = parse_cache_size(&read("size")?)?;
            Some(CacheInfo {
                name: cache_name(&read("level")?, &read("type")?),
                size_bytes,
            })
        })
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn read_cache_sizes() -> Vec<crate::static_info::CacheInfo> {
    Vec::new()
}

#[cfg(target_os = "linux")]
fn read_cpu_features() -> Vec<String> {
    std::fs::read_to_string("/proc/cpuinfo")
        .map(|text| crate::static_info::parse_cpu_flags(&text))
        .unwrap_or_default()
}

#[cfg(not(target_os = "linux"))]
fn read_cpu_features() -> Vec<String> {
    Vec::new()
}

// ---------------------------------------------------------------------------
// Kill
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn send_sigterm(pid: u32) -> Result<()> {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return Err(Error::CommandFailure(format!("pid {pid} out of range")));
    };
    if raw <= 0 {
        return Err(Error::CommandFailure(format!("refusing to signal pid {pid}")));
    }
    // SAFETY: kill(2) takes plain integers and has no memory-safety
    // preconditions; a positive pid targets exactly one process.
    let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
    if rc == 0 {
        log::info!("sent SIGTERM to pid {pid}");
        Ok(())
    } else {
        let err = std::io::Error::last_os_error();
        Err(Error::CommandFailure(format!("kill {pid}: {err}")))
    }
}

#[cfg(not(unix))]
fn send_sigterm(pid: u32) -> Result<()> {
    Err(Error::CommandFailure(format!(
        "cannot signal pid {pid}: unsupported on {}",
        std::env::consts::OS
    )))
}
