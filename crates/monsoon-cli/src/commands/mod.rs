pub mod info;
pub mod kill;
pub mod monitor;
pub mod serve;
pub mod watch;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use monsoon_core::{DashboardConfig, MetricsProvider, NativeProvider, ScriptedProvider, Topic};

use crate::StreamArgs;

/// Print an error and exit non-zero.
pub fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

/// Build the provider: the local host, or a replay file when one is given.
pub fn make_provider(replay: Option<&str>) -> Arc<dyn MetricsProvider> {
    match replay {
        Some(path) => match ScriptedProvider::from_file(Path::new(path)) {
            Ok(p) => Arc::new(p),
            Err(e) => fail(e),
        },
        None => Arc::new(NativeProvider::new()),
    }
}

/// Parse a topic name or exit.
pub fn parse_topic(s: &str) -> Topic {
    s.parse().unwrap_or_else(|e| fail(e))
}

/// Turn shared stream flags into a validated config.
pub fn build_config(args: &StreamArgs, topic: Topic) -> Result<DashboardConfig, String> {
    let config = DashboardConfig {
        capacity: args.capacity,
        interval: parse_duration(&args.interval)?,
        max_age: args.max_age.as_deref().map(parse_duration).transpose()?,
        topic,
        ..Default::default()
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Parse a duration string like "500ms", "30s", "5m", "1h". A bare number
/// is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    let (numeric, multiplier) = if let Some(rest) = s.strip_suffix("ms") {
        (rest, 1u64)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, 1000)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60_000)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3_600_000)
    } else {
        (s, 1000)
    };

    let value: u64 = numeric
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration '{s}'"))?;
    Ok(Duration::from_millis(value * multiplier))
}
