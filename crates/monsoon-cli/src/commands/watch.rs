//! `monsoon watch`: stream projected rows as JSON lines.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use monsoon_core::{SortDirection, SortKey, SubscriptionController, ViewMode, ViewState};

use super::{build_config, fail, make_provider, parse_topic};
use crate::StreamArgs;

/// How often the queue is drained.
const PUMP_EVERY: Duration = Duration::from_millis(50);

pub struct WatchCommandConfig<'a> {
    pub topic: &'a str,
    pub count: Option<u64>,
    pub mode: &'a str,
    pub sort: Option<&'a str>,
    pub direction: Option<&'a str>,
    pub filter: Option<&'a str>,
    pub columns: Option<&'a str>,
    pub stream: &'a StreamArgs,
}

/// Apply command-line view flags on top of the topic defaults.
fn build_view(cfg: &WatchCommandConfig<'_>, base: ViewState) -> monsoon_core::Result<ViewState> {
    let topic = parse_topic(cfg.topic);
    let mut view = base;
    view.set_mode(cfg.mode.parse::<ViewMode>()?);
    if let Some(key) = cfg.sort {
        let key: SortKey = key.parse()?;
        view.sort_key = key;
        view.sort_direction = key.default_direction();
    }
    if let Some(dir) = cfg.direction {
        view.sort_direction = dir.parse::<SortDirection>()?;
    }
    if let Some(filter) = cfg.filter {
        view.set_filter(filter);
    }
    if let Some(columns) = cfg.columns {
        view.set_columns(topic, columns)?;
    }
    Ok(view)
}

pub fn run(cfg: WatchCommandConfig<'_>) {
    let topic = parse_topic(cfg.topic);
    let config = build_config(cfg.stream, topic).unwrap_or_else(|e| fail(e));
    let view = build_view(&cfg, config.view_for(topic)).unwrap_or_else(|e| fail(e));

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
        fail(format!("cannot install Ctrl+C handler: {e}"));
    }

    let provider = make_provider(cfg.stream.replay.as_deref());
    let mut controller =
        SubscriptionController::new(provider, topic, config.retention(), config.params());
    if let Err(e) = controller.start() {
        fail(e);
    }

    let mut seen: u64 = 0;
    let mut stdout = std::io::stdout().lock();
    while running.load(Ordering::SeqCst) {
        let stats = controller.pump();
        if stats.malformed > 0 {
            eprintln!("Warning: dropped {} malformed snapshot(s)", stats.malformed);
        }
        if stats.applied > 0 {
            seen += stats.applied as u64;
            let line = serde_json::json!({
                "topic": topic,
                "cycle": controller.reconciler().cycles(),
                "projection": controller.project(&view),
            });
            if writeln!(stdout, "{line}").is_err() {
                break;
            }
            let _ = stdout.flush();
        }
        if cfg.count.is_some_and(|n| seen >= n) {
            break;
        }
        std::thread::sleep(PUMP_EVERY);
    }

    controller.stop();
    log::debug!("watch: {seen} snapshot(s) from {topic}");
}
