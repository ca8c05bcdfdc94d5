//! Replay provider.
//!
//! Feeds a fixed list of payloads into the sink instead of reading the host,
//! and records every call it receives. Tests use it to observe exactly how
//! often `stop_topic` was reached; `monsoon monitor --replay` uses it to
//! drive the dashboard from a captured file.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::provider::{MetricsProvider, SnapshotSink, TopicParams};
use crate::session::SessionId;
use crate::snapshot::EntityRecord;
use crate::static_info::{CpuInfo, StaticInfo, SystemInfo};
use crate::topic::{StaticTopic, Topic};

/// Stopped sessions whose sinks stay reachable through `push_to`.
const RETIRED_SINKS: usize = 8;

/// A call observed by [`ScriptedProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Start { topic: Topic, session: SessionId },
    Stop { topic: Topic, session: SessionId },
    Kill { pid: u32 },
}

/// Scripted payload for one topic.
#[derive(Debug, Clone, PartialEq)]
pub enum Script {
    Records(Vec<EntityRecord>),
    Json(serde_json::Value),
}

/// On-disk replay format: topic name → list of JSON record arrays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplayFile {
    pub topics: HashMap<Topic, Vec<serde_json::Value>>,
}

#[derive(Debug, Default)]
struct Inner {
    scripts: HashMap<Topic, Vec<Script>>,
    sinks: HashMap<SessionId, SnapshotSink>,
    /// Sinks of the most recently stopped sessions, kept so tests can
    /// attempt late pushes. Holds at most [`RETIRED_SINKS`].
    retired: VecDeque<(SessionId, SnapshotSink)>,
    calls: Vec<ProviderCall>,
    refuse_starts: bool,
    refuse_kills: Option<String>,
}

/// Provider that replays scripted snapshots and records its calls.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    inner: Mutex<Inner>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a [`ReplayFile`] from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::ProviderUnavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        let file: ReplayFile = serde_json::from_str(&text).map_err(|e| {
            Error::MalformedSnapshot(format!("{}: {e}", path.display()))
        })?;
        let provider = Self::new();
        for (topic, payloads) in file.topics {
            for payload in payloads {
                provider.script_json(topic, payload);
            }
        }
        Ok(provider)
    }

    /// Queue typed records to replay when `topic` starts.
    pub fn script(&self, topic: Topic, records: Vec<EntityRecord>) {
        self.with(|inner| {
            inner
                .scripts
                .entry(topic)
                .or_default()
                .push(Script::Records(records))
        });
    }

    /// Queue raw JSON to replay when `topic` starts.
    pub fn script_json(&self, topic: Topic, value: serde_json::Value) {
        self.with(|inner| {
            inner
                .scripts
                .entry(topic)
                .or_default()
                .push(Script::Json(value))
        });
    }

    /// Make every following `start_topic` fail with `ProviderUnavailable`.
    pub fn refuse_starts(&self, refuse: bool) {
        self.with(|inner| inner.refuse_starts = refuse);
    }

    /// Make every following `kill_entity` fail with the given reason.
    pub fn refuse_kills(&self, reason: Option<&str>) {
        self.with(|inner| inner.refuse_kills = reason.map(str::to_string));
    }

    /// Push records to every live session on `topic`, as a polling provider
    /// would on its next tick. Returns how many sessions accepted them.
    pub fn push(&self, topic: Topic, records: Vec<EntityRecord>) -> usize {
        self.broadcast(topic, |sink| sink.push(records.clone()))
    }

    /// Raw JSON variant of [`push`](Self::push).
    pub fn push_json(&self, topic: Topic, value: serde_json::Value) -> usize {
        self.broadcast(topic, |sink| sink.push_json(value.clone()))
    }

    /// Push to one session regardless of whether it was stopped. Used to
    /// simulate a delivery already in flight when the stop was issued.
    pub fn push_to(&self, session: SessionId, records: Vec<EntityRecord>) -> Result<()> {
        let sink = self.with(|inner| {
            inner
                .sinks
                .get(&session)
                .or_else(|| {
                    inner
                        .retired
                        .iter()
                        .find(|(id, _)| *id == session)
                        .map(|(_, sink)| sink)
                })
                .cloned()
        });
        match sink {
            Some(sink) => sink.push(records),
            None => Err(Error::StaleDelivery),
        }
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.with(|inner| inner.calls.clone())
    }

    pub fn start_count(&self, topic: Topic) -> usize {
        self.count(|c| matches!(c, ProviderCall::Start { topic: t, .. } if *t == topic))
    }

    pub fn stop_count(&self, topic: Topic) -> usize {
        self.count(|c| matches!(c, ProviderCall::Stop { topic: t, .. } if *t == topic))
    }

    /// Sessions currently receiving pushes.
    pub fn live_sessions(&self) -> usize {
        self.with(|inner| inner.sinks.len())
    }

    fn count(&self, pred: impl Fn(&ProviderCall) -> bool) -> usize {
        self.with(|inner| inner.calls.iter().filter(|c| pred(c)).count())
    }

    fn broadcast(&self, topic: Topic, send: impl Fn(&SnapshotSink) -> Result<()>) -> usize {
        let sinks: Vec<SnapshotSink> = self.with(|inner| {
            inner
                .sinks
                .values()
                .filter(|s| s.topic() == topic)
                .cloned()
                .collect()
        });
        sinks.iter().filter(|s| send(s).is_ok()).count()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl MetricsProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn start_topic(&self, topic: Topic, _params: &TopicParams, sink: SnapshotSink) -> Result<()> {
        let scripts = self.with(|inner| {
            if inner.refuse_starts {
                return Err(Error::ProviderUnavailable(
                    "scripted provider refuses starts".into(),
                ));
            }
            inner.calls.push(ProviderCall::Start {
                topic,
                session: sink.session(),
            });
            inner.sinks.insert(sink.session(), sink.clone());
            Ok(inner.scripts.get(&topic).cloned().unwrap_or_default())
        })?;

        for script in scripts {
            let sent = match script {
                Script::Records(records) => sink.push(records),
                Script::Json(value) => sink.push_json(value),
            };
            if sent.is_err() {
                break;
            }
        }
        Ok(())
    }

    fn stop_topic(&self, topic: Topic, session: SessionId) {
        self.with(|inner| {
            inner.calls.push(ProviderCall::Stop { topic, session });
            if let Some(sink) = inner.sinks.remove(&session) {
                if inner.retired.len() == RETIRED_SINKS {
                    inner.retired.pop_front();
                }
                inner.retired.push_back((session, sink));
            }
        });
    }

    fn static_info(&self, kind: StaticTopic) -> Result<StaticInfo> {
        Ok(match kind {
            StaticTopic::System => StaticInfo::System(SystemInfo {
                os_name: "Replay".into(),
                os_version: crate::VERSION.into(),
                kernel_version: "Unknown".into(),
                hostname: "replay".into(),
                boot_time: 0,
                distribution_id: "replay".into(),
                cpu_arch: std::env::consts::ARCH.into(),
                uptime: 0,
            }),
            StaticTopic::Cpu => StaticInfo::Cpu(CpuInfo {
                brand: "Replay CPU".into(),
                ..CpuInfo::default()
            }),
        })
    }

    fn kill_entity(&self, pid: u32) -> Result<()> {
        self.with(|inner| {
            inner.calls.push(ProviderCall::Kill { pid });
            match &inner.refuse_kills {
                Some(reason) => Err(Error::CommandFailure(reason.clone())),
                None => Ok(()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_replays_scripts_in_order() {
        let p = ScriptedProvider::new();
        p.script(Topic::Memory, vec![EntityRecord::new("memory").field("total", 1.0)]);
        p.script_json(Topic::Memory, serde_json::json!([{ "total": 2.0 }]));
        let session = SessionId::new();
        let (sink, rx) = SnapshotSink::channel(session, Topic::Memory);
        p.start_topic(Topic::Memory, &TopicParams::default(), sink).unwrap();
        assert_eq!(rx.try_iter().count(), 2);
        assert_eq!(p.start_count(Topic::Memory), 1);
        assert_eq!(p.live_sessions(), 1);
    }

    #[test]
    fn test_refused_start_records_nothing() {
        let p = ScriptedProvider::new();
        p.refuse_starts(true);
        let (sink, _rx) = SnapshotSink::channel(SessionId::new(), Topic::CpuCores);
        let err = p
            .start_topic(Topic::CpuCores, &TopicParams::default(), sink)
            .unwrap_err();
        assert!(matches!(err, Error::ProviderUnavailable(_)));
        assert!(p.calls().is_empty());
        assert_eq!(p.live_sessions(), 0);
    }

    #[test]
    fn test_stop_removes_sink_from_broadcast() {
        let p = ScriptedProvider::new();
        let session = SessionId::new();
        let (sink, _rx) = SnapshotSink::channel(session, Topic::Processes);
        p.start_topic(Topic::Processes, &TopicParams::default(), sink).unwrap();
        assert_eq!(p.push(Topic::Processes, Vec::new()), 1);
        p.stop_topic(Topic::Processes, session);
        assert_eq!(p.push(Topic::Processes, Vec::new()), 0);
        assert_eq!(p.stop_count(Topic::Processes), 1);
    }

    #[test]
    fn test_retired_sinks_are_bounded() {
        let p = ScriptedProvider::new();
        let mut sessions = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..20 {
            let session = SessionId::new();
            let (sink, rx) = SnapshotSink::channel(session, Topic::CpuCores);
            p.start_topic(Topic::CpuCores, &TopicParams::default(), sink).unwrap();
            p.stop_topic(Topic::CpuCores, session);
            sessions.push(session);
            receivers.push(rx);
        }
        assert_eq!(p.with(|inner| inner.retired.len()), RETIRED_SINKS);
        assert_eq!(p.push_to(sessions[19], Vec::new()), Ok(()));
        assert_eq!(p.push_to(sessions[0], Vec::new()), Err(Error::StaleDelivery));
    }

    #[test]
    fn test_kill_records_and_can_fail() {
        let p = ScriptedProvider::new();
        p.kill_entity(7).unwrap();
        p.refuse_kills(Some("operation not permitted"));
        let err = p.kill_entity(1).unwrap_err();
        assert_eq!(err, Error::CommandFailure("operation not permitted".into()));
        assert_eq!(
            p.calls(),
            vec![ProviderCall::Kill { pid: 7 }, ProviderCall::Kill { pid: 1 }]
        );
    }

    #[test]
    fn test_replay_file_parses_topic_map() {
        let text = r#"{ "processes": [[{ "pid": 1, "name": "init" }]], "memory": [[{ "total": 1 }], [{ "total": 2 }]] }"#;
        let file: ReplayFile = serde_json::from_str(text).unwrap();
        assert_eq!(file.topics[&Topic::Processes].len(), 1);
        assert_eq!(file.topics[&Topic::Memory].len(), 2);
    }
}
