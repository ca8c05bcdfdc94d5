//! Provider boundary.
//!
//! A [`MetricsProvider`] produces snapshots on its own schedule and writes
//! them into a [`SnapshotSink`] handed over at start. The consumer side keeps
//! the matching receiver and drains it with
//! [`SubscriptionController::pump`](crate::SubscriptionController::pump).
//! Dropping the receiver closes the sink, which is how a polling provider
//! notices that nobody is listening any more.

pub mod native;
pub mod scripted;

use std::sync::mpsc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::session::SessionId;
use crate::snapshot::{EntityRecord, unix_ms_now};
use crate::static_info::StaticInfo;
use crate::topic::{StaticTopic, Topic};

pub use native::NativeProvider;
pub use scripted::ScriptedProvider;

/// Default push interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Shortest push interval a provider is asked for.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Parameters of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicParams {
    /// Time between pushes.
    pub interval: Duration,
}

impl Default for TopicParams {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
        }
    }
}

/// Payload of one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryBody {
    /// Records already in core form.
    Records(Vec<EntityRecord>),
    /// Raw JSON records, parsed and validated on the consumer side.
    Json(serde_json::Value),
}

/// One message on a session's inbound queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub session: SessionId,
    pub topic: Topic,
    pub arrival_unix_ms: u64,
    pub body: DeliveryBody,
}

/// Write end of a session's inbound queue.
#[derive(Debug, Clone)]
pub struct SnapshotSink {
    session: SessionId,
    topic: Topic,
    tx: mpsc::Sender<Delivery>,
}

impl SnapshotSink {
    /// Create a sink and the receiver it feeds.
    pub fn channel(session: SessionId, topic: Topic) -> (Self, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel();
        (Self { session, topic, tx }, rx)
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Push typed records. Fails with [`Error::StaleDelivery`] once the
    /// consumer has torn the session down.
    pub fn push(&self, records: Vec<EntityRecord>) -> Result<()> {
        self.send(DeliveryBody::Records(records))
    }

    /// Push raw JSON records.
    pub fn push_json(&self, value: serde_json::Value) -> Result<()> {
        self.send(DeliveryBody::Json(value))
    }

    fn send(&self, body: DeliveryBody) -> Result<()> {
        self.tx
            .send(Delivery {
                session: self.session,
                topic: self.topic,
                arrival_unix_ms: unix_ms_now(),
                body,
            })
            .map_err(|_| Error::StaleDelivery)
    }
}

/// Source of streamed metrics and one-shot host information.
pub trait MetricsProvider: Send + Sync {
    /// Short provider name for logs and status lines.
    fn name(&self) -> &'static str;

    /// Begin pushing snapshots for `topic` into `sink`. Returning `Ok` is the
    /// acknowledgment; `Err(ProviderUnavailable)` leaves nothing running.
    fn start_topic(&self, topic: Topic, params: &TopicParams, sink: SnapshotSink) -> Result<()>;

    /// Stop the push loop of one session. Fire-and-forget.
    fn stop_topic(&self, topic: Topic, session: SessionId);

    /// Request/response host information.
    fn static_info(&self, kind: StaticTopic) -> Result<StaticInfo>;

    /// Terminate a process. Failures carry the reason in
    /// [`Error::CommandFailure`].
    fn kill_entity(&self, pid: u32) -> Result<()>;
}
