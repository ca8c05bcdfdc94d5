//! Subscription lifecycle for one topic view.
//!
//! A [`SubscriptionController`] owns a session, the receiving end of its
//! inbound queue, and the reconciler that the queue feeds. Teardown is a
//! single step: mark the session stopped, drop the receiver, then send the
//! provider its stop signal. Repeated teardown is a no-op, so the provider
//! sees exactly one stop per session no matter how often a view pauses or
//! unmounts.
//!
//! Each session has its own channel. Once the receiver is dropped, a late
//! push fails at the sink with [`Error::StaleDelivery`] and never reaches the
//! reconciler.

use std::sync::Arc;
use std::sync::mpsc::Receiver;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::projector::{Projection, project};
use crate::provider::{Delivery, DeliveryBody, MetricsProvider, SnapshotSink, TopicParams};
use crate::reconcile::Reconciler;
use crate::session::{SessionState, SubscriptionSession};
use crate::snapshot::{Snapshot, unix_ms_now};
use crate::store::{HistoryStore, Retention};
use crate::topic::Topic;
use crate::view::ViewState;

/// Outcome of one [`SubscriptionController::pump`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PumpStats {
    /// Deliveries reconciled into the store.
    pub applied: usize,
    /// Deliveries dropped because they failed validation.
    pub malformed: usize,
}

impl PumpStats {
    pub fn total(&self) -> usize {
        self.applied + self.malformed
    }
}

/// Lifecycle owner for one topic subscription.
pub struct SubscriptionController {
    provider: Arc<dyn MetricsProvider>,
    params: TopicParams,
    session: SubscriptionSession,
    inbox: Option<Receiver<Delivery>>,
    reconciler: Reconciler,
}

impl SubscriptionController {
    /// Create a controller in the `created` state. Nothing is requested from
    /// the provider until [`start`](Self::start).
    pub fn new(
        provider: Arc<dyn MetricsProvider>,
        topic: Topic,
        retention: Retention,
        params: TopicParams,
    ) -> Self {
        Self {
            provider,
            params,
            session: SubscriptionSession::new(topic),
            inbox: None,
            reconciler: Reconciler::new(topic, retention),
        }
    }

    /// Ask the provider to begin pushing. On `ProviderUnavailable` the
    /// session stays `created` and the call may be retried.
    pub fn start(&mut self) -> Result<&SubscriptionSession> {
        if self.session.state() != SessionState::Created {
            return Err(Error::InvalidTransition {
                from: self.session.state(),
                to: SessionState::Started,
            });
        }

        let topic = self.session.topic;
        let (sink, rx) = SnapshotSink::channel(self.session.id, topic);
        if let Err(e) = self.provider.start_topic(topic, &self.params, sink) {
            log::warn!("{}: cannot start {topic}: {e}", self.provider.name());
            return Err(e);
        }

        self.inbox = Some(rx);
        self.session.mark_started(unix_ms_now())?;
        log::debug!(
            "started {topic} session {} via {}",
            self.session.id,
            self.provider.name()
        );
        Ok(&self.session)
    }

    /// Drain every queued delivery, in arrival order, into the reconciler.
    pub fn pump(&mut self) -> PumpStats {
        let mut stats = PumpStats::default();
        let Some(inbox) = &self.inbox else {
            return stats;
        };

        let deliveries: Vec<Delivery> = inbox.try_iter().collect();
        for delivery in deliveries {
            match self.apply(delivery) {
                Ok(_) => stats.applied += 1,
                Err(e) => {
                    log::warn!("{}: dropping snapshot: {e}", self.session.topic);
                    stats.malformed += 1;
                }
            }
        }
        stats
    }

    fn apply(&mut self, delivery: Delivery) -> Result<()> {
        let snapshot = match delivery.body {
            DeliveryBody::Records(records) => {
                Snapshot::at(delivery.topic, records, delivery.arrival_unix_ms)
            }
            DeliveryBody::Json(value) => {
                Snapshot::from_json(delivery.topic, &value, delivery.arrival_unix_ms)?
            }
        };
        self.reconciler.apply(snapshot).map(|_| ())
    }

    /// Tear the session down. Returns true only for the call that actually
    /// stopped it; later calls do nothing.
    pub fn stop(&mut self) -> bool {
        let was_started = self.session.is_started();
        if !self.session.mark_stopped(unix_ms_now()) {
            return false;
        }
        self.inbox = None;
        if was_started {
            self.provider
                .stop_topic(self.session.topic, self.session.id);
        }
        log::debug!("stopped {} session {}", self.session.topic, self.session.id);
        true
    }

    /// Stop pushing without discarding history.
    pub fn pause(&mut self) -> bool {
        self.stop()
    }

    /// Open a new session over the same reconciler. A no-op while the
    /// current session is still live.
    pub fn resume(&mut self) -> Result<&SubscriptionSession> {
        if self.session.is_started() {
            return Ok(&self.session);
        }
        if self.session.is_stopped() {
            self.session = SubscriptionSession::new(self.session.topic);
        }
        self.start()
    }

    pub fn topic(&self) -> Topic {
        self.session.topic
    }

    pub fn session(&self) -> &SubscriptionSession {
        &self.session
    }

    pub fn is_live(&self) -> bool {
        self.session.is_started()
    }

    pub fn params(&self) -> &TopicParams {
        &self.params
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn store(&self) -> &HistoryStore {
        self.reconciler.store()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.reconciler.latest()
    }

    /// Project the current state for display.
    pub fn project(&self, view: &ViewState) -> Projection {
        project(
            self.session.topic,
            self.reconciler.store(),
            self.reconciler.latest(),
            view,
        )
    }
}

impl Drop for SubscriptionController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ScriptedProvider;
    use crate::snapshot::EntityRecord;

    fn controller(p: &Arc<ScriptedProvider>, topic: Topic) -> SubscriptionController {
        let provider: Arc<dyn MetricsProvider> = p.clone();
        SubscriptionController::new(provider, topic, Retention::default(), TopicParams::default())
    }

    fn core(name: &str, usage: f64) -> EntityRecord {
        EntityRecord::new(name).field("core_usage", usage)
    }

    // -----------------------------------------------------------------------
    // Start
    // -----------------------------------------------------------------------

    #[test]
    fn test_start_then_pump_applies_scripted_snapshots() {
        let p = Arc::new(ScriptedProvider::new());
        p.script(Topic::CpuCores, vec![core("cpu0", 1.0)]);
        p.script(Topic::CpuCores, vec![core("cpu0", 2.0)]);
        let mut c = controller(&p, Topic::CpuCores);
        c.start().unwrap();
        let stats = c.pump();
        assert_eq!(stats.applied, 2);
        assert_eq!(c.reconciler().cycles(), 2);
        assert_eq!(c.store().total_samples(), 2);
    }

    #[test]
    fn test_refused_start_is_retryable() {
        let p = Arc::new(ScriptedProvider::new());
        p.refuse_starts(true);
        let mut c = controller(&p, Topic::Memory);
        assert!(matches!(c.start(), Err(Error::ProviderUnavailable(_))));
        assert_eq!(c.session().state(), SessionState::Created);
        assert_eq!(c.pump(), PumpStats::default());

        p.refuse_starts(false);
        c.start().unwrap();
        assert!(c.is_live());
    }

    #[test]
    fn test_double_start_rejected() {
        let p = Arc::new(ScriptedProvider::new());
        let mut c = controller(&p, Topic::Memory);
        c.start().unwrap();
        assert!(matches!(c.start(), Err(Error::InvalidTransition { .. })));
        assert_eq!(p.start_count(Topic::Memory), 1);
    }

    // -----------------------------------------------------------------------
    // Pump
    // -----------------------------------------------------------------------

    #[test]
    fn test_malformed_delivery_dropped_and_pumping_continues() {
        let p = Arc::new(ScriptedProvider::new());
        let mut c = controller(&p, Topic::Processes);
        c.start().unwrap();
        p.push_json(Topic::Processes, serde_json::json!([{ "pid": 1, "cpu_usage": 1.0 }]));
        p.push_json(Topic::Processes, serde_json::json!({ "not": "an array" }));
        p.push_json(Topic::Processes, serde_json::json!([{ "pid": 1, "cpu_usage": 2.0 }]));
        let stats = c.pump();
        assert_eq!((stats.applied, stats.malformed), (2, 1));
        assert_eq!(c.store().total_samples(), 2);
    }

    #[test]
    fn test_pump_preserves_arrival_order() {
        let p = Arc::new(ScriptedProvider::new());
        let mut c = controller(&p, Topic::CpuCores);
        c.start().unwrap();
        for v in 1..=5 {
            p.push(Topic::CpuCores, vec![core("cpu0", v as f64)]);
        }
        c.pump();
        let series = c.store().get(&"cpu0".into()).unwrap();
        assert_eq!(series.values("core_usage"), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    #[test]
    fn test_double_stop_reaches_provider_once() {
        let p = Arc::new(ScriptedProvider::new());
        let mut c = controller(&p, Topic::Processes);
        c.start().unwrap();
        assert!(c.pause());
        assert!(!c.stop());
        drop(c);
        assert_eq!(p.stop_count(Topic::Processes), 1);
    }

    #[test]
    fn test_drop_without_stop_tears_down() {
        let p = Arc::new(ScriptedProvider::new());
        {
            let mut c = controller(&p, Topic::Memory);
            c.start().unwrap();
        }
        assert_eq!(p.stop_count(Topic::Memory), 1);
        assert_eq!(p.live_sessions(), 0);
    }

    #[test]
    fn test_never_started_session_sends_no_stop() {
        let p = Arc::new(ScriptedProvider::new());
        let mut c = controller(&p, Topic::Memory);
        assert!(c.stop());
        assert_eq!(p.stop_count(Topic::Memory), 0);
        assert!(matches!(c.start(), Err(Error::InvalidTransition { .. })));
    }

    #[test]
    fn test_late_push_after_stop_is_not_reconciled() {
        let p = Arc::new(ScriptedProvider::new());
        let mut c = controller(&p, Topic::CpuCores);
        let session = c.start().unwrap().id;
        p.push(Topic::CpuCores, vec![core("cpu0", 1.0)]);
        c.pump();
        let before = c.store().clone();

        c.stop();
        assert_eq!(
            p.push_to(session, vec![core("cpu0", 99.0)]),
            Err(Error::StaleDelivery)
        );
        assert_eq!(c.pump(), PumpStats::default());
        assert_eq!(c.store(), &before);
    }

    #[test]
    fn test_queued_deliveries_dropped_with_stop() {
        let p = Arc::new(ScriptedProvider::new());
        let mut c = controller(&p, Topic::CpuCores);
        c.start().unwrap();
        p.push(Topic::CpuCores, vec![core("cpu0", 1.0)]);
        c.stop();
        assert_eq!(c.pump().total(), 0);
        assert!(c.store().is_empty());
    }

    // -----------------------------------------------------------------------
    // Pause / resume
    // -----------------------------------------------------------------------

    #[test]
    fn test_resume_opens_new_session_and_keeps_history() {
        let p = Arc::new(ScriptedProvider::new());
        let mut c = controller(&p, Topic::CpuCores);
        let first = c.start().unwrap().id;
        p.push(Topic::CpuCores, vec![core("cpu0", 1.0)]);
        c.pump();

        c.pause();
        let second = c.resume().unwrap().id;
        assert_ne!(first, second);
        p.push(Topic::CpuCores, vec![core("cpu0", 2.0)]);
        c.pump();

        let series = c.store().get(&"cpu0".into()).unwrap();
        assert_eq!(series.values("core_usage"), vec![1.0, 2.0]);
        assert_eq!(p.start_count(Topic::CpuCores), 2);
        assert_eq!(p.stop_count(Topic::CpuCores), 1);
    }

    #[test]
    fn test_resume_while_live_is_noop() {
        let p = Arc::new(ScriptedProvider::new());
        let mut c = controller(&p, Topic::Memory);
        let id = c.start().unwrap().id;
        assert_eq!(c.resume().unwrap().id, id);
        assert_eq!(p.start_count(Topic::Memory), 1);
    }
}
