//! Dashboard configuration shared by the CLI and the HTTP server.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::provider::{DEFAULT_INTERVAL, MIN_INTERVAL, TopicParams};
use crate::store::{DEFAULT_CAPACITY, Retention};
use crate::topic::Topic;
use crate::view::ViewState;

/// Configuration for a dashboard front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Samples kept per entity.
    pub capacity: usize,
    /// Optional age limit on history, on top of `capacity`.
    pub max_age: Option<Duration>,
    /// Provider push interval.
    pub interval: Duration,
    /// Topic shown first.
    pub topic: Topic,
    /// Per-topic overrides of the default visible columns.
    pub columns: BTreeMap<Topic, Vec<String>>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_age: None,
            interval: DEFAULT_INTERVAL,
            topic: Topic::CpuCores,
            columns: BTreeMap::new(),
        }
    }
}

impl DashboardConfig {
    /// Reject values the core cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidParameter("capacity: must be at least 1".into()));
        }
        if self.interval < MIN_INTERVAL {
            return Err(Error::InvalidParameter(format!(
                "interval: {:?} is below the {:?} minimum",
                self.interval, MIN_INTERVAL
            )));
        }
        if self.max_age.is_some_and(|age| age.is_zero()) {
            return Err(Error::InvalidParameter("max age: must be positive".into()));
        }
        for (topic, names) in &self.columns {
            for name in names {
                if topic.column(name).is_none() {
                    return Err(Error::UnknownColumn(format!("{topic}.{name}")));
                }
            }
        }
        Ok(())
    }

    pub fn retention(&self) -> Retention {
        let retention = Retention::samples(self.capacity);
        match self.max_age {
            Some(age) => retention.with_max_age_ms(age.as_millis() as u64),
            None => retention,
        }
    }

    pub fn params(&self) -> TopicParams {
        TopicParams {
            interval: self.interval,
        }
    }

    /// Override the visible columns of one topic from a comma-separated list.
    pub fn set_columns(&mut self, topic: Topic, list: &str) -> Result<()> {
        let mut view = ViewState::for_topic(topic);
        view.set_columns(topic, list)?;
        self.columns.insert(topic, view.visible_columns);
        Ok(())
    }

    /// Initial view for `topic`, with any configured column override.
    pub fn view_for(&self, topic: Topic) -> ViewState {
        let mut view = ViewState::for_topic(topic);
        if let Some(columns) = self.columns.get(&topic) {
            view.visible_columns = columns.clone();
        }
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let c = DashboardConfig::default();
        c.validate().unwrap();
        assert_eq!(c.retention(), Retention::samples(60));
        assert_eq!(c.params().interval, Duration::from_secs(1));
    }

    #[test]
    fn test_rejects_zero_capacity_and_fast_interval() {
        let c = DashboardConfig {
            capacity: 0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(Error::InvalidParameter(_))));

        let c = DashboardConfig {
            interval: Duration::from_millis(10),
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_max_age_flows_into_retention() {
        let c = DashboardConfig {
            max_age: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        assert_eq!(c.retention().max_age_ms, Some(30_000));
    }

    #[test]
    fn test_column_override() {
        let mut c = DashboardConfig::default();
        c.set_columns(Topic::Processes, "pid,status").unwrap();
        assert_eq!(c.view_for(Topic::Processes).visible_columns, vec!["pid", "status"]);
        assert_eq!(
            c.view_for(Topic::Memory).visible_columns,
            ViewState::for_topic(Topic::Memory).visible_columns
        );
        assert!(c.set_columns(Topic::CpuCores, "pid").is_err());
        c.validate().unwrap();
    }
}
