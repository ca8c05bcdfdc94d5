//! View state and the mode/sort/column controls that edit it.
//!
//! `ViewState` belongs to the presentation layer. The projector only reads
//! it; nothing here touches recorded history, so toggling modes or columns
//! can never lose data.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::topic::Topic;

/// Which projection a view renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// Latest snapshot only.
    #[default]
    Instantaneous,
    /// Each entity's accumulated window.
    History,
}

impl ViewMode {
    pub fn toggle(self) -> Self {
        match self {
            Self::Instantaneous => Self::History,
            Self::History => Self::Instantaneous,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Instantaneous => "live",
            Self::History => "history",
        }
    }
}

impl FromStr for ViewMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instantaneous" | "instant" | "live" | "realtime" => Ok(Self::Instantaneous),
            "history" | "hist" => Ok(Self::History),
            other => Err(Error::InvalidParameter(format!("view mode '{other}'"))),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn flip(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            Self::Ascending => "↑",
            Self::Descending => "↓",
        }
    }
}

impl FromStr for SortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            other => Err(Error::InvalidParameter(format!("sort direction '{other}'"))),
        }
    }
}

/// Row ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Keep provider-delivered order.
    Provider,
    Cpu,
    Memory,
    Name,
    Id,
}

impl SortKey {
    pub const ALL: [SortKey; 5] = [
        SortKey::Provider,
        SortKey::Cpu,
        SortKey::Memory,
        SortKey::Name,
        SortKey::Id,
    ];

    /// Direction used when this key is first selected.
    pub fn default_direction(self) -> SortDirection {
        match self {
            Self::Cpu | Self::Memory => SortDirection::Descending,
            Self::Provider | Self::Name | Self::Id => SortDirection::Ascending,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Name => "name",
            Self::Id => "id",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "provider" | "none" => Ok(Self::Provider),
            "cpu" => Ok(Self::Cpu),
            "memory" | "mem" => Ok(Self::Memory),
            "name" => Ok(Self::Name),
            "id" | "pid" => Ok(Self::Id),
            other => Err(Error::InvalidParameter(format!("sort key '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// ViewState
// ---------------------------------------------------------------------------

/// Presentation-owned view parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub mode: ViewMode,
    pub sort_key: SortKey,
    pub sort_direction: SortDirection,
    pub filter_text: String,
    /// Visible column names, kept in catalog order.
    pub visible_columns: Vec<String>,
}

impl ViewState {
    /// Defaults for a freshly opened view on `topic`. Process tables start
    /// sorted by CPU, busiest first; the other topics keep provider order.
    pub fn for_topic(topic: Topic) -> Self {
        let sort_key = match topic {
            Topic::Processes => SortKey::Cpu,
            Topic::CpuCores | Topic::Memory => SortKey::Provider,
        };
        Self {
            mode: ViewMode::default(),
            sort_key,
            sort_direction: sort_key.default_direction(),
            filter_text: String::new(),
            visible_columns: topic
                .columns()
                .iter()
                .filter(|c| topic.default_columns().contains(&c.name))
                .map(|c| c.name.to_string())
                .collect(),
        }
    }

    pub fn toggle_mode(&mut self) -> ViewMode {
        self.mode = self.mode.toggle();
        self.mode
    }

    pub fn set_mode(&mut self, mode: ViewMode) {
        self.mode = mode;
    }

    /// Select a sort key. Re-selecting the current key flips direction; a
    /// new key starts in its default direction.
    pub fn sort_by(&mut self, key: SortKey) {
        if key == self.sort_key {
            self.sort_direction = self.sort_direction.flip();
        } else {
            self.sort_key = key;
            self.sort_direction = key.default_direction();
        }
    }

    pub fn set_filter(&mut self, text: impl Into<String>) {
        self.filter_text = text.into();
    }

    pub fn is_visible(&self, column: &str) -> bool {
        self.visible_columns.iter().any(|c| c == column)
    }

    /// Show or hide a column. Returns whether it is visible afterwards.
    pub fn toggle_column(&mut self, topic: Topic, column: &str) -> Result<bool> {
        if topic.column(column).is_none() {
            return Err(Error::UnknownColumn(column.to_string()));
        }
        if self.is_visible(column) {
            self.visible_columns.retain(|c| c != column);
            return Ok(false);
        }
        self.visible_columns.push(column.to_string());
        let catalog = topic.columns();
        self.visible_columns
            .sort_by_key(|name| catalog.iter().position(|c| c.name == name.as_str()));
        Ok(true)
    }

    /// Replace the visible set from a comma-separated list.
    pub fn set_columns(&mut self, topic: Topic, list: &str) -> Result<()> {
        let mut next = ViewState {
            visible_columns: Vec::new(),
            ..self.clone()
        };
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if !next.is_visible(name) {
                next.toggle_column(topic, name)?;
            }
        }
        self.visible_columns = next.visible_columns;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_defaults_match_table() {
        let v = ViewState::for_topic(Topic::Processes);
        assert_eq!(v.sort_key, SortKey::Cpu);
        assert_eq!(v.sort_direction, SortDirection::Descending);
        assert_eq!(v.visible_columns, vec!["pid", "name", "cpu", "memory", "command"]);
        assert_eq!(v.mode, ViewMode::Instantaneous);
        assert!(v.filter_text.is_empty());
    }

    #[test]
    fn test_sort_by_same_key_flips() {
        let mut v = ViewState::for_topic(Topic::Processes);
        v.sort_by(SortKey::Cpu);
        assert_eq!(v.sort_direction, SortDirection::Ascending);
        v.sort_by(SortKey::Cpu);
        assert_eq!(v.sort_direction, SortDirection::Descending);
    }

    #[test]
    fn test_sort_by_new_key_uses_default_direction() {
        let mut v = ViewState::for_topic(Topic::Processes);
        v.sort_by(SortKey::Name);
        assert_eq!(v.sort_direction, SortDirection::Ascending);
        v.sort_by(SortKey::Memory);
        assert_eq!(v.sort_direction, SortDirection::Descending);
        v.sort_by(SortKey::Id);
        assert_eq!(v.sort_direction, SortDirection::Ascending);
    }

    #[test]
    fn test_toggle_column_keeps_catalog_order() {
        let mut v = ViewState::for_topic(Topic::Processes);
        assert!(v.toggle_column(Topic::Processes, "run_time").unwrap());
        assert!(!v.toggle_column(Topic::Processes, "name").unwrap());
        assert!(v.toggle_column(Topic::Processes, "name").unwrap());
        let pos = |c: &str| v.visible_columns.iter().position(|x| x == c).unwrap();
        assert!(pos("pid") < pos("name"));
        assert!(pos("command") < pos("run_time"));
    }

    #[test]
    fn test_toggle_unknown_column_errors() {
        let mut v = ViewState::for_topic(Topic::CpuCores);
        assert!(matches!(
            v.toggle_column(Topic::CpuCores, "pid"),
            Err(Error::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_set_columns_replaces_set() {
        let mut v = ViewState::for_topic(Topic::Processes);
        v.set_columns(Topic::Processes, "memory, pid").unwrap();
        assert_eq!(v.visible_columns, vec!["pid", "memory"]);
        assert!(v.set_columns(Topic::Processes, "pid,bogus").is_err());
        assert_eq!(v.visible_columns, vec!["pid", "memory"]);
    }

    #[test]
    fn test_mode_toggle_roundtrip() {
        let mut v = ViewState::for_topic(Topic::Memory);
        assert_eq!(v.toggle_mode(), ViewMode::History);
        assert_eq!(v.toggle_mode(), ViewMode::Instantaneous);
    }

    #[test]
    fn test_parse_controls() {
        assert_eq!("desc".parse::<SortDirection>().unwrap(), SortDirection::Descending);
        assert_eq!("pid".parse::<SortKey>().unwrap(), SortKey::Id);
        assert_eq!("history".parse::<ViewMode>().unwrap(), ViewMode::History);
        assert!("sideways".parse::<SortDirection>().is_err());
    }
}
