//! Display projections.
//!
//! [`project`] turns reconciler output plus a [`ViewState`] into something a
//! table or chart can render. It is a pure function: it borrows the store and
//! latest snapshot, clones what it returns, and keeps no state between calls.
//!
//! Instantaneous mode reads the latest snapshot (filter → stable sort →
//! column limit). History mode reads the store, one series per key in
//! first-seen order, with samples limited to visible numeric columns.

use std::cmp::Ordering;

use serde::Serialize;

use crate::snapshot::{EntityKey, EntityRecord, Sample, Snapshot};
use crate::store::HistoryStore;
use crate::topic::{Column, ColumnSource, Topic};
use crate::view::{SortDirection, SortKey, ViewMode, ViewState};

/// One rendered cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Missing,
}

impl CellValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(_) | Self::Missing => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub column: &'static str,
    pub value: CellValue,
}

/// One table row in instantaneous mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRow {
    pub key: EntityKey,
    pub cells: Vec<Cell>,
}

impl DisplayRow {
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|c| c.column == column)
            .map(|c| &c.value)
    }
}

/// One chartable series in history mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesView {
    pub key: EntityKey,
    /// Display name from the latest snapshot, when the topic has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub capacity: usize,
    pub samples: Vec<Sample>,
}

/// Result of a projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Projection {
    Instantaneous {
        columns: Vec<&'static str>,
        rows: Vec<DisplayRow>,
    },
    History {
        columns: Vec<&'static str>,
        series: Vec<SeriesView>,
    },
}

impl Projection {
    pub fn mode(&self) -> ViewMode {
        match self {
            Self::Instantaneous { .. } => ViewMode::Instantaneous,
            Self::History { .. } => ViewMode::History,
        }
    }

    /// Number of rows or series.
    pub fn len(&self) -> usize {
        match self {
            Self::Instantaneous { rows, .. } => rows.len(),
            Self::History { series, .. } => series.len(),
        }
    }

    /// True when there is nothing to show yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Project reconciler output for display.
pub fn project(
    topic: Topic,
    store: &HistoryStore,
    latest: Option<&Snapshot>,
    view: &ViewState,
) -> Projection {
    let columns = visible_columns(topic, view);
    let column_names = columns.iter().map(|c| c.name).collect();

    match view.mode {
        ViewMode::Instantaneous => {
            let rows = latest
                .map(|snap| instantaneous_rows(topic, snap, view, &columns))
                .unwrap_or_default();
            Projection::Instantaneous {
                columns: column_names,
                rows,
            }
        }
        ViewMode::History => Projection::History {
            columns: column_names,
            series: history_series(store, latest, view, &columns),
        },
    }
}

fn visible_columns(topic: Topic, view: &ViewState) -> Vec<&'static Column> {
    topic
        .columns()
        .iter()
        .filter(|c| view.is_visible(c.name))
        .collect()
}

fn instantaneous_rows(
    topic: Topic,
    snapshot: &Snapshot,
    view: &ViewState,
    columns: &[&'static Column],
) -> Vec<DisplayRow> {
    let mut records = filter_records(&snapshot.entities, &view.filter_text);
    sort_records(&mut records, topic, view.sort_key, view.sort_direction);
    records
        .into_iter()
        .map(|record| DisplayRow {
            key: record.key.clone(),
            cells: columns
                .iter()
                .map(|col| Cell {
                    column: col.name,
                    value: cell_value(record, col),
                })
                .collect(),
        })
        .collect()
}

fn history_series(
    store: &HistoryStore,
    latest: Option<&Snapshot>,
    view: &ViewState,
    columns: &[&'static Column],
) -> Vec<SeriesView> {
    let needle = view.filter_text.to_lowercase();
    let fields: Vec<&str> = columns
        .iter()
        .filter_map(|c| match c.source {
            ColumnSource::Field(f) => Some(f),
            ColumnSource::Key | ColumnSource::Label(_) => None,
        })
        .collect();

    store
        .iter()
        .filter_map(|series| {
            let record = latest.and_then(|s| latest_record(s, series.key()));
            let matches = match record {
                Some(r) => matches_filter(r, &needle),
                None => needle.is_empty() || series.key().as_str().to_lowercase().contains(&needle),
            };
            if !matches {
                return None;
            }
            Some(SeriesView {
                key: series.key().clone(),
                name: record.and_then(|r| r.get_label("name")).map(str::to_string),
                capacity: series.capacity(),
                samples: series
                    .samples()
                    .map(|s| Sample {
                        timestamp_ms: s.timestamp_ms,
                        fields: s
                            .fields
                            .iter()
                            .filter(|(k, _)| fields.iter().any(|f| f == k))
                            .map(|(k, v)| (k.clone(), *v))
                            .collect(),
                    })
                    .collect(),
            })
        })
        .collect()
}

/// Last occurrence of `key` in the snapshot; later duplicates win.
fn latest_record<'a>(snapshot: &'a Snapshot, key: &EntityKey) -> Option<&'a EntityRecord> {
    snapshot.entities.iter().rev().find(|r| &r.key == key)
}

fn cell_value(record: &EntityRecord, column: &Column) -> CellValue {
    match column.source {
        ColumnSource::Key => CellValue::Text(record.key.to_string()),
        ColumnSource::Field(f) => record.get(f).map_or(CellValue::Missing, CellValue::Number),
        ColumnSource::Label(l) => record
            .get_label(l)
            .map_or(CellValue::Missing, |s| CellValue::Text(s.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Filter / sort
// ---------------------------------------------------------------------------

/// Labels searched by the filter, in addition to the key.
const SEARCHABLE_LABELS: [&str; 2] = ["name", "exe"];

/// Case-insensitive substring match against name, executable path and key.
/// `needle` must already be lowercased.
fn matches_filter(record: &EntityRecord, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    SEARCHABLE_LABELS
        .iter()
        .filter_map(|l| record.get_label(l))
        .any(|v| v.to_lowercase().contains(needle))
        || record.key.as_str().to_lowercase().contains(needle)
}

/// Records matching `filter_text`, in their original order.
pub fn filter_records<'a>(records: &'a [EntityRecord], filter_text: &str) -> Vec<&'a EntityRecord> {
    let needle = filter_text.to_lowercase();
    records
        .iter()
        .filter(|r| matches_filter(r, &needle))
        .collect()
}

/// Stable sort: records comparing equal keep their relative order in both
/// directions.
pub fn sort_records(
    records: &mut [&EntityRecord],
    topic: Topic,
    key: SortKey,
    direction: SortDirection,
) {
    if key == SortKey::Provider {
        return;
    }
    records.sort_by(|a, b| {
        let ord = compare(a, b, topic, key);
        match direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });
}

fn compare(a: &EntityRecord, b: &EntityRecord, topic: Topic, key: SortKey) -> Ordering {
    match key {
        SortKey::Provider => Ordering::Equal,
        SortKey::Cpu => compare_field(a, b, topic.cpu_field()),
        SortKey::Memory => compare_field(a, b, topic.memory_field()),
        SortKey::Name => display_name(a).to_lowercase().cmp(&display_name(b).to_lowercase()),
        SortKey::Id => id_order(a).cmp(&id_order(b)),
    }
}

/// Numeric ids first in numeric order, then the rest by string.
fn id_order(record: &EntityRecord) -> (bool, Option<u64>, &EntityKey) {
    let n = record.key.as_u64();
    (n.is_none(), n, &record.key)
}

fn compare_field(a: &EntityRecord, b: &EntityRecord, field: Option<&str>) -> Ordering {
    let Some(field) = field else {
        return Ordering::Equal;
    };
    let va = a.get(field).unwrap_or(f64::NEG_INFINITY);
    let vb = b.get(field).unwrap_or(f64::NEG_INFINITY);
    va.total_cmp(&vb)
}

fn display_name(record: &EntityRecord) -> &str {
    record.get_label("name").unwrap_or(record.key.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::reconcile;

    fn proc(pid: u32, name: &str, exe: &str, cpu: f64, mem: f64) -> EntityRecord {
        EntityRecord::new(pid)
            .label("name", name)
            .label("exe", exe)
            .field("cpu_usage", cpu)
            .field("memory", mem)
    }

    fn procs() -> Snapshot {
        Snapshot::at(
            Topic::Processes,
            vec![
                proc(30, "bash", "/bin/bash", 1.0, 300.0),
                proc(10, "Chrome", "/opt/google/chrome/chrome", 5.0, 900.0),
                proc(20, "helper", "/opt/google/chrome/chrome_crashpad", 1.0, 100.0),
                proc(40, "zsh", "/bin/zsh", 1.0, 300.0),
            ],
            1,
        )
    }

    fn keys(p: &Projection) -> Vec<String> {
        match p {
            Projection::Instantaneous { rows, .. } => rows.iter().map(|r| r.key.to_string()).collect(),
            Projection::History { series, .. } => series.iter().map(|s| s.key.to_string()).collect(),
        }
    }

    fn view(key: SortKey) -> ViewState {
        let mut v = ViewState::for_topic(Topic::Processes);
        v.sort_key = key;
        v.sort_direction = key.default_direction();
        v
    }

    // -----------------------------------------------------------------------
    // Filter
    // -----------------------------------------------------------------------

    #[test]
    fn test_filter_matches_name_or_exe_case_insensitive() {
        let snap = procs();
        let hits = filter_records(&snap.entities, "CHR");
        let pids: Vec<&str> = hits.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(pids, vec!["10", "20"]);
    }

    #[test]
    fn test_filter_matches_pid_as_string() {
        let snap = procs();
        let hits = filter_records(&snap.entities, "4");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key.as_str(), "40");
    }

    #[test]
    fn test_empty_filter_returns_all_in_order() {
        let snap = procs();
        let hits = filter_records(&snap.entities, "");
        let pids: Vec<&str> = hits.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(pids, vec!["30", "10", "20", "40"]);
    }

    #[test]
    fn test_filter_whitespace_is_part_of_the_needle() {
        let snap = procs();
        assert!(filter_records(&snap.entities, "   ").is_empty());
        assert!(filter_records(&snap.entities, "chr ").is_empty());
    }

    // -----------------------------------------------------------------------
    // Sort
    // -----------------------------------------------------------------------

    #[test]
    fn test_sort_cpu_desc_ties_keep_provider_order() {
        let snap = procs();
        let store = HistoryStore::default();
        let p = project(Topic::Processes, &store, Some(&snap), &view(SortKey::Cpu));
        assert_eq!(keys(&p), vec!["10", "30", "20", "40"]);
    }

    #[test]
    fn test_sort_ascending_ties_keep_provider_order() {
        let snap = procs();
        let store = HistoryStore::default();
        let mut v = view(SortKey::Cpu);
        v.sort_direction = SortDirection::Ascending;
        let p = project(Topic::Processes, &store, Some(&snap), &v);
        assert_eq!(keys(&p), vec!["30", "20", "40", "10"]);
    }

    #[test]
    fn test_sort_is_stable_across_reprojection() {
        let snap = procs();
        let store = HistoryStore::default();
        let v = view(SortKey::Memory);
        let first = project(Topic::Processes, &store, Some(&snap), &v);
        for _ in 0..10 {
            assert_eq!(project(Topic::Processes, &store, Some(&snap), &v), first);
        }
        assert_eq!(keys(&first), vec!["10", "30", "40", "20"]);
    }

    #[test]
    fn test_sort_name_and_id() {
        let snap = procs();
        let store = HistoryStore::default();
        let p = project(Topic::Processes, &store, Some(&snap), &view(SortKey::Name));
        assert_eq!(keys(&p), vec!["30", "10", "20", "40"]);
        let p = project(Topic::Processes, &store, Some(&snap), &view(SortKey::Id));
        assert_eq!(keys(&p), vec!["10", "20", "30", "40"]);
    }

    #[test]
    fn test_id_sort_with_mixed_keys_is_total() {
        let raw = ["9", "10", "1a", "b", "2", "100", "1a", "x9", "0", "33"];
        let records: Vec<EntityRecord> = raw
            .iter()
            .cycle()
            .take(64)
            .enumerate()
            .map(|(i, k)| EntityRecord::new(format!("{k}{}", if i % 3 == 0 { "" } else { "z" })))
            .collect();
        let snap = Snapshot::at(Topic::Processes, records, 1);
        let p = project(
            Topic::Processes,
            &HistoryStore::default(),
            Some(&snap),
            &view(SortKey::Id),
        );
        let got = keys(&p);
        assert_eq!(got.len(), 64);
        let numeric = got.iter().take_while(|k| k.parse::<u64>().is_ok()).count();
        let nums: Vec<u64> = got[..numeric].iter().map(|k| k.parse().unwrap()).collect();
        assert!(nums.windows(2).all(|w| w[0] <= w[1]));
        assert!(got[numeric..].iter().all(|k| k.parse::<u64>().is_err()));
        assert!(got[numeric..].windows(2).all(|w| w[0] <= w[1]));

        let small = Snapshot::at(
            Topic::Processes,
            vec![EntityRecord::new("1a"), EntityRecord::new("10"), EntityRecord::new("9")],
            1,
        );
        let p = project(
            Topic::Processes,
            &HistoryStore::default(),
            Some(&small),
            &view(SortKey::Id),
        );
        assert_eq!(keys(&p), vec!["9", "10", "1a"]);
    }

    #[test]
    fn test_provider_sort_keeps_order() {
        let snap = procs();
        let p = project(
            Topic::Processes,
            &HistoryStore::default(),
            Some(&snap),
            &view(SortKey::Provider),
        );
        assert_eq!(keys(&p), vec!["30", "10", "20", "40"]);
    }

    // -----------------------------------------------------------------------
    // Columns / modes
    // -----------------------------------------------------------------------

    #[test]
    fn test_columns_limit_cells_without_touching_records() {
        let snap = procs();
        let before = snap.clone();
        let mut v = view(SortKey::Provider);
        v.set_columns(Topic::Processes, "pid,cpu").unwrap();
        let p = project(Topic::Processes, &HistoryStore::default(), Some(&snap), &v);
        let Projection::Instantaneous { columns, rows } = p else {
            panic!("expected instantaneous projection");
        };
        assert_eq!(columns, vec!["pid", "cpu"]);
        assert_eq!(rows[0].cells.len(), 2);
        assert_eq!(rows[0].get("cpu"), Some(&CellValue::Number(1.0)));
        assert_eq!(rows[0].get("name"), None);
        assert_eq!(snap, before);
    }

    #[test]
    fn test_missing_field_renders_missing() {
        let snap = Snapshot::at(Topic::Processes, vec![EntityRecord::new(1u32)], 0);
        let p = project(
            Topic::Processes,
            &HistoryStore::default(),
            Some(&snap),
            &view(SortKey::Cpu),
        );
        let Projection::Instantaneous { rows, .. } = p else {
            panic!("expected instantaneous projection");
        };
        assert_eq!(rows[0].get("cpu"), Some(&CellValue::Missing));
    }

    #[test]
    fn test_no_snapshot_projects_empty() {
        let p = project(
            Topic::CpuCores,
            &HistoryStore::default(),
            None,
            &ViewState::for_topic(Topic::CpuCores),
        );
        assert!(p.is_empty());
        assert_eq!(p.mode(), ViewMode::Instantaneous);
    }

    #[test]
    fn test_history_mode_reads_store_and_leaves_it_untouched() {
        let mut store = HistoryStore::with_capacity(60);
        let mut latest = None;
        for ts in 1..=3u64 {
            let snap = Snapshot::at(
                Topic::CpuCores,
                vec![
                    EntityRecord::new("cpu0").field("core_usage", ts as f64).field("frequency", 3000.0),
                    EntityRecord::new("cpu1").field("core_usage", 0.0).field("frequency", 2800.0),
                ],
                ts,
            );
            store = reconcile(store, &snap);
            latest = Some(snap);
        }
        let before = store.clone();

        let mut v = ViewState::for_topic(Topic::CpuCores);
        let live = project(Topic::CpuCores, &store, latest.as_ref(), &v);
        v.toggle_mode();
        let hist = project(Topic::CpuCores, &store, latest.as_ref(), &v);
        v.toggle_mode();
        let live_again = project(Topic::CpuCores, &store, latest.as_ref(), &v);

        assert_eq!(store, before);
        assert_eq!(live, live_again);
        let Projection::History { series, .. } = hist else {
            panic!("expected history projection");
        };
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].key.as_str(), "cpu0");
        assert_eq!(series[0].samples.len(), 3);
        assert_eq!(series[0].samples[2].get("core_usage"), Some(3.0));
        assert_eq!(series[0].capacity, 60);
    }

    #[test]
    fn test_history_samples_limited_to_visible_fields() {
        let snap = Snapshot::at(
            Topic::CpuCores,
            vec![EntityRecord::new("cpu0").field("core_usage", 1.0).field("global_usage", 9.0)],
            1,
        );
        let store = reconcile(HistoryStore::default(), &snap);
        let mut v = ViewState::for_topic(Topic::CpuCores);
        v.set_mode(ViewMode::History);
        let Projection::History { series, .. } = project(Topic::CpuCores, &store, Some(&snap), &v)
        else {
            panic!("expected history projection");
        };
        assert_eq!(series[0].samples[0].get("core_usage"), Some(1.0));
        assert_eq!(series[0].samples[0].get("global_usage"), None);
    }

    #[test]
    fn test_history_filter_uses_latest_labels() {
        let snap = procs();
        let store = reconcile(HistoryStore::default(), &snap);
        let mut v = view(SortKey::Provider);
        v.set_mode(ViewMode::History);
        v.set_filter("chrome");
        let p = project(Topic::Processes, &store, Some(&snap), &v);
        assert_eq!(keys(&p), vec!["10", "20"]);
        let Projection::History { series, .. } = p else {
            panic!("expected history projection");
        };
        assert_eq!(series[0].name.as_deref(), Some("Chrome"));
    }
}
