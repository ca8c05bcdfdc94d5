//! Push messages and the records they carry.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::topic::Topic;

/// Milliseconds since the unix epoch, used to stamp arrivals.
pub fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// EntityKey
// ---------------------------------------------------------------------------

/// Stable identifier of an entity within one topic (core name, pid, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric view of the key, for keys that are ids.
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u32> for EntityKey {
    fn from(id: u32) -> Self {
        Self(id.to_string())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One entity's values inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub key: EntityKey,
    /// Numeric metrics; these are what history records.
    pub fields: BTreeMap<String, f64>,
    /// Descriptive text (process name, executable, command line, status).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl EntityRecord {
    pub fn new(key: impl Into<EntityKey>) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }

    /// Builder: add a numeric field.
    pub fn field(mut self, name: &str, value: f64) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Builder: add a text label.
    pub fn label(mut self, name: &str, value: impl Into<String>) -> Self {
        self.labels.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.fields.get(field).copied()
    }

    pub fn get_label(&self, label: &str) -> Option<&str> {
        self.labels.get(label).map(String::as_str)
    }

    fn validate(&self) -> Result<()> {
        if self.key.as_str().trim().is_empty() {
            return Err(Error::MalformedSnapshot("record with empty key".into()));
        }
        if let Some((name, _)) = self.fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::MalformedSnapshot(format!(
                "field '{name}' of '{}' is not finite",
                self.key
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One push delivery: every entity the provider currently knows for a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub topic: Topic,
    pub entities: Vec<EntityRecord>,
    pub arrival_unix_ms: u64,
}

impl Snapshot {
    /// Build a snapshot stamped with the current time.
    pub fn new(topic: Topic, entities: Vec<EntityRecord>) -> Self {
        Self::at(topic, entities, unix_ms_now())
    }

    /// Build a snapshot with an explicit arrival time.
    pub fn at(topic: Topic, entities: Vec<EntityRecord>, arrival_unix_ms: u64) -> Self {
        Self {
            topic,
            entities,
            arrival_unix_ms,
        }
    }

    /// Basic shape validation: every record has a non-empty key and only
    /// finite numeric fields.
    pub fn validate(&self) -> Result<()> {
        self.entities.iter().try_for_each(EntityRecord::validate)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Parse a JSON array of flat records as pushed by a provider.
    ///
    /// The topic's key field may be a string or a number. Other numbers
    /// become fields, strings become labels, and arrays of strings (command
    /// lines) are joined with spaces into a label. Booleans and nulls are
    /// ignored.
    pub fn from_json(topic: Topic, value: &serde_json::Value, arrival_unix_ms: u64) -> Result<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| Error::MalformedSnapshot("payload is not an array".into()))?;

        let mut entities = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let obj = item.as_object().ok_or_else(|| {
                Error::MalformedSnapshot(format!("record {idx} is not an object"))
            })?;

            let key_field = topic.key_field();
            let key = match (obj.get(key_field), topic.implicit_key()) {
                (Some(serde_json::Value::String(s)), _) if !s.is_empty() => {
                    EntityKey::new(s.clone())
                }
                (Some(serde_json::Value::Number(n)), _) => numeric_key(n),
                (None, Some(implicit)) => EntityKey::from(implicit),
                _ => {
                    return Err(Error::MalformedSnapshot(format!(
                        "record {idx} is missing key field '{key_field}'"
                    )));
                }
            };

            let mut record = EntityRecord::new(key);
            for (name, v) in obj {
                if name == key_field {
                    continue;
                }
                match v {
                    serde_json::Value::Number(n) => {
                        if let Some(f) = n.as_f64() {
                            record.fields.insert(name.clone(), f);
                        }
                    }
                    serde_json::Value::String(s) => {
                        record.labels.insert(name.clone(), s.clone());
                    }
                    serde_json::Value::Array(parts) => {
                        let joined: Vec<&str> = parts.iter().filter_map(|p| p.as_str()).collect();
                        record.labels.insert(name.clone(), joined.join(" "));
                    }
                    _ => {}
                }
            }
            entities.push(record);
        }

        let snapshot = Self::at(topic, entities, arrival_unix_ms);
        snapshot.validate()?;
        Ok(snapshot)
    }
}

/// Integral numbers render without a fraction, so `1.0` and `1` name the
/// same entity.
fn numeric_key(n: &serde_json::Number) -> EntityKey {
    if let Some(u) = n.as_u64() {
        return EntityKey::from(u.to_string());
    }
    if let Some(i) = n.as_i64() {
        return EntityKey::from(i.to_string());
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e18 => {
            EntityKey::from(format!("{f:.0}"))
        }
        _ => EntityKey::from(n.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Sample
// ---------------------------------------------------------------------------

/// One timestamped set of numeric values for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp_ms: u64,
    pub fields: BTreeMap<String, f64>,
}

impl Sample {
    pub fn from_record(record: &EntityRecord, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            fields: record.fields.clone(),
        }
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.fields.get(field).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_process_record() {
        let payload = json!([{
            "pid": 1,
            "name": "init",
            "cpu_usage": 0.1,
            "memory": 1024,
            "cmd": ["/sbin/init", "splash"],
            "exe": "/sbin/init",
        }]);
        let snap = Snapshot::from_json(Topic::Processes, &payload, 42).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.arrival_unix_ms, 42);
        let rec = &snap.entities[0];
        assert_eq!(rec.key.as_str(), "1");
        assert_eq!(rec.get("cpu_usage"), Some(0.1));
        assert_eq!(rec.get("memory"), Some(1024.0));
        assert_eq!(rec.get_label("name"), Some("init"));
        assert_eq!(rec.get_label("cmd"), Some("/sbin/init splash"));
        assert!(rec.get("pid").is_none(), "key must not be duplicated as a field");
    }

    #[test]
    fn test_from_json_missing_key_is_malformed() {
        let payload = json!([{ "name": "orphan", "cpu_usage": 3.0 }]);
        let err = Snapshot::from_json(Topic::Processes, &payload, 0).unwrap_err();
        assert!(matches!(err, Error::MalformedSnapshot(_)));
    }

    #[test]
    fn test_from_json_empty_string_key_is_malformed() {
        let payload = json!([{ "core_name": "", "core_usage": 3.0 }]);
        assert!(Snapshot::from_json(Topic::CpuCores, &payload, 0).is_err());
    }

    #[test]
    fn test_from_json_non_array_is_malformed() {
        let payload = json!({ "pid": 1 });
        assert!(matches!(
            Snapshot::from_json(Topic::Processes, &payload, 0),
            Err(Error::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn test_from_json_memory_uses_implicit_key() {
        let payload = json!([{ "total": 16.0, "free": 4.0 }]);
        let snap = Snapshot::from_json(Topic::Memory, &payload, 0).unwrap();
        assert_eq!(snap.entities[0].key.as_str(), "memory");
    }

    #[test]
    fn test_from_json_integral_float_key_matches_integer_key() {
        let a = Snapshot::from_json(Topic::Processes, &json!([{ "pid": 1.0 }]), 0).unwrap();
        let b = Snapshot::from_json(Topic::Processes, &json!([{ "pid": 1 }]), 0).unwrap();
        assert_eq!(a.entities[0].key, b.entities[0].key);
        assert_eq!(a.entities[0].key.as_u64(), Some(1));

        let c = Snapshot::from_json(Topic::Processes, &json!([{ "pid": 1.5 }]), 0).unwrap();
        assert_eq!(c.entities[0].key.as_str(), "1.5");
    }

    #[test]
    fn test_validate_rejects_nan() {
        let snap = Snapshot::at(
            Topic::CpuCores,
            vec![EntityRecord::new("cpu0").field("core_usage", f64::NAN)],
            0,
        );
        assert!(snap.validate().is_err());
    }

    #[test]
    fn test_sample_copies_fields_not_labels() {
        let rec = EntityRecord::new(7u32).field("cpu_usage", 2.5).label("name", "x");
        let sample = Sample::from_record(&rec, 99);
        assert_eq!(sample.timestamp_ms, 99);
        assert_eq!(sample.get("cpu_usage"), Some(2.5));
        assert_eq!(sample.fields.len(), 1);
    }

    #[test]
    fn test_entity_key_numeric_view() {
        assert_eq!(EntityKey::from(42u32).as_u64(), Some(42));
        assert_eq!(EntityKey::from("cpu0").as_u64(), None);
    }
}
