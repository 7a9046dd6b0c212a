//! Telemetry event records and the batches they travel in.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The six reserved field names. A property sharing one of these names with
/// a record is rejected at construction time.
pub const RESERVED_FIELDS: [&str; 6] = [
    "timestamp",
    "runtime",
    "owner",
    "tool",
    "sensorDataType",
    "resource",
];

/// An ordered, key-unique list of `(key, value)` pairs attached to a
/// [`Record`]. Keys may not repeat within one record, and may not collide
/// with [`RESERVED_FIELDS`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Properties(Vec<(String, String)>);

impl Properties {
    /// Creates an empty property list.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Inserts a key/value pair, preserving insertion order.
    ///
    /// # Errors
    ///
    /// Returns the offending key if it is one of [`RESERVED_FIELDS`] or if it
    /// is already present in this property list.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), String> {
        let key = key.into();
        if RESERVED_FIELDS.contains(&key.as_str()) {
            return Err(key);
        }
        if self.0.iter().any(|(k, _)| k == &key) {
            return Err(key);
        }
        self.0.push((key, value.into()));
        Ok(())
    }

    /// Returns the properties in insertion order.
    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns `true` if no properties have been set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<(String, String)> for Properties {
    /// Builds a `Properties` from an iterator, silently dropping reserved or
    /// duplicate keys. Callers that need to surface those as errors should
    /// use [`Properties::insert`] directly.
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut properties = Self::new();
        for (key, value) in iter {
            let _ = properties.insert(key, value);
        }
        properties
    }
}

/// Reads an instant field from a flat map: absent defaults to `now`,
/// present-but-unparseable is a validation failure rather than a silent
/// default.
fn parse_instant_field(map: &HashMap<String, String>, key: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    match map.get(key) {
        None => Ok(now),
        Some(value) => DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| format!("{key} is not a valid ISO-8601 instant: {value}")),
    }
}

/// A single telemetry event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// When the sensed event occurred.
    pub timestamp: DateTime<Utc>,
    /// When this record was handed to the shell.
    pub runtime: DateTime<Utc>,
    /// The user identifier that owns this event.
    pub owner: String,
    /// Short name of the tool that produced this event.
    pub tool: String,
    /// Short name of the sensor data type.
    pub sensor_data_type: String,
    /// Opaque resource identifier, often a URI.
    pub resource: String,
    /// Ordered, key-unique extra fields.
    pub properties: Properties,
}

impl Record {
    /// Creates a new record, defaulting `properties` to empty.
    #[must_use]
    pub fn new(
        timestamp: DateTime<Utc>,
        runtime: DateTime<Utc>,
        owner: impl Into<String>,
        tool: impl Into<String>,
        sensor_data_type: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            runtime,
            owner: owner.into(),
            tool: tool.into(),
            sensor_data_type: sensor_data_type.into(),
            resource: resource.into(),
            properties: Properties::new(),
        }
    }

    /// Builds a record from a flat key/value map the way the REPL's
    /// `add#k=v#k=v` grammar or a similar collaborator would produce it.
    /// The six reserved keys populate the mandatory fields; everything else
    /// becomes a property. `timestamp`/`runtime` default to now when the key
    /// is absent; `owner` defaults to `default_owner`, and `tool` defaults
    /// to `"unknown"`.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message if `timestamp` or `runtime` is
    /// present but not a valid ISO-8601 instant. A missing key is not an
    /// error; only an unparseable one is.
    pub fn from_map(map: &HashMap<String, String>, default_owner: &str) -> Result<Self, String> {
        let now = Utc::now();
        let timestamp = parse_instant_field(map, "timestamp", now)?;
        let runtime = parse_instant_field(map, "runtime", now)?;
        let owner = map.get("owner").cloned().unwrap_or_else(|| default_owner.to_owned());
        let tool = map.get("tool").cloned().unwrap_or_else(|| "unknown".to_owned());
        let sensor_data_type = map.get("sensorDataType").cloned().unwrap_or_default();
        let resource = map.get("resource").cloned().unwrap_or_default();

        let properties = map
            .iter()
            .filter(|(k, _)| !RESERVED_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            timestamp,
            runtime,
            owner,
            tool,
            sensor_data_type,
            resource,
            properties,
        })
    }

    /// Validates that all mandatory fields are non-empty.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message naming the first missing field.
    pub fn validate(&self) -> Result<(), String> {
        if self.owner.is_empty() {
            return Err("owner is required".to_owned());
        }
        if self.tool.is_empty() {
            return Err("tool is required".to_owned());
        }
        if self.sensor_data_type.is_empty() {
            return Err("sensorDataType is required".to_owned());
        }
        if self.resource.is_empty() {
            return Err("resource is required".to_owned());
        }
        Ok(())
    }
}

/// An ordered, finite sequence of [`Record`]s transmitted as one unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch(pub Vec<Record>);

impl Batch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of records in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the batch has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Record>> for Batch {
    fn from(records: Vec<Record>) -> Self {
        Self(records)
    }
}

// Serde-facing mirror types used only by `crate::xml`; kept private to this
// module so the public `Record`/`Batch` types stay free of wire-format
// concerns, mirroring how the teacher keeps `Bin`/`Record` free of the
// msgpack wire details that live in `msgpack/`.
#[derive(Serialize, Deserialize)]
pub(crate) struct Property {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}
