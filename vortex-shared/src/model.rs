//! Point/Batch data model (§3).
//!
//! `Point` and `Batch` are the two message shapes carried by [`crate::edge::Edge`].
//! Both are immutable once constructed; nodes produce new values rather than
//! mutating in place.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A typed scalar value. Shared between `Point::fields` and the expression
/// evaluator's runtime representation (§9: expression polymorphism).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Float(f64),
    Int(i64),
    Bool(bool),
    Str(String),
}

impl Value {
    /// Best-effort numeric coercion, used by aggregate/eval nodes.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Float(_) | Value::Int(_) => "num",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
        }
    }
}

/// Which tag keys participate in grouping, plus the by-measurement flag (§3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub tag_keys: BTreeSet<String>,
    pub by_measurement: bool,
}

impl Dimensions {
    pub fn new(tag_keys: impl IntoIterator<Item = String>, by_measurement: bool) -> Self {
        Self {
            tag_keys: tag_keys.into_iter().collect(),
            by_measurement,
        }
    }

    pub fn ungrouped() -> Self {
        Self::default()
    }

    /// Deterministic group key: `k=v` pairs in ascending key order, with an
    /// optional leading `measurement=<name>` segment. Equal dimensions on
    /// equal tag subsets imply equal group keys (§3 invariant).
    pub fn group_key(&self, measurement: &str, tags: &BTreeMap<String, String>) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.tag_keys.len() + 1);
        if self.by_measurement {
            parts.push(format!("measurement={measurement}"));
        }
        for key in &self.tag_keys {
            if let Some(value) = tags.get(key) {
                parts.push(format!("{key}={value}"));
            }
        }
        parts.join(",")
    }
}

/// One measurement observation at one instant (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, Value>,
    /// Absolute nanosecond timestamp.
    pub timestamp: i64,
    pub dimensions: Dimensions,
}

impl Point {
    pub fn new(measurement: impl Into<String>, timestamp: i64) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
            dimensions: Dimensions::ungrouped(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Group key under this point's own dimensions descriptor.
    pub fn group_key(&self) -> String {
        self.dimensions.group_key(&self.measurement, &self.tags)
    }

    /// Rekey the point under a new dimensions descriptor, e.g. for `group-by`.
    pub fn rekeyed(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = dimensions;
        self
    }
}

/// An ordered finite sequence of Points sharing measurement, group key, and
/// a `[begin, end]` time window (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub measurement: String,
    pub group_key: String,
    pub begin: i64,
    pub end: i64,
    pub dimensions: Dimensions,
    pub points: Vec<Point>,
}

impl Batch {
    pub fn new(
        measurement: impl Into<String>,
        group_key: impl Into<String>,
        begin: i64,
        end: i64,
        dimensions: Dimensions,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            group_key: group_key.into(),
            begin,
            end,
            dimensions,
            points: Vec::new(),
        }
    }

    pub fn with_points(mut self, points: Vec<Point>) -> Self {
        self.points = points;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_key_is_lexicographic() {
        let dims = Dimensions::new(["host".to_string(), "region".to_string()], false);
        let mut tags = BTreeMap::new();
        tags.insert("region".to_string(), "us-east".to_string());
        tags.insert("host".to_string(), "a1".to_string());
        assert_eq!(dims.group_key("cpu", &tags), "host=a1,region=us-east");
    }

    #[test]
    fn ungrouped_dimensions_yield_empty_key() {
        let dims = Dimensions::ungrouped();
        let tags = BTreeMap::new();
        assert_eq!(dims.group_key("cpu", &tags), "");
    }

    #[test]
    fn by_measurement_prefixes_group_key() {
        let dims = Dimensions::new(["host".to_string()], true);
        let mut tags = BTreeMap::new();
        tags.insert("host".to_string(), "a1".to_string());
        assert_eq!(dims.group_key("cpu", &tags), "measurement=cpu,host=a1");
    }

    #[test]
    fn equal_dimensions_on_equal_tags_imply_equal_group_keys() {
        let dims = Dimensions::new(["host".to_string()], false);
        let mut tags_a = BTreeMap::new();
        tags_a.insert("host".to_string(), "a1".to_string());
        tags_a.insert("extra".to_string(), "ignored".to_string());
        let mut tags_b = BTreeMap::new();
        tags_b.insert("host".to_string(), "a1".to_string());
        assert_eq!(dims.group_key("cpu", &tags_a), dims.group_key("cpu", &tags_b));
    }
}
