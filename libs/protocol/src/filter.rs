//! Range filters and their execution statistics

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Execution statistics attached to filters and pools
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Number of players produced
    #[serde(deserialize_with = "crate::int64::deserialize")]
    pub count: u64,

    /// Wall-clock time spent, in seconds
    pub elapsed: f64,
}

impl Stats {
    pub fn new(count: usize, elapsed: Duration) -> Self {
        Self {
            count: count as u64,
            elapsed: elapsed.as_secs_f64(),
        }
    }
}

/// A numeric range constraint over one indexed player attribute.
///
/// A missing or zero `maxv` means the range is unbounded above.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filter {
    pub id: String,
    pub name: String,

    /// Name of the sorted-set index holding this attribute
    pub attribute: String,

    #[serde(deserialize_with = "crate::int64::deserialize")]
    pub minv: i64,

    #[serde(deserialize_with = "crate::int64::option::deserialize")]
    pub maxv: Option<i64>,

    /// Set once the filter has been evaluated
    pub stats: Option<Stats>,
}

impl Filter {
    pub fn new(id: impl Into<String>, attribute: impl Into<String>, minv: i64, maxv: Option<i64>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            attribute: attribute.into(),
            minv,
            maxv,
            stats: None,
        }
    }

    /// Upper bound of the range, `None` when unbounded
    pub fn upper_bound(&self) -> Option<i64> {
        match self.maxv {
            Some(0) | None => None,
            Some(max) => Some(max),
        }
    }

    /// Whether `value` falls inside this filter's range
    pub fn contains(&self, value: i64) -> bool {
        value >= self.minv && self.upper_bound().map_or(true, |max| value <= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_max_is_unbounded() {
        let filter = Filter::new("f1", "rating", 1000, Some(0));
        assert_eq!(filter.upper_bound(), None);
        assert!(filter.contains(i64::MAX));
        assert!(!filter.contains(999));
    }

    #[test]
    fn test_bounded_range_is_inclusive() {
        let filter = Filter::new("f1", "region", 1, Some(1));
        assert!(filter.contains(1));
        assert!(!filter.contains(0));
        assert!(!filter.contains(2));
    }

    #[test]
    fn test_decodes_camel_case_json() {
        let filter: Filter =
            serde_json::from_str(r#"{"id":"skill","attribute":"mmr","minv":10,"maxv":20}"#).unwrap();
        assert_eq!(filter.attribute, "mmr");
        assert_eq!(filter.upper_bound(), Some(20));
        assert!(filter.stats.is_none());
    }

    #[test]
    fn test_decodes_string_encoded_bounds() {
        let filter: Filter = serde_json::from_str(
            r#"{"id":"skill","attribute":"mmr","minv":"10","maxv":"20","stats":{"count":"3","elapsed":0.5}}"#,
        )
        .unwrap();
        assert_eq!(filter.minv, 10);
        assert_eq!(filter.upper_bound(), Some(20));
        assert_eq!(filter.stats.map(|s| s.count), Some(3));

        let encoded = serde_json::to_value(&filter).unwrap();
        assert_eq!(encoded["minv"], 10);
    }
}
