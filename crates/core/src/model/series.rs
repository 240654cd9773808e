use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strata_chart::TimeSeq;

/// An immutable tag map: tag name to tag value, both non-empty.
///
/// BTreeMap keeps keys in lexicographic order, which fixes the derived
/// label format and the group-by tuple ordering without extra sorting.
pub type Tags = BTreeMap<String, String>;

/// The reserved tag holding the metric identifier.
pub const NAME_KEY: &str = "name";

/// Join tags as `"k1=v1,k2=v2"` in key order.
pub fn derive_label(tags: &Tags) -> String {
    let parts: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
    parts.join(",")
}

/// A tagged, labelled time sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub tags: Tags,
    pub label: String,
    pub data: TimeSeq,
}

impl TimeSeries {
    /// Build a series with a label derived from its tags.
    pub fn new(tags: Tags, data: TimeSeq) -> Self {
        let label = derive_label(&tags);
        Self { tags, label, data }
    }

    pub fn with_label(tags: Tags, label: impl Into<String>, data: TimeSeq) -> Self {
        Self {
            tags,
            label: label.into(),
            data,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.tags.get(NAME_KEY).map(String::as_str)
    }
}

/// Convenience constructor for tag maps in tests and fixtures.
pub fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|&(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_follows_key_order() {
        let t = tags(&[("zone", "us-east"), ("name", "sps"), ("cluster", "a")]);
        assert_eq!(derive_label(&t), "cluster=a,name=sps,zone=us-east");
    }

    #[test]
    fn name_tag_lookup() {
        let series = TimeSeries::new(
            tags(&[("name", "cpu")]),
            TimeSeq::new(0, 60, vec![1.0]).unwrap(),
        );
        assert_eq!(series.name(), Some("cpu"));
        assert_eq!(series.label, "name=cpu");
    }
}
