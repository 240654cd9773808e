use std::collections::BTreeSet;

use crate::index::query::Query;
use crate::index::{IndexError, TagIndex};
use crate::model::series::TimeSeries;

/// A static in-process tag index.
///
/// Construction takes ownership of the corpus; after that the index is
/// read-only, so sharing a `MemoryIndex` across request threads needs no
/// synchronisation.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    series: Vec<TimeSeries>,
}

impl MemoryIndex {
    pub fn new(series: Vec<TimeSeries>) -> Self {
        Self { series }
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl TagIndex for MemoryIndex {
    fn find(&self, query: &Query, start: i64, end: i64) -> Result<Vec<TimeSeries>, IndexError> {
        Ok(self
            .series
            .iter()
            .filter(|s| s.data.start() < end && s.data.end() > start)
            .filter(|s| query.matches(&s.tags))
            .cloned()
            .collect())
    }

    fn tag_keys(&self) -> Vec<String> {
        let keys: BTreeSet<&str> = self
            .series
            .iter()
            .flat_map(|s| s.tags.keys().map(String::as_str))
            .collect();
        keys.into_iter().map(str::to_string).collect()
    }
}
