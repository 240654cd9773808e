pub mod memory;
pub mod query;

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use strata_chart::{SeqError, TimeSeq};

use crate::model::series::{Tags, TimeSeries};

pub use memory::MemoryIndex;
pub use query::{Query, ReMatcher};

/// Failure inside a tag-index backend. The evaluator surfaces these as-is
/// rather than folding them into its own error kinds.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend: {0}")]
    Backend(String),
}

/// The queryable corpus of time series.
///
/// Implementations must be read-only and shareable across concurrent
/// requests; the evaluator never touches I/O directly.
pub trait TagIndex: Send + Sync {
    /// Series whose tags satisfy `query` and whose time domain intersects
    /// `[start, end)`.
    fn find(&self, query: &Query, start: i64, end: i64) -> Result<Vec<TimeSeries>, IndexError>;

    /// Every tag key present in the corpus. For validation and
    /// autocompletion; not used on the rendering hot path.
    fn tag_keys(&self) -> Vec<String>;
}

/// NaN-skipping reduction applied across series, sample by sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregation {
    Sum,
    Count,
    Min,
    Max,
    Avg,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregation::Sum => "sum",
            Aggregation::Count => "count",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Avg => "avg",
        };
        f.write_str(name)
    }
}

impl Aggregation {
    /// Reduce aligned sequences into one. NaN samples contribute nothing;
    /// a step where every input is NaN stays NaN.
    pub fn reduce(self, seqs: &[&TimeSeq]) -> Result<Option<TimeSeq>, SeqError> {
        let Some(first) = seqs.first() else {
            return Ok(None);
        };
        let len = first.len();
        let mut values = Vec::with_capacity(len);
        for i in 0..len {
            let present = seqs.iter().map(|s| s.get(i)).filter(|v| !v.is_nan());
            let mut count = 0_usize;
            let mut sum = 0.0_f64;
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            for v in present {
                count += 1;
                sum += v;
                min = min.min(v);
                max = max.max(v);
            }
            values.push(if count == 0 {
                f64::NAN
            } else {
                match self {
                    Aggregation::Sum => sum,
                    Aggregation::Count => count as f64,
                    Aggregation::Min => min,
                    Aggregation::Max => max,
                    Aggregation::Avg => sum / count as f64,
                }
            });
        }
        TimeSeq::new(first.start(), first.step(), values).map(Some)
    }
}

/// Partition `series` by the values of `keys` and reduce each group.
///
/// Series missing any group-by key are dropped. Output tags are exactly
/// the group-by keys; labels are the derived `"k=v"` form; output order is
/// lexicographic over the concatenated value tuple.
pub fn group_by(
    series: &[TimeSeries],
    keys: &[String],
    af: Aggregation,
) -> Result<Vec<TimeSeries>, SeqError> {
    let mut groups: BTreeMap<Vec<String>, Vec<&TimeSeries>> = BTreeMap::new();
    'series: for s in series {
        let mut tuple = Vec::with_capacity(keys.len());
        for key in keys {
            match s.tags.get(key) {
                Some(v) => tuple.push(v.clone()),
                None => continue 'series,
            }
        }
        groups.entry(tuple).or_default().push(s);
    }

    let mut out = Vec::with_capacity(groups.len());
    for (tuple, members) in groups {
        let seqs: Vec<&TimeSeq> = members.iter().map(|s| &s.data).collect();
        if let Some(data) = af.reduce(&seqs)? {
            let tags: Tags = keys.iter().cloned().zip(tuple).collect();
            out.push(TimeSeries::new(tags, data));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::series::tags;

    fn series(pairs: &[(&str, &str)], values: &[f64]) -> TimeSeries {
        TimeSeries::new(
            tags(pairs),
            TimeSeq::new(0, 60, values.to_vec()).unwrap(),
        )
    }

    fn corpus() -> Vec<TimeSeries> {
        vec![
            series(&[("name", "sps"), ("cluster", "b"), ("node", "i-1")], &[1.0, f64::NAN]),
            series(&[("name", "sps"), ("cluster", "a"), ("node", "i-2")], &[2.0, 5.0]),
            series(&[("name", "sps"), ("cluster", "a"), ("node", "i-3")], &[3.0, f64::NAN]),
            series(&[("name", "cpu"), ("host", "h1")], &[9.0, 9.0]),
        ]
    }

    #[test]
    fn group_by_partitions_and_sorts() {
        let keys = vec!["cluster".to_string()];
        let out = group_by(&corpus(), &keys, Aggregation::Sum).unwrap();
        assert_eq!(out.len(), 2);
        // Lexicographic tuple order: a before b.
        assert_eq!(out[0].label, "cluster=a");
        assert_eq!(out[1].label, "cluster=b");
        // Non-key tags are gone.
        assert_eq!(out[0].tags.len(), 1);
        assert_eq!(out[0].data.get(0), 5.0);
    }

    #[test]
    fn group_by_drops_series_missing_a_key() {
        let keys = vec!["cluster".to_string()];
        let out = group_by(&corpus(), &keys, Aggregation::Sum).unwrap();
        // The cpu series has no cluster tag and must not appear anywhere.
        assert!(out.iter().all(|s| s.tags.contains_key("cluster")));
    }

    #[test]
    fn reduce_skips_nan_and_keeps_all_nan_steps() {
        let keys = vec!["name".to_string()];
        let out = group_by(&corpus()[..3], &keys, Aggregation::Sum).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data.get(0), 6.0);
        // At step 1 only cluster=a/i-2 has a value.
        assert_eq!(out[0].data.get(1), 5.0);

        let all_nan = vec![
            series(&[("name", "x")], &[f64::NAN]),
            series(&[("name", "x")], &[f64::NAN]),
        ];
        let out = group_by(&all_nan, &keys, Aggregation::Avg).unwrap();
        assert!(out[0].data.get(0).is_nan());
    }

    #[test]
    fn reducers() {
        let seqs_owned = [
            TimeSeq::new(0, 60, vec![1.0, f64::NAN]).unwrap(),
            TimeSeq::new(0, 60, vec![3.0, 4.0]).unwrap(),
        ];
        let seqs: Vec<&TimeSeq> = seqs_owned.iter().collect();
        let check = |af: Aggregation, expect0: f64, expect1: f64| {
            let r = af.reduce(&seqs).unwrap().unwrap();
            assert_eq!(r.get(0), expect0, "{af} step 0");
            assert_eq!(r.get(1), expect1, "{af} step 1");
        };
        check(Aggregation::Sum, 4.0, 4.0);
        check(Aggregation::Count, 2.0, 1.0);
        check(Aggregation::Min, 1.0, 4.0);
        check(Aggregation::Max, 3.0, 4.0);
        check(Aggregation::Avg, 2.0, 4.0);
    }

    #[test]
    fn reduce_of_nothing_is_none() {
        assert!(Aggregation::Sum.reduce(&[]).unwrap().is_none());
    }

    #[test]
    fn group_by_no_match_is_empty() {
        let out = group_by(&[], &["cluster".to_string()], Aggregation::Sum).unwrap();
        assert!(out.is_empty());
    }
}
