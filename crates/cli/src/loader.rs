//! In-process corpus loader: a JSON array of tagged series becomes a
//! [`MemoryIndex`].
//!
//! Record shape: `{"tags": {"name": "sps"}, "start": 0, "step": 60000,
//! "values": [1.0, null, 3.0]}` with `null` standing in for NaN.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use strata_chart::{SeqError, TimeSeq};
use strata_core::index::MemoryIndex;
use strata_core::model::series::{Tags, TimeSeries};

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("cannot read corpus: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed corpus: {0}")]
    Json(#[from] serde_json::Error),
    #[error("series {index}: {source}")]
    BadSeries { index: usize, source: SeqError },
    #[error("series {index}: empty tag {key:?}")]
    EmptyTag { index: usize, key: String },
}

#[derive(Debug, Deserialize)]
struct SeriesRecord {
    tags: Tags,
    start: i64,
    step: i64,
    values: Vec<Option<f64>>,
}

pub fn load_corpus(path: &Path) -> Result<MemoryIndex, LoaderError> {
    let reader = BufReader::new(File::open(path)?);
    let records: Vec<SeriesRecord> = serde_json::from_reader(reader)?;

    let mut series = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        for (key, value) in &record.tags {
            if key.is_empty() || value.is_empty() {
                return Err(LoaderError::EmptyTag {
                    index,
                    key: key.clone(),
                });
            }
        }
        let values = record
            .values
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        let data = TimeSeq::new(record.start, record.step, values)
            .map_err(|source| LoaderError::BadSeries { index, source })?;
        series.push(TimeSeries::new(record.tags, data));
    }
    tracing::info!(series = series.len(), path = %path.display(), "loaded corpus");
    Ok(MemoryIndex::new(series))
}
