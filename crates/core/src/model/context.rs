use chrono_tz::Tz;
use thiserror::Error;

use strata_chart::{SeqError, TimeSeq};

use crate::model::series::TimeSeries;

#[derive(Debug, Error, PartialEq)]
pub enum DataError {
    #[error("invalid context: end {end} is not after start {start}")]
    EndNotAfterStart { start: i64, end: i64 },
    #[error("invalid context: step must be positive, got {step}")]
    NonPositiveStep { step: i64 },
    #[error("invalid context: boundary {bound} is not aligned to step {step}")]
    UnalignedBoundary { bound: i64, step: i64 },
}

/// The evaluation window: `[start, end)` on a fixed millisecond step grid.
///
/// Both boundaries must sit on the grid. The timezone only affects tick
/// labels in the renderer, never arithmetic.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalContext {
    start: i64,
    end: i64,
    step: i64,
    tz: Tz,
}

impl EvalContext {
    pub fn new(start: i64, end: i64, step: i64, tz: Tz) -> Result<Self, DataError> {
        if step <= 0 {
            return Err(DataError::NonPositiveStep { step });
        }
        for bound in [start, end] {
            if bound % step != 0 {
                return Err(DataError::UnalignedBoundary { bound, step });
            }
        }
        if end <= start {
            return Err(DataError::EndNotAfterStart { start, end });
        }
        Ok(Self { start, end, step, tz })
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Number of samples in the window.
    pub fn steps(&self) -> usize {
        ((self.end - self.start) / self.step) as usize
    }

    /// A constant sequence covering the whole window.
    pub fn constant(&self, value: f64) -> Result<TimeSeq, SeqError> {
        TimeSeq::constant(self.start, self.end, self.step, value)
    }

    /// Re-grid a fetched series onto this window: clip samples outside
    /// `[start, end)`, fill interior gaps with NaN.
    pub fn materialize(&self, series: TimeSeries) -> Result<TimeSeries, SeqError> {
        let data = self.bounded(&series.data)?;
        Ok(TimeSeries {
            tags: series.tags,
            label: series.label,
            data,
        })
    }

    fn bounded(&self, data: &TimeSeq) -> Result<TimeSeq, SeqError> {
        if data.step() == self.step {
            return Ok(data.bounded(self.start, self.end));
        }
        // Source on a different grid: resample at each context step.
        let values = (0..self.steps())
            .map(|i| data.at_time(self.start + self.step * i as i64))
            .collect();
        TimeSeq::new(self.start, self.step, values)
    }
}
