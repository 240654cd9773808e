use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::color::Color;
use crate::seq::TimeSeq;
use crate::theme::Theme;

/// How evaluated presentations are distributed over plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// One plot carries every line.
    #[default]
    Single,
    /// Lines are partitioned by their axis attribute; each axis becomes
    /// its own plot sharing the x-axis.
    Axes,
}

impl std::str::FromStr for Layout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Layout::Single),
            "axes" => Ok(Layout::Axes),
            other => Err(format!("unknown layout {other:?} (expected single or axes)")),
        }
    }
}

/// Which y-axis a line is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    #[default]
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    #[default]
    Line,
    Area,
    Stack,
}

/// One renderable series: data plus every visual attribute the raster
/// engine needs. `alpha` is a 0..=100 percentage applied to fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDef {
    pub label: String,
    pub color: Color,
    pub style: LineStyle,
    pub line_width: u32,
    pub alpha: u8,
    pub axis: Axis,
    pub data: TimeSeq,
}

/// A vertical band covering the full plot height over `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VSpanDef {
    pub start: i64,
    pub end: i64,
    pub color: Color,
    pub alpha: u8,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis_label: Option<String>,
    pub lines: Vec<LineDef>,
    pub vspans: Vec<VSpanDef>,
}

/// The self-describing render plan: no re-evaluation is needed to turn a
/// GraphDef into pixels, and two renders of an equal GraphDef produce
/// identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDef {
    pub start_time: i64,
    pub end_time: i64,
    pub step: i64,
    pub width: u32,
    pub height: u32,
    pub theme: Theme,
    pub layout: Layout,
    /// IANA zone name used for time tick labels.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_true")]
    pub legend: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub plots: Vec<Plot>,
}

fn default_true() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Error, PartialEq)]
pub enum GraphDefError {
    #[error("graph window [{start}, {end}) is not a positive multiple of step {step}")]
    BadWindow { start: i64, end: i64, step: i64 },
    #[error("line {label:?} is misaligned with the graph: start {start}, step {step}, len {len}")]
    MisalignedLine {
        label: String,
        start: i64,
        step: i64,
        len: usize,
    },
    #[error("vspan {label:?} [{start}, {end}) is empty or outside the graph window")]
    BadSpan {
        label: String,
        start: i64,
        end: i64,
    },
}

impl GraphDef {
    /// Check the structural invariants: the window is a positive multiple
    /// of the step, every line shares the graph grid exactly, and every
    /// vspan is a non-empty interval inside the window.
    pub fn validate(&self) -> Result<(), GraphDefError> {
        let span = self.end_time - self.start_time;
        if self.step <= 0 || span <= 0 || span % self.step != 0 {
            return Err(GraphDefError::BadWindow {
                start: self.start_time,
                end: self.end_time,
                step: self.step,
            });
        }
        for plot in &self.plots {
            for line in &plot.lines {
                let aligned = line.data.start() == self.start_time
                    && line.data.step() == self.step
                    && line.data.end() == self.end_time;
                if !aligned {
                    return Err(GraphDefError::MisalignedLine {
                        label: line.label.clone(),
                        start: line.data.start(),
                        step: line.data.step(),
                        len: line.data.len(),
                    });
                }
            }
            for span in &plot.vspans {
                if span.start >= span.end
                    || span.start < self.start_time
                    || span.end > self.end_time
                {
                    return Err(GraphDefError::BadSpan {
                        label: span.label.clone(),
                        start: span.start,
                        end: span.end,
                    });
                }
            }
        }
        Ok(())
    }
}

impl Plot {
    /// The y-range covering all finite values of this plot's lines.
    ///
    /// Stacked members contribute their running totals, positive and
    /// negative sides tracked independently. Vspans never influence the
    /// range. With no finite value at all the range defaults to [0, 1].
    pub fn value_range(&self) -> (f64, f64) {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;

        let samples = self.lines.iter().map(|l| l.data.len()).max().unwrap_or(0);
        let mut pos = vec![0.0_f64; samples];
        let mut neg = vec![0.0_f64; samples];

        for line in &self.lines {
            for (i, &v) in line.data.values().iter().enumerate() {
                if !v.is_finite() {
                    continue;
                }
                let value = if line.style == LineStyle::Stack {
                    if v >= 0.0 {
                        pos[i] += v;
                        pos[i]
                    } else {
                        neg[i] += v;
                        neg[i]
                    }
                } else {
                    v
                };
                lo = lo.min(value);
                hi = hi.max(value);
            }
            // Stacks and areas are anchored at the zero baseline.
            if matches!(line.style, LineStyle::Stack | LineStyle::Area) {
                lo = lo.min(0.0);
                hi = hi.max(0.0);
            }
        }

        if !lo.is_finite() || !hi.is_finite() {
            return (0.0, 1.0);
        }
        if lo == hi {
            // Flat plot: open a unit window around the value.
            return (lo - 0.5, hi + 0.5);
        }
        (lo, hi)
    }
}
