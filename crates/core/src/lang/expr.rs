use std::fmt;

use strata_chart::{Axis, Color, LineStyle};

use crate::index::query::Query;
use crate::index::Aggregation;

/// Fetch-and-shape step: what to pull from the tag index and how to
/// collapse it. Hashable so one program evaluates each distinct data
/// expression only once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataExpr {
    /// Every matching series, one line each.
    Fetch(Query),
    /// All matches collapsed into a single series.
    Aggregate { af: Aggregation, query: Query },
    /// One reduced series per unique tuple of `keys` values.
    GroupBy {
        af: Aggregation,
        keys: Vec<String>,
        query: Query,
    },
}

impl fmt::Display for DataExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataExpr::Fetch(q) => write!(f, "{q}"),
            DataExpr::Aggregate { af, query } => write!(f, "{af}({query})"),
            DataExpr::GroupBy { af, keys, query } => {
                write!(f, "{af}({query}) by [{}]", keys.join(","))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

impl BinOp {
    /// Apply to one sample pair. Arithmetic propagates NaN through IEEE
    /// rules; comparisons yield 1.0/0.0 and keep NaN as NaN.
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Gt => compare(a, b, |a, b| a > b),
            BinOp::Ge => compare(a, b, |a, b| a >= b),
            BinOp::Lt => compare(a, b, |a, b| a < b),
            BinOp::Le => compare(a, b, |a, b| a <= b),
            BinOp::Eq => compare(a, b, |a, b| a == b),
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Gt | BinOp::Ge | BinOp::Lt | BinOp::Le | BinOp::Eq
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Eq => "=",
        }
    }
}

fn compare(a: f64, b: f64, holds: impl Fn(f64, f64) -> bool) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if holds(a, b) {
        1.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Abs,
    Neg,
}

impl UnOp {
    pub fn apply(self, v: f64) -> f64 {
        match self {
            UnOp::Abs => v.abs(),
            UnOp::Neg => -v,
        }
    }
}

/// A pure computation over data expressions: the middle tier between tag
/// predicates and presentations.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeSeriesExpr {
    Data(DataExpr),
    /// `:const` output: one constant series at the context step.
    Const { value: f64, label: String },
    /// A number lifted into series position by a binary operator.
    Scalar(f64),
    BinOp {
        op: BinOp,
        lhs: Box<TimeSeriesExpr>,
        rhs: Box<TimeSeriesExpr>,
    },
    UnOp {
        op: UnOp,
        expr: Box<TimeSeriesExpr>,
    },
}

/// How a presentation reaches the plot: as lines, or converted to
/// vertical spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    #[default]
    Lines,
    Spans,
}

/// A time-series expression decorated with visual attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Presentation {
    pub expr: TimeSeriesExpr,
    pub style: LineStyle,
    pub output: OutputKind,
    /// None means "assign from the palette at build time".
    pub color: Option<Color>,
    /// Fill opacity percentage, 0..=100.
    pub alpha: u8,
    pub line_width: u32,
    pub axis: Axis,
    /// `:legend` override; None keeps the per-series derived label.
    pub label: Option<String>,
}

impl Presentation {
    pub fn from_expr(expr: TimeSeriesExpr) -> Self {
        Self {
            expr,
            style: LineStyle::Line,
            output: OutputKind::Lines,
            color: None,
            alpha: 100,
            line_width: 1,
            axis: Axis::Left,
            label: None,
        }
    }
}

/// Format a number the way it appears in derived labels: integers stay
/// integral (`50000`), everything else uses shortest float form.
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}
