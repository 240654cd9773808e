use std::collections::HashMap;

use thiserror::Error;

use strata_chart::{Axis, Color, ColorParseError, LineStyle, SeqError, TimeSeq};

use crate::index::query::Query;
use crate::index::{Aggregation, IndexError, TagIndex, group_by};
use crate::lang::expr::{
    BinOp, DataExpr, OutputKind, Presentation, TimeSeriesExpr, UnOp, format_number,
};
use crate::lang::parser::Token;
use crate::model::context::EvalContext;
use crate::model::series::{Tags, TimeSeries};

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("stack underflow at :{word}: needs {needs} operands, stack has {depth}")]
    StackUnderflow {
        word: String,
        needs: usize,
        depth: usize,
    },
    #[error(":{word} expected {expected}, found {found}")]
    TypeMismatch {
        word: String,
        expected: &'static str,
        found: String,
    },
    #[error("unknown operator :{word}")]
    UnknownWord { word: String },
    #[error(":{word} cannot pair {lhs} series with {rhs} series")]
    ArityMismatch {
        word: String,
        lhs: usize,
        rhs: usize,
    },
    #[error("operand left on the stack at end of program: {kind}")]
    LeftoverOperand { kind: &'static str },
    #[error("bad regex {pattern:?}: {source}")]
    BadPattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("bad color {value:?}: {source}")]
    BadColor {
        value: String,
        source: ColorParseError,
    },
    #[error(transparent)]
    InvalidSeqSpec(#[from] SeqError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// One fully evaluated presentation: visual attributes plus the series
/// its expression produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluated {
    pub style: LineStyle,
    pub output: OutputKind,
    pub color: Option<Color>,
    pub alpha: u8,
    pub line_width: u32,
    pub axis: Axis,
    pub label: Option<String>,
    pub series: Vec<TimeSeries>,
}

/// A stack operand. Each word declares which discriminants it consumes
/// and fails fast with the observed kind otherwise.
#[derive(Debug, Clone)]
enum Operand {
    Str(String),
    Num(f64),
    List(Vec<String>),
    Query(Query),
    Data(DataExpr),
    Series(TimeSeriesExpr),
    Pres(Presentation),
}

impl Operand {
    fn kind(&self) -> &'static str {
        match self {
            Operand::Str(_) => "string",
            Operand::Num(_) => "number",
            Operand::List(_) => "list",
            Operand::Query(_) => "query",
            Operand::Data(_) => "data expression",
            Operand::Series(_) => "time-series expression",
            Operand::Pres(_) => "presentation",
        }
    }
}

/// Stack-machine interpreter for one program against one context.
///
/// Holds a by-value cache of data expressions so a program that names the
/// same fetch or group-by twice hits the index once.
pub struct Evaluator<'a> {
    ctx: &'a EvalContext,
    index: &'a dyn TagIndex,
    stack: Vec<Operand>,
    cache: HashMap<DataExpr, Vec<TimeSeries>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a EvalContext, index: &'a dyn TagIndex) -> Self {
        Self {
            ctx,
            index,
            stack: Vec::new(),
            cache: HashMap::new(),
        }
    }

    /// Run the program and collapse the final stack into presentations,
    /// in insertion order. Bare queries and expressions left on the stack
    /// are wrapped in a default presentation; strings and numbers are an
    /// error.
    pub fn eval(mut self, program: &[Token]) -> Result<Vec<Evaluated>, EvalError> {
        tracing::debug!(tokens = program.len(), "evaluating program");
        for token in program {
            self.step(token)?;
        }

        let stack = std::mem::take(&mut self.stack);
        let mut out = Vec::with_capacity(stack.len());
        for operand in stack {
            let pres = match operand {
                Operand::Pres(p) => p,
                Operand::Query(q) => {
                    Presentation::from_expr(TimeSeriesExpr::Data(DataExpr::Fetch(q)))
                }
                Operand::Data(d) => Presentation::from_expr(TimeSeriesExpr::Data(d)),
                Operand::Series(e) => Presentation::from_expr(e),
                other => {
                    return Err(EvalError::LeftoverOperand { kind: other.kind() });
                }
            };
            let series = self.eval_expr(&pres.expr)?;
            out.push(Evaluated {
                style: pres.style,
                output: pres.output,
                color: pres.color,
                alpha: pres.alpha,
                line_width: pres.line_width,
                axis: pres.axis,
                label: pres.label,
                series,
            });
        }
        Ok(out)
    }

    fn step(&mut self, token: &Token) -> Result<(), EvalError> {
        match token {
            Token::Str(s) => self.stack.push(Operand::Str(s.clone())),
            Token::Num(v) => self.stack.push(Operand::Num(*v)),
            Token::List(items) => self.stack.push(Operand::List(items.clone())),
            Token::Word(w) => self.word(w)?,
        }
        Ok(())
    }

    fn word(&mut self, word: &str) -> Result<(), EvalError> {
        match word {
            "true" => self.stack.push(Operand::Query(Query::True)),
            "false" => self.stack.push(Operand::Query(Query::False)),

            "eq" => {
                let (a, b) = self.pop2(word)?;
                // Predicate when either side is a string, numeric
                // comparison otherwise.
                if matches!(a, Operand::Str(_)) || matches!(b, Operand::Str(_)) {
                    let key = coerce_str(word, a)?;
                    let value = coerce_str(word, b)?;
                    self.stack.push(Operand::Query(Query::equal(key, value)));
                } else {
                    self.binary(BinOp::Eq, a, b)?;
                }
            }
            "re" => {
                let (a, b) = self.pop2(word)?;
                let key = coerce_str(word, a)?;
                let pattern = coerce_str(word, b)?;
                let query = Query::re(key, &pattern).map_err(|source| EvalError::BadPattern {
                    pattern,
                    source,
                })?;
                self.stack.push(Operand::Query(query));
            }
            "has" => {
                let key = coerce_str(word, self.pop1(word)?)?;
                self.stack.push(Operand::Query(Query::has(key)));
            }
            "and" | "or" => {
                let (a, b) = self.pop2(word)?;
                let a = as_query(word, a)?;
                let b = as_query(word, b)?;
                let q = if word == "and" { a.and(b) } else { a.or(b) };
                self.stack.push(Operand::Query(q));
            }
            "not" => {
                let q = as_query(word, self.pop1(word)?)?;
                self.stack.push(Operand::Query(q.not()));
            }

            "by" => {
                let (below, top) = self.pop2(word)?;
                let keys = match top {
                    Operand::List(keys) => keys,
                    other => return Err(type_mismatch(word, "a (keys) list on top", &other)),
                };
                let expr = match below {
                    Operand::Query(query) | Operand::Data(DataExpr::Fetch(query)) => {
                        DataExpr::GroupBy {
                            af: Aggregation::Sum,
                            keys,
                            query,
                        }
                    }
                    Operand::Data(DataExpr::Aggregate { af, query }) => {
                        DataExpr::GroupBy { af, keys, query }
                    }
                    other => return Err(type_mismatch(word, "query or aggregation", &other)),
                };
                self.stack.push(Operand::Data(expr));
            }
            "sum" | "count" | "min" | "max" | "avg" => {
                let af = match word {
                    "sum" => Aggregation::Sum,
                    "count" => Aggregation::Count,
                    "min" => Aggregation::Min,
                    "max" => Aggregation::Max,
                    _ => Aggregation::Avg,
                };
                let expr = match self.pop1(word)? {
                    Operand::Query(query) | Operand::Data(DataExpr::Fetch(query)) => {
                        DataExpr::Aggregate { af, query }
                    }
                    Operand::Data(DataExpr::Aggregate { query, .. }) => {
                        DataExpr::Aggregate { af, query }
                    }
                    // Re-aggregating a group-by swaps its reducer.
                    Operand::Data(DataExpr::GroupBy { keys, query, .. }) => {
                        DataExpr::GroupBy { af, keys, query }
                    }
                    other => return Err(type_mismatch(word, "query or data expression", &other)),
                };
                self.stack.push(Operand::Data(expr));
            }

            "add" | "sub" | "mul" | "div" | "gt" | "ge" | "lt" | "le" => {
                let op = match word {
                    "add" => BinOp::Add,
                    "sub" => BinOp::Sub,
                    "mul" => BinOp::Mul,
                    "div" => BinOp::Div,
                    "gt" => BinOp::Gt,
                    "ge" => BinOp::Ge,
                    "lt" => BinOp::Lt,
                    _ => BinOp::Le,
                };
                let (a, b) = self.pop2(word)?;
                self.binary(op, a, b)?;
            }
            "abs" | "neg" => {
                let op = if word == "abs" { UnOp::Abs } else { UnOp::Neg };
                match self.pop1(word)? {
                    Operand::Num(v) => self.stack.push(Operand::Num(op.apply(v))),
                    other => {
                        let expr = as_series_expr(word, other)?;
                        self.stack.push(Operand::Series(TimeSeriesExpr::UnOp {
                            op,
                            expr: Box::new(expr),
                        }));
                    }
                }
            }

            "dup" => {
                let top = self.peek(word)?.clone();
                self.stack.push(top);
            }
            "swap" => {
                let (a, b) = self.pop2(word)?;
                self.stack.push(b);
                self.stack.push(a);
            }
            "drop" => {
                self.pop1(word)?;
            }
            "rot" => {
                let depth = self.stack.len();
                if depth < 3 {
                    return Err(EvalError::StackUnderflow {
                        word: word.to_string(),
                        needs: 3,
                        depth,
                    });
                }
                self.stack[depth - 3..].rotate_left(1);
            }
            "2over" => {
                let depth = self.stack.len();
                if depth < 3 {
                    return Err(EvalError::StackUnderflow {
                        word: word.to_string(),
                        needs: 3,
                        depth,
                    });
                }
                self.stack.push(self.stack[depth - 3].clone());
            }

            "const" => {
                let value = match self.pop1(word)? {
                    Operand::Num(v) => v,
                    other => return Err(type_mismatch(word, "number", &other)),
                };
                self.stack.push(Operand::Series(TimeSeriesExpr::Const {
                    value,
                    label: format_number(value),
                }));
            }

            "line" | "area" | "stack" => {
                let style = match word {
                    "line" => LineStyle::Line,
                    "area" => LineStyle::Area,
                    _ => LineStyle::Stack,
                };
                let mut pres = self.pop_presentable(word)?;
                pres.style = style;
                self.stack.push(Operand::Pres(pres));
            }
            "vspan" => {
                let mut pres = self.pop_presentable(word)?;
                pres.output = OutputKind::Spans;
                self.stack.push(Operand::Pres(pres));
            }
            "color" => {
                let (below, top) = self.pop2(word)?;
                let value = coerce_str(word, top)?;
                let color = parse_color(&value).map_err(|source| EvalError::BadColor {
                    value,
                    source,
                })?;
                let mut pres = presentable(word, below)?;
                pres.color = Some(color);
                self.stack.push(Operand::Pres(pres));
            }
            "lw" => {
                let (below, top) = self.pop2(word)?;
                let v = match top {
                    Operand::Num(v) => v,
                    other => return Err(type_mismatch(word, "number", &other)),
                };
                if !v.is_finite() || v < 1.0 {
                    return Err(EvalError::TypeMismatch {
                        word: word.to_string(),
                        expected: "line width >= 1",
                        found: format_number(v),
                    });
                }
                let mut pres = presentable(word, below)?;
                pres.line_width = (v.round() as u32).min(50);
                self.stack.push(Operand::Pres(pres));
            }
            "alpha" => {
                let (below, top) = self.pop2(word)?;
                let v = match top {
                    Operand::Num(v) => v,
                    other => return Err(type_mismatch(word, "number", &other)),
                };
                if !v.is_finite() || !(0.0..=100.0).contains(&v) {
                    return Err(EvalError::TypeMismatch {
                        word: word.to_string(),
                        expected: "percentage in 0..=100",
                        found: format_number(v),
                    });
                }
                let mut pres = presentable(word, below)?;
                pres.alpha = v.round() as u8;
                self.stack.push(Operand::Pres(pres));
            }
            "legend" => {
                let (below, top) = self.pop2(word)?;
                let label = coerce_str(word, top)?;
                let mut pres = presentable(word, below)?;
                pres.label = Some(label);
                self.stack.push(Operand::Pres(pres));
            }
            "axis" => {
                let (below, top) = self.pop2(word)?;
                let axis = match top {
                    Operand::Num(v) if v == 0.0 => Axis::Left,
                    Operand::Num(v) if v == 1.0 => Axis::Right,
                    other => return Err(type_mismatch(word, "0 or 1", &other)),
                };
                let mut pres = presentable(word, below)?;
                pres.axis = axis;
                self.stack.push(Operand::Pres(pres));
            }

            _ => {
                return Err(EvalError::UnknownWord {
                    word: word.to_string(),
                });
            }
        }
        Ok(())
    }

    // --- stack primitives ---

    fn pop1(&mut self, word: &str) -> Result<Operand, EvalError> {
        self.stack.pop().ok_or_else(|| EvalError::StackUnderflow {
            word: word.to_string(),
            needs: 1,
            depth: 0,
        })
    }

    /// Pop two operands, returned in push order (second-from-top, top).
    fn pop2(&mut self, word: &str) -> Result<(Operand, Operand), EvalError> {
        let depth = self.stack.len();
        if depth < 2 {
            return Err(EvalError::StackUnderflow {
                word: word.to_string(),
                needs: 2,
                depth,
            });
        }
        let top = self.stack.pop().ok_or_else(|| EvalError::StackUnderflow {
            word: word.to_string(),
            needs: 2,
            depth,
        })?;
        let below = self.stack.pop().ok_or_else(|| EvalError::StackUnderflow {
            word: word.to_string(),
            needs: 2,
            depth,
        })?;
        Ok((below, top))
    }

    fn peek(&self, word: &str) -> Result<&Operand, EvalError> {
        self.stack.last().ok_or_else(|| EvalError::StackUnderflow {
            word: word.to_string(),
            needs: 1,
            depth: 0,
        })
    }

    fn pop_presentable(&mut self, word: &str) -> Result<Presentation, EvalError> {
        let operand = self.pop1(word)?;
        presentable(word, operand)
    }

    // --- operator helpers ---

    fn binary(&mut self, op: BinOp, a: Operand, b: Operand) -> Result<(), EvalError> {
        let word = op.symbol();
        if let (Operand::Num(x), Operand::Num(y)) = (&a, &b) {
            self.stack.push(Operand::Num(op.apply(*x, *y)));
            return Ok(());
        }
        let lhs = as_series_expr(word, a)?;
        let rhs = as_series_expr(word, b)?;
        self.stack.push(Operand::Series(TimeSeriesExpr::BinOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }));
        Ok(())
    }

    // --- expression evaluation ---

    fn eval_expr(&mut self, expr: &TimeSeriesExpr) -> Result<Vec<TimeSeries>, EvalError> {
        match expr {
            TimeSeriesExpr::Data(d) => self.eval_data(d),
            TimeSeriesExpr::Const { value, label } => Ok(vec![TimeSeries::with_label(
                Tags::new(),
                label.clone(),
                self.ctx.constant(*value)?,
            )]),
            TimeSeriesExpr::Scalar(v) => Ok(vec![TimeSeries::with_label(
                Tags::new(),
                format_number(*v),
                self.ctx.constant(*v)?,
            )]),
            TimeSeriesExpr::UnOp { op, expr } => {
                let name = match op {
                    UnOp::Abs => "abs",
                    UnOp::Neg => "neg",
                };
                Ok(self
                    .eval_expr(expr)?
                    .into_iter()
                    .map(|s| TimeSeries {
                        data: s.data.map(|v| op.apply(v)),
                        label: format!("{name}({})", s.label),
                        tags: s.tags,
                    })
                    .collect())
            }
            TimeSeriesExpr::BinOp { op, lhs, rhs } => {
                let left = self.eval_expr(lhs)?;
                let right = self.eval_expr(rhs)?;
                self.eval_binop(*op, left, right)
            }
        }
    }

    fn eval_binop(
        &mut self,
        op: BinOp,
        left: Vec<TimeSeries>,
        right: Vec<TimeSeries>,
    ) -> Result<Vec<TimeSeries>, EvalError> {
        let combine = |a: &TimeSeries, b: &TimeSeries| -> Result<TimeSeries, EvalError> {
            let data = a.data.zip_with(&b.data, |x, y| op.apply(x, y))?;
            let tags = if a.tags.is_empty() {
                b.tags.clone()
            } else {
                a.tags.clone()
            };
            Ok(TimeSeries {
                tags,
                label: format!("({} {} {})", a.label, op.symbol(), b.label),
                data,
            })
        };

        match (left.len(), right.len()) {
            (_, 1) => left.iter().map(|a| combine(a, &right[0])).collect(),
            (1, _) => right.iter().map(|b| combine(&left[0], b)).collect(),
            (n, m) if n == m => left
                .iter()
                .zip(&right)
                .map(|(a, b)| combine(a, b))
                .collect(),
            (n, m) => Err(EvalError::ArityMismatch {
                word: op.symbol().to_string(),
                lhs: n,
                rhs: m,
            }),
        }
    }

    fn eval_data(&mut self, expr: &DataExpr) -> Result<Vec<TimeSeries>, EvalError> {
        if let Some(hit) = self.cache.get(expr) {
            return Ok(hit.clone());
        }
        let out = match expr {
            DataExpr::Fetch(query) => {
                let mut found = self.fetch(query)?;
                found.sort_by(|a, b| a.label.cmp(&b.label));
                found
            }
            DataExpr::Aggregate { af, query } => {
                let members = self.fetch(query)?;
                let seqs: Vec<&TimeSeq> = members.iter().map(|s| &s.data).collect();
                match af.reduce(&seqs)? {
                    None => Vec::new(),
                    Some(data) => {
                        let tags = common_tags(&members);
                        vec![TimeSeries::with_label(
                            tags,
                            format!("{af}({query})"),
                            data,
                        )]
                    }
                }
            }
            DataExpr::GroupBy { af, keys, query } => {
                let members = self.fetch(query)?;
                group_by(&members, keys, *af)?
            }
        };
        self.cache.insert(expr.clone(), out.clone());
        Ok(out)
    }

    fn fetch(&mut self, query: &Query) -> Result<Vec<TimeSeries>, EvalError> {
        let found = self.index.find(query, self.ctx.start(), self.ctx.end())?;
        tracing::debug!(query = %query, matches = found.len(), "fetched series");
        found
            .into_iter()
            .map(|s| self.ctx.materialize(s).map_err(EvalError::from))
            .collect()
    }
}

/// Tags shared (same key and value) by every member.
fn common_tags(members: &[TimeSeries]) -> Tags {
    let Some(first) = members.first() else {
        return Tags::new();
    };
    first
        .tags
        .iter()
        .filter(|(k, v)| members.iter().all(|s| s.tags.get(*k) == Some(v)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Contiguous runs of non-zero, non-NaN samples as half-open `[s, e)`
/// bands. A run still open at the last sample closes at the sequence end.
/// Adjacent bands are never merged.
pub fn extract_spans(data: &TimeSeq) -> Vec<(i64, i64)> {
    let mut spans = Vec::new();
    let mut open: Option<i64> = None;
    for (t, v) in data.iter() {
        let active = !v.is_nan() && v != 0.0;
        match (active, open) {
            (true, None) => open = Some(t),
            (false, Some(s)) => {
                spans.push((s, t));
                open = None;
            }
            _ => {}
        }
    }
    if let Some(s) = open {
        spans.push((s, data.end()));
    }
    spans
}

fn type_mismatch(word: &str, expected: &'static str, found: &Operand) -> EvalError {
    EvalError::TypeMismatch {
        word: word.to_string(),
        expected,
        found: found.kind().to_string(),
    }
}

fn coerce_str(word: &str, operand: Operand) -> Result<String, EvalError> {
    match operand {
        Operand::Str(s) => Ok(s),
        Operand::Num(v) => Ok(format_number(v)),
        other => Err(type_mismatch(word, "string", &other)),
    }
}

fn as_query(word: &str, operand: Operand) -> Result<Query, EvalError> {
    match operand {
        Operand::Query(q) => Ok(q),
        other => Err(type_mismatch(word, "query", &other)),
    }
}

fn as_series_expr(word: &str, operand: Operand) -> Result<TimeSeriesExpr, EvalError> {
    match operand {
        Operand::Num(v) => Ok(TimeSeriesExpr::Scalar(v)),
        Operand::Query(q) => Ok(TimeSeriesExpr::Data(DataExpr::Fetch(q))),
        Operand::Data(d) => Ok(TimeSeriesExpr::Data(d)),
        Operand::Series(e) => Ok(e),
        other => Err(type_mismatch(word, "number, query, or series", &other)),
    }
}

fn presentable(word: &str, operand: Operand) -> Result<Presentation, EvalError> {
    match operand {
        Operand::Pres(p) => Ok(p),
        other => as_series_expr(word, other).map(Presentation::from_expr),
    }
}

/// `:color` accepts `#rrggbb` forms, bare hex (`ff0000`), and names.
fn parse_color(value: &str) -> Result<Color, ColorParseError> {
    match value.parse() {
        Ok(c) => Ok(c),
        Err(err) => {
            if matches!(value.len(), 3 | 6 | 8) && value.bytes().all(|b| b.is_ascii_hexdigit()) {
                format!("#{value}").parse().map_err(|_| err)
            } else {
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::lang::parser::parse_program;
    use crate::model::series::tags;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx() -> EvalContext {
        EvalContext::new(0, 300, 60, chrono_tz::UTC).unwrap()
    }

    fn corpus() -> MemoryIndex {
        let seq = |values: &[f64]| TimeSeq::new(0, 60, values.to_vec()).unwrap();
        MemoryIndex::new(vec![
            TimeSeries::new(
                tags(&[("name", "sps"), ("cluster", "b")]),
                seq(&[10.0, 10.0, 10.0, 10.0, 10.0]),
            ),
            TimeSeries::new(
                tags(&[("name", "sps"), ("cluster", "a")]),
                seq(&[1.0, 2.0, 3.0, 4.0, 5.0]),
            ),
            TimeSeries::new(
                tags(&[("name", "cpu"), ("host", "h1")]),
                seq(&[50.0, f64::NAN, 70.0, 80.0, 90.0]),
            ),
        ])
    }

    fn run(program: &str) -> Result<Vec<Evaluated>, EvalError> {
        let tokens = parse_program(program).unwrap();
        let context = ctx();
        let index = corpus();
        Evaluator::new(&context, &index).eval(&tokens)
    }

    #[test]
    fn fetch_sorts_by_label() {
        let out = run("name,sps,:eq").unwrap();
        assert_eq!(out.len(), 1);
        let labels: Vec<&str> = out[0].series.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["cluster=a,name=sps", "cluster=b,name=sps"]);
    }

    #[test]
    fn group_by_then_sum_keeps_groups() {
        let out = run("name,sps,:eq,(,cluster,),:by,:sum").unwrap();
        assert_eq!(out[0].series.len(), 2);
        assert_eq!(out[0].series[0].label, "cluster=a");
    }

    #[test]
    fn aggregate_collapses_to_one_series() {
        let out = run("name,sps,:eq,:sum").unwrap();
        assert_eq!(out[0].series.len(), 1);
        let s = &out[0].series[0];
        assert_eq!(s.label, "sum(name=sps)");
        assert_eq!(s.data.get(0), 11.0);
        // Common tags survive, differing ones do not.
        assert_eq!(s.tags.get("name").map(String::as_str), Some("sps"));
        assert!(!s.tags.contains_key("cluster"));
    }

    #[test]
    fn aggregation_is_nan_skipping() {
        let out = run("name,cpu,:eq,:avg").unwrap();
        let s = &out[0].series[0];
        assert_eq!(s.data.get(0), 50.0);
        assert!(s.data.get(1).is_nan());
    }

    #[test]
    fn empty_fetch_aggregates_to_nothing() {
        let out = run("name,nonexistent,:eq,:sum").unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].series.is_empty());
    }

    #[test]
    fn scalar_comparison_broadcasts() {
        let out = run("name,sps,:eq,:sum,12,:gt").unwrap();
        let s = &out[0].series[0];
        assert_eq!(s.label, "(sum(name=sps) > 12)");
        // Sums are 11,12,13,14,15 → 0,0,1,1,1.
        assert_eq!(s.data.values(), &[0.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn series_series_arithmetic_pairs_by_position() {
        let out = run("name,sps,:eq,(,cluster,),:by,name,sps,:eq,(,cluster,),:by,:add").unwrap();
        let series = &out[0].series;
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].data.get(0), 2.0); // a + a
        assert_eq!(series[1].data.get(0), 20.0); // b + b
    }

    #[test]
    fn nan_propagates_through_arithmetic() {
        let out = run("name,cpu,:eq,1,:add").unwrap();
        let s = &out[0].series[0];
        assert_eq!(s.data.get(0), 51.0);
        assert!(s.data.get(1).is_nan());
    }

    #[test]
    fn const_produces_full_window_series() {
        let out = run("50e3,:const").unwrap();
        let s = &out[0].series[0];
        assert_eq!(s.label, "50000");
        assert_eq!(s.data.len(), 5);
        assert!(s.data.values().iter().all(|&v| v == 50_000.0));
    }

    #[test]
    fn decorators_set_attributes() {
        let out = run("name,sps,:eq,:sum,:area,ff0000,:color,3,:lw,40,:alpha,traffic,:legend,1,:axis")
            .unwrap();
        let e = &out[0];
        assert_eq!(e.style, LineStyle::Area);
        assert_eq!(e.color, Some(Color::rgb(0xff, 0, 0)));
        assert_eq!(e.line_width, 3);
        assert_eq!(e.alpha, 40);
        assert_eq!(e.label.as_deref(), Some("traffic"));
        assert_eq!(e.axis, Axis::Right);
    }

    #[test]
    fn vspan_marks_presentation() {
        let out = run("name,sps,:eq,:sum,12,:gt,:vspan,40,:alpha,triggered,:legend").unwrap();
        assert_eq!(out[0].output, OutputKind::Spans);
        assert_eq!(out[0].alpha, 40);
        assert_eq!(out[0].label.as_deref(), Some("triggered"));
    }

    #[test]
    fn stack_words() {
        // dup: two presentations from one expression
        assert_eq!(run("name,sps,:eq,:sum,:dup").unwrap().len(), 2);
        // drop: nothing left
        assert!(run("name,sps,:eq,:sum,:drop").unwrap().is_empty());
        // swap: legend binds to the first expression
        let out = run("name,sps,:eq,:sum,name,cpu,:eq,:sum,:swap,one,:legend").unwrap();
        assert_eq!(out[0].label, None);
        assert_eq!(out[1].label.as_deref(), Some("one"));
    }

    #[test]
    fn rot_cycles_three() {
        // a b c -> b c a: the legend lands on what was deepest.
        let out = run(
            "name,sps,:eq,:sum,name,cpu,:eq,:sum,name,cpu,:eq,:count,:rot,first,:legend",
        )
        .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].label.as_deref(), Some("first"));
        assert_eq!(out[2].series[0].label, "sum(name=sps)");
    }

    #[test]
    fn two_over_copies_third() {
        let out = run("name,sps,:eq,:sum,name,cpu,:eq,:sum,name,cpu,:eq,:count,:2over").unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[3].series[0].label, "sum(name=sps)");
    }

    #[test]
    fn unknown_word() {
        assert!(matches!(
            run("name,sps,:eq,:frobnicate"),
            Err(EvalError::UnknownWord { word }) if word == "frobnicate"
        ));
    }

    #[test]
    fn stack_underflow() {
        assert!(matches!(
            run(":and"),
            Err(EvalError::StackUnderflow { needs: 2, .. })
        ));
    }

    #[test]
    fn type_mismatch_reports_operator_and_kinds() {
        let err = run("name,sps,:eq,:sum,name,:lw").unwrap_err();
        match err {
            EvalError::TypeMismatch { word, found, .. } => {
                assert_eq!(word, "lw");
                assert_eq!(found, "string");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn leftover_literal_is_an_error() {
        assert!(matches!(
            run("name,sps,:eq,:sum,42"),
            Err(EvalError::LeftoverOperand { kind: "number" })
        ));
    }

    #[test]
    fn bad_alpha_rejected() {
        assert!(run("name,sps,:eq,:sum,400,:alpha").is_err());
    }

    #[test]
    fn bad_color_rejected() {
        assert!(matches!(
            run("name,sps,:eq,:sum,notacolor,:color"),
            Err(EvalError::BadColor { .. })
        ));
    }

    #[test]
    fn empty_program_is_empty_output() {
        assert!(run("").unwrap().is_empty());
    }

    #[test]
    fn extract_spans_half_open_monotonic() {
        let seq = TimeSeq::new(
            0,
            60,
            vec![0.0, 1.0, 1.0, 0.0, f64::NAN, 2.0, 0.0, 3.0],
        )
        .unwrap();
        let spans = extract_spans(&seq);
        assert_eq!(spans, vec![(60, 180), (300, 360), (420, 480)]);
        for window in spans.windows(2) {
            assert!(window[0].1 <= window[1].0);
        }
        for (s, e) in spans {
            assert!(s < e);
        }
    }

    #[test]
    fn span_open_at_end_closes_at_window_end() {
        let seq = TimeSeq::new(0, 60, vec![0.0, 1.0, 1.0]).unwrap();
        assert_eq!(extract_spans(&seq), vec![(60, 180)]);
    }

    #[test]
    fn data_expressions_are_evaluated_once() {
        struct Counting {
            inner: MemoryIndex,
            calls: AtomicUsize,
        }
        impl TagIndex for Counting {
            fn find(
                &self,
                query: &Query,
                start: i64,
                end: i64,
            ) -> Result<Vec<TimeSeries>, IndexError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.inner.find(query, start, end)
            }
            fn tag_keys(&self) -> Vec<String> {
                self.inner.tag_keys()
            }
        }

        let index = Counting {
            inner: corpus(),
            calls: AtomicUsize::new(0),
        };
        let context = ctx();
        let tokens =
            parse_program("name,sps,:eq,(,cluster,),:by,name,sps,:eq,(,cluster,),:by").unwrap();
        let out = Evaluator::new(&context, &index).eval(&tokens).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(index.calls.load(Ordering::SeqCst), 1);
    }
}
