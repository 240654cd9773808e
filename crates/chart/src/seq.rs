use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A fixed-step time sequence.
///
/// `values[i]` is the sample at `start + i * step` (both milliseconds).
/// Missing samples are NaN. The covered window is `[start, start + step * len)`.
///
/// Sequences are immutable after construction; every combinator returns a
/// new sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeq {
    start: i64,
    step: i64,
    #[serde(with = "json_values")]
    values: Vec<f64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum SeqError {
    #[error("step must be positive, got {step}")]
    NonPositiveStep { step: i64 },
    #[error("start {start} is not aligned to step {step}")]
    UnalignedStart { start: i64, step: i64 },
    #[error("sequences are misaligned: ({0}, step {1}) vs ({2}, step {3})")]
    Misaligned(i64, i64, i64, i64),
}

impl TimeSeq {
    pub fn new(start: i64, step: i64, values: Vec<f64>) -> Result<Self, SeqError> {
        if step <= 0 {
            return Err(SeqError::NonPositiveStep { step });
        }
        if start % step != 0 {
            return Err(SeqError::UnalignedStart { start, step });
        }
        Ok(Self { start, step, values })
    }

    /// A sequence covering `[start, end)` with `value` at every sample.
    pub fn constant(start: i64, end: i64, step: i64, value: f64) -> Result<Self, SeqError> {
        let len = ((end - start).max(0) / step.max(1)) as usize;
        Self::new(start, step, vec![value; len])
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    /// One past the last covered instant: `start + step * len`.
    pub fn end(&self) -> i64 {
        self.start + self.step * self.values.len() as i64
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Sample at index `i`, NaN when out of range.
    pub fn get(&self, i: usize) -> f64 {
        self.values.get(i).copied().unwrap_or(f64::NAN)
    }

    pub fn time_at(&self, i: usize) -> i64 {
        self.start + self.step * i as i64
    }

    /// Sample at instant `t`, NaN outside the covered window.
    pub fn at_time(&self, t: i64) -> f64 {
        if t < self.start {
            return f64::NAN;
        }
        self.get(((t - self.start) / self.step) as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(i, &v)| (self.time_at(i), v))
    }

    /// Restrict (or extend) the sequence to `[bound_start, bound_end)`.
    ///
    /// Bounds are floored to the step grid. Samples outside the original
    /// window come back as NaN, so the result always has exactly
    /// `(bound_end - bound_start) / step` samples.
    pub fn bounded(&self, bound_start: i64, bound_end: i64) -> Self {
        let step = self.step;
        let start = bound_start.div_euclid(step) * step;
        let end = bound_end.div_euclid(step) * step;
        let len = ((end - start).max(0) / step) as usize;
        let values = (0..len)
            .map(|i| self.at_time(start + step * i as i64))
            .collect();
        Self { start, step, values }
    }

    /// Elementwise combination of two aligned sequences.
    ///
    /// Both sides must share start, step, and length; the evaluator always
    /// materialises series on the context grid before combining them.
    pub fn zip_with(
        &self,
        other: &TimeSeq,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Self, SeqError> {
        if self.start != other.start || self.step != other.step || self.len() != other.len() {
            return Err(SeqError::Misaligned(
                self.start,
                self.step,
                other.start,
                other.step,
            ));
        }
        let values = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(Self {
            start: self.start,
            step: self.step,
            values,
        })
    }

    /// Elementwise transform.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            start: self.start,
            step: self.step,
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }
}

// NaN must compare equal to itself here, otherwise codec round-trip
// equality fails on any series with a gap.
impl PartialEq for TimeSeq {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start
            && self.step == other.step
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| a == b || (a.is_nan() && b.is_nan()))
    }
}

/// JSON has no NaN or infinity, so samples serialize as numbers when finite,
/// `null` for NaN, and `"Infinity"` / `"-Infinity"` strings otherwise.
mod json_values {
    use serde::de::{SeqAccess, Visitor};
    use serde::ser::SerializeSeq;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for &v in values {
            if v.is_nan() {
                seq.serialize_element(&Option::<f64>::None)?;
            } else if v == f64::INFINITY {
                seq.serialize_element("Infinity")?;
            } else if v == f64::NEG_INFINITY {
                seq.serialize_element("-Infinity")?;
            } else {
                seq.serialize_element(&v)?;
            }
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        struct ValuesVisitor;

        impl<'de> Visitor<'de> for ValuesVisitor {
            type Value = Vec<f64>;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a sequence of numbers, nulls, or infinity strings")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<f64>, A::Error> {
                #[derive(serde::Deserialize)]
                #[serde(untagged)]
                enum Sample {
                    Number(Option<f64>),
                    Text(String),
                }

                let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(sample) = seq.next_element::<Sample>()? {
                    out.push(match sample {
                        Sample::Number(Some(v)) => v,
                        Sample::Number(None) => f64::NAN,
                        Sample::Text(s) if s == "Infinity" => f64::INFINITY,
                        Sample::Text(s) if s == "-Infinity" => f64::NEG_INFINITY,
                        Sample::Text(s) => {
                            return Err(serde::de::Error::custom(format!(
                                "unexpected sample {s:?}"
                            )));
                        }
                    });
                }
                Ok(out)
            }
        }

        deserializer.deserialize_seq(ValuesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(start: i64, step: i64, values: &[f64]) -> TimeSeq {
        TimeSeq::new(start, step, values.to_vec()).unwrap()
    }

    #[test]
    fn rejects_bad_spec() {
        assert_eq!(
            TimeSeq::new(0, 0, vec![]),
            Err(SeqError::NonPositiveStep { step: 0 })
        );
        assert_eq!(
            TimeSeq::new(10, 60_000, vec![]),
            Err(SeqError::UnalignedStart {
                start: 10,
                step: 60_000
            })
        );
    }

    #[test]
    fn window_and_access() {
        let s = seq(120, 60, &[1.0, 2.0, 3.0]);
        assert_eq!(s.end(), 300);
        assert_eq!(s.time_at(2), 240);
        assert_eq!(s.at_time(180), 2.0);
        assert!(s.at_time(300).is_nan());
        assert!(s.at_time(0).is_nan());
    }

    #[test]
    fn bounded_truncates_and_pads() {
        let s = seq(120, 60, &[1.0, 2.0, 3.0]);
        let b = s.bounded(60, 360);
        assert_eq!(b.start(), 60);
        assert_eq!(b.len(), 5);
        assert!(b.get(0).is_nan()); // before original start
        assert_eq!(b.get(1), 1.0);
        assert_eq!(b.get(3), 3.0);
        assert!(b.get(4).is_nan()); // past original end

        let inner = s.bounded(180, 240);
        assert_eq!(inner.len(), 1);
        assert_eq!(inner.get(0), 2.0);
    }

    #[test]
    fn zip_propagates_nan() {
        let a = seq(0, 60, &[1.0, f64::NAN, 3.0]);
        let b = seq(0, 60, &[10.0, 20.0, f64::NAN]);
        let sum = a.zip_with(&b, |x, y| x + y).unwrap();
        assert_eq!(sum.get(0), 11.0);
        assert!(sum.get(1).is_nan());
        assert!(sum.get(2).is_nan());
    }

    #[test]
    fn zip_rejects_misaligned() {
        let a = seq(0, 60, &[1.0]);
        let b = seq(60, 60, &[1.0]);
        assert!(matches!(a.zip_with(&b, |x, _| x), Err(SeqError::Misaligned(..))));
    }

    #[test]
    fn division_edge_cases() {
        let a = seq(0, 60, &[0.0, 1.0, -1.0]);
        let b = seq(0, 60, &[0.0, 0.0, 0.0]);
        let q = a.zip_with(&b, |x, y| x / y).unwrap();
        assert!(q.get(0).is_nan()); // 0/0
        assert_eq!(q.get(1), f64::INFINITY);
        assert_eq!(q.get(2), f64::NEG_INFINITY);
    }

    #[test]
    fn constant_covers_window() {
        let c = TimeSeq::constant(0, 300, 60, 42.0).unwrap();
        assert_eq!(c.len(), 5);
        assert!(c.values().iter().all(|&v| v == 42.0));
    }

    #[test]
    fn nan_aware_equality() {
        let a = seq(0, 60, &[1.0, f64::NAN]);
        let b = seq(0, 60, &[1.0, f64::NAN]);
        assert_eq!(a, b);
        assert_ne!(a, seq(0, 60, &[1.0, 2.0]));
    }

    #[test]
    fn serde_preserves_gaps_and_infinities() {
        let s = seq(0, 60, &[1.5, f64::NAN, f64::INFINITY, f64::NEG_INFINITY]);
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("null"));
        assert!(json.contains("\"Infinity\""));
        let back: TimeSeq = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
