//! Tick selection for both axes.
//!
//! Y ticks walk the 1-2-5 ladder until between three and eight ticks fit
//! the value range. X ticks pick the finest calendar step that keeps the
//! label count at or under ten, formatted in the context timezone.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// One y-axis tick: the data value and its rendered label.
#[derive(Debug, Clone, PartialEq)]
pub struct YTick {
    pub value: f64,
    pub label: String,
}

/// One x-axis tick: instant in epoch milliseconds and its label.
#[derive(Debug, Clone, PartialEq)]
pub struct XTick {
    pub time: i64,
    pub label: String,
}

const MAX_Y_TICKS: usize = 8;

/// Choose the smallest `{1,2,5}·10^k` step that yields at most eight
/// ticks over `[lo, hi]`, then emit every multiple inside the range.
pub fn y_ticks(lo: f64, hi: f64) -> Vec<YTick> {
    let range = hi - lo;
    if !(range.is_finite() && range > 0.0) {
        return Vec::new();
    }

    let mut exp = (range.log10().floor() as i32) - 1;
    loop {
        for mantissa in [1.0, 2.0, 5.0] {
            let step = mantissa * 10.0_f64.powi(exp);
            let count = tick_count(lo, hi, step);
            if count <= MAX_Y_TICKS {
                return multiples(lo, hi, step)
                    .map(|value| YTick {
                        value,
                        label: format_value(value),
                    })
                    .collect();
            }
        }
        exp += 1;
    }
}

fn tick_count(lo: f64, hi: f64, step: f64) -> usize {
    multiples(lo, hi, step).count()
}

fn multiples(lo: f64, hi: f64, step: f64) -> impl Iterator<Item = f64> {
    let first = (lo / step).ceil() as i64;
    let last = (hi / step).floor() as i64;
    (first..=last).map(move |i| i as f64 * step)
}

/// Format a tick value compactly: SI suffixes above 1e3, trimmed decimals
/// below.
pub fn format_value(v: f64) -> String {
    let abs = v.abs();
    if abs >= 1e9 {
        trim(format!("{:.1}", v / 1e9)) + "G"
    } else if abs >= 1e6 {
        trim(format!("{:.1}", v / 1e6)) + "M"
    } else if abs >= 1e3 {
        trim(format!("{:.1}", v / 1e3)) + "k"
    } else if v == v.trunc() && abs < 1e3 {
        format!("{}", v as i64)
    } else if abs >= 1.0 {
        trim(format!("{v:.1}"))
    } else {
        trim(format!("{v:.2}"))
    }
}

fn trim(s: String) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

const SECOND: i64 = 1_000;
const MINUTE: i64 = 60 * SECOND;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Candidate x steps, finest first.
const X_STEPS: [i64; 8] = [
    10 * SECOND,
    MINUTE,
    5 * MINUTE,
    15 * MINUTE,
    HOUR,
    6 * HOUR,
    DAY,
    7 * DAY,
];

const MAX_X_TICKS: i64 = 10;

/// Ticks for the time axis over `[start, end)`, labelled in `tz`.
pub fn x_ticks(start: i64, end: i64, tz: Tz) -> Vec<XTick> {
    let span = end - start;
    if span <= 0 {
        return Vec::new();
    }
    let step = X_STEPS
        .into_iter()
        .find(|s| span / s <= MAX_X_TICKS)
        .unwrap_or_else(|| {
            // Weeks still overflow: widen in whole weeks.
            let weeks = span / (7 * DAY * MAX_X_TICKS) + 1;
            weeks * 7 * DAY
        });

    let first = start.div_euclid(step) * step;
    let mut ticks = Vec::new();
    let mut t = first;
    while t < end {
        if t >= start {
            ticks.push(XTick {
                time: t,
                label: format_time(t, step, tz),
            });
        }
        t += step;
    }
    ticks
}

fn format_time(t: i64, step: i64, tz: Tz) -> String {
    let Some(utc) = DateTime::<Utc>::from_timestamp_millis(t) else {
        return String::new();
    };
    let local = utc.with_timezone(&tz);
    let pattern = if step < MINUTE {
        "%H:%M:%S"
    } else if step < DAY {
        "%H:%M"
    } else {
        "%m-%d"
    };
    local.format(pattern).to_string()
}
