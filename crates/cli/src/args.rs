use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::Parser;
use thiserror::Error;

use strata_chart::{Layout, Palette, Theme};

#[derive(Parser, Debug)]
#[command(
    name = "strata",
    version,
    about = "Render a time-series graph from a stack query program"
)]
pub struct Args {
    /// Postfix query program.
    #[arg(long = "q")]
    pub query: String,

    /// Start time: ISO-8601, or relative to the end like `e-1w`.
    #[arg(long = "s", default_value = "e-3h")]
    pub start: String,

    /// End time: `now`, ISO-8601, or relative to the start like `s+1d`.
    #[arg(long = "e", default_value = "now")]
    pub end: String,

    /// Step in milliseconds.
    #[arg(long, default_value_t = 60_000)]
    pub step: i64,

    /// Timezone for tick labels (IANA name).
    #[arg(long, default_value = "UTC")]
    pub tz: String,

    /// Canvas width in pixels.
    #[arg(long = "w", default_value_t = 700)]
    pub width: u32,

    /// Canvas height in pixels.
    #[arg(long = "h", default_value_t = 300)]
    pub height: u32,

    #[arg(long, default_value = "light", value_parser = Theme::from_str)]
    pub theme: Theme,

    #[arg(long, default_value = "single", value_parser = Layout::from_str)]
    pub layout: Layout,

    #[arg(long, default_value = "default", value_parser = Palette::from_str)]
    pub palette: Palette,

    /// Skip the legend band.
    #[arg(long = "no-legend")]
    pub no_legend: bool,

    /// Graph title.
    #[arg(long)]
    pub title: Option<String>,

    /// Left axis label.
    #[arg(long)]
    pub ylabel: Option<String>,

    /// Corpus file: a JSON array of tagged series.
    #[arg(long)]
    pub data: PathBuf,

    /// PNG destination.
    #[arg(long)]
    pub out: PathBuf,

    /// Optional GraphDef V2 destination (`.gz` gzips it).
    #[arg(long = "emit-v2")]
    pub emit_v2: Option<PathBuf>,
}

#[derive(Debug, Error, PartialEq)]
pub enum UsageError {
    #[error("cannot parse time {0:?} (expected `now`, ISO-8601, or e-/s+ relative form)")]
    BadTime(String),
    #[error("start and end must not both be relative")]
    CircularWindow,
    #[error("step must be positive, got {0}")]
    BadStep(i64),
    #[error("window is empty: start {start} is not before end {end}")]
    EmptyWindow { start: i64, end: i64 },
    #[error("unknown timezone {0:?}")]
    BadTimezone(String),
}

enum TimeArg {
    Absolute(i64),
    /// Offset in ms from the other boundary: negative from the end
    /// (`e-1w`), positive from the start (`s+1d`).
    FromEnd(i64),
    FromStart(i64),
}

/// Resolve `--s`/`--e` into an aligned `[start, end)` window.
pub fn resolve_window(
    start: &str,
    end: &str,
    step: i64,
    now: DateTime<Utc>,
) -> Result<(i64, i64), UsageError> {
    if step <= 0 {
        return Err(UsageError::BadStep(step));
    }
    let align = |t: i64| t.div_euclid(step) * step;

    let start_arg = parse_time_arg(start, now)?;
    let end_arg = parse_time_arg(end, now)?;

    let (start_ms, end_ms) = match (start_arg, end_arg) {
        (TimeArg::Absolute(s), TimeArg::Absolute(e)) => (s, e),
        (TimeArg::FromEnd(offset), TimeArg::Absolute(e)) => (e + offset, e),
        (TimeArg::Absolute(s), TimeArg::FromStart(offset)) => (s, s + offset),
        _ => return Err(UsageError::CircularWindow),
    };

    let (start_ms, end_ms) = (align(start_ms), align(end_ms));
    if start_ms >= end_ms {
        return Err(UsageError::EmptyWindow {
            start: start_ms,
            end: end_ms,
        });
    }
    Ok((start_ms, end_ms))
}

fn parse_time_arg(text: &str, now: DateTime<Utc>) -> Result<TimeArg, UsageError> {
    if text == "now" {
        return Ok(TimeArg::Absolute(now.timestamp_millis()));
    }
    if let Some(rest) = text.strip_prefix("e-") {
        return Ok(TimeArg::FromEnd(-parse_duration(text, rest)?));
    }
    if let Some(rest) = text.strip_prefix("s+") {
        return Ok(TimeArg::FromStart(parse_duration(text, rest)?));
    }
    parse_absolute(text)
        .map(TimeArg::Absolute)
        .ok_or_else(|| UsageError::BadTime(text.to_string()))
}

/// `<N><unit>` with unit in s/m/h/d/w, returned in milliseconds.
fn parse_duration(whole: &str, rest: &str) -> Result<i64, UsageError> {
    let bad = || UsageError::BadTime(whole.to_string());
    if !rest.is_ascii() {
        return Err(bad());
    }
    let (digits, unit) = rest.split_at(rest.len().saturating_sub(1));
    let n: i64 = digits.parse().map_err(|_| bad())?;
    if n <= 0 {
        return Err(bad());
    }
    let unit_ms = match unit {
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        "w" => 7 * 86_400_000,
        _ => return Err(bad()),
    };
    Ok(n * unit_ms)
}

fn parse_absolute(text: &str) -> Option<i64> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%MZ", "%Y-%m-%dT%H:%M:%SZ"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some(midnight.and_utc().timestamp_millis());
    }
    None
}

pub fn resolve_tz(name: &str) -> Result<chrono_tz::Tz, UsageError> {
    name.parse()
        .map_err(|_| UsageError::BadTimezone(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 30).unwrap()
    }

    #[test]
    fn default_style_window() {
        let (s, e) = resolve_window("e-3h", "now", 60_000, now()).unwrap();
        // `now` aligns down to the minute.
        assert_eq!(e, now().timestamp_millis() - 30_000);
        assert_eq!(e - s, 3 * 3_600_000);
    }

    #[test]
    fn absolute_iso_window() {
        let (s, e) =
            resolve_window("2011-12-25T00:00Z", "2012-01-01T00:00Z", 60_000, now()).unwrap();
        assert_eq!(s, 1_324_771_200_000);
        assert_eq!(e - s, 7 * 86_400_000);
    }

    #[test]
    fn rfc3339_and_date_forms() {
        assert!(parse_absolute("2011-12-25T00:00:00+00:00").is_some());
        assert!(parse_absolute("2011-12-25T06:30:00Z").is_some());
        assert_eq!(parse_absolute("2011-12-25"), Some(1_324_771_200_000));
        assert!(parse_absolute("christmas").is_none());
    }

    #[test]
    fn start_plus_relative_end() {
        let (s, e) = resolve_window("2011-12-25T00:00Z", "s+1d", 60_000, now()).unwrap();
        assert_eq!(e - s, 86_400_000);
    }

    #[test]
    fn both_relative_is_circular() {
        assert_eq!(
            resolve_window("e-1h", "s+1h", 60_000, now()),
            Err(UsageError::CircularWindow)
        );
    }

    #[test]
    fn duration_units() {
        for (text, ms) in [
            ("e-30s", 30_000),
            ("e-5m", 300_000),
            ("e-2h", 7_200_000),
            ("e-1d", 86_400_000),
            ("e-1w", 604_800_000),
        ] {
            let (s, e) = resolve_window(text, "2012-01-01T00:00Z", 1_000, now()).unwrap();
            assert_eq!(e - s, ms, "{text}");
        }
    }

    #[test]
    fn malformed_relative_times() {
        for text in ["e-w", "e-0h", "e-1y", "e-1.5h", "soon"] {
            assert!(
                matches!(
                    resolve_window(text, "now", 60_000, now()),
                    Err(UsageError::BadTime(_))
                ),
                "{text} should be rejected"
            );
        }
    }

    #[test]
    fn bad_step_and_empty_window() {
        assert_eq!(
            resolve_window("e-1h", "now", 0, now()),
            Err(UsageError::BadStep(0))
        );
        assert!(matches!(
            resolve_window("2012-01-01T00:00Z", "2012-01-01T00:00Z", 60_000, now()),
            Err(UsageError::EmptyWindow { .. })
        ));
    }

    #[test]
    fn timezone_resolution() {
        assert!(resolve_tz("US/Pacific").is_ok());
        assert!(resolve_tz("Mars/Olympus").is_err());
    }

    #[test]
    fn args_parse_smoke() {
        let args = Args::try_parse_from([
            "strata",
            "--q",
            "name,sps,:eq,:sum",
            "--data",
            "corpus.json",
            "--out",
            "graph.png",
            "--theme",
            "dark",
            "--layout",
            "axes",
            "--no-legend",
        ])
        .unwrap();
        assert_eq!(args.theme, Theme::Dark);
        assert_eq!(args.layout, Layout::Axes);
        assert!(args.no_legend);
    }

    #[test]
    fn unknown_theme_is_a_usage_error() {
        let result = Args::try_parse_from([
            "strata",
            "--q",
            "x",
            "--data",
            "c.json",
            "--out",
            "g.png",
            "--theme",
            "sepia",
        ]);
        assert!(result.is_err());
    }
}
