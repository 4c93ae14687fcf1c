//! Evaluation window strings: `Nd`, `Nh`, `Nw`.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{EvalError, EvaluationWindow, Result};

static WINDOW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)([dhw])$").expect("Invalid window regex"));

/// Window ending now.
pub fn parse_window(s: &str) -> Result<EvaluationWindow> {
    parse_window_at(s, Utc::now())
}

/// Window ending at `now`.
pub fn parse_window_at(s: &str, now: DateTime<Utc>) -> Result<EvaluationWindow> {
    let invalid = || EvalError::InvalidConfig(format!("Invalid window format: {s}"));
    let caps = WINDOW.captures(s.trim()).ok_or_else(invalid)?;
    let n: i64 = caps[1].parse().map_err(|_| invalid())?;
    if n == 0 {
        return Err(invalid());
    }
    let span = match &caps[2] {
        "h" => Duration::try_hours(n),
        "d" => Duration::try_days(n),
        "w" => Duration::try_weeks(n),
        _ => None,
    }
    .ok_or_else(invalid)?;
    Ok(EvaluationWindow::new(now - span, now))
}
