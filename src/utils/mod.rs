use crate::models::DateWindow;
use anyhow::{bail, Result};
use chrono::NaiveDate;
use std::time::Instant;
use tracing::info;

/// Logs how long a labelled stage took when dropped.
pub struct Timer {
    label: &'static str,
    start: Instant,
}

impl Timer {
    pub fn start(label: &'static str) -> Self {
        info!(stage = label, "started");
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!(stage = self.label, "finished in {:.2?}", self.start.elapsed());
    }
}

/// Thousands separators: 1234567 → "1,234,567".
pub fn fmt_number(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Date window for a run: explicit `since`/`until`, or the trailing
/// `days` ending today. `until` alone defaults `since` to the lookback.
pub fn resolve_window(
    since: Option<NaiveDate>,
    until: Option<NaiveDate>,
    days: u32,
    today: NaiveDate,
) -> Result<DateWindow> {
    let until = until.unwrap_or(today);
    let since = match since {
        Some(since) => since,
        None => match DateWindow::trailing(until, days) {
            Some(w) => w.since,
            None => bail!("a {} day lookback from {} is out of range", days, until),
        },
    };
    match DateWindow::new(since, until) {
        Some(w) => Ok(w),
        None => bail!("--since {} is after --until {}", since, until),
    }
}
