//! Formats a [`Snapshot`] into a full ANSI frame.
//!
//! Layout: title, optional debug log, optional warnings, then one bordered
//! price table per cluster with columns padded to the widest cell.

use crate::shared::error::RenderError;
use crate::shared::snapshot::Snapshot;
use crate::shared::types::{Cluster, TickRecord};
use chrono::{DateTime, TimeDelta, Utc};
use crossterm::style::{Color, StyledContent, Stylize};

pub const TITLE: &str = "Terminal Stock Viewer";

const C_UP: Color = Color::Green;
const C_DOWN: Color = Color::Red;
const C_NEUTRAL: Color = Color::Reset;

/// Spaces and the inner separator between the two side borders of a row
const ROW_OVERHEAD: usize = 7;

/// One table row, plain text before styling
#[derive(Debug, Clone, PartialEq)]
struct DisplayRow {
    ticker: String,
    price: String,
    change: String,
    age: String,
    color: Color,
    struck: bool,
}

impl DisplayRow {
    fn new(
        ticker: &str,
        record: &TickRecord,
        struck: bool,
        now: DateTime<Utc>,
    ) -> Result<Self, RenderError> {
        validate_record(ticker, record)?;
        Ok(Self {
            ticker: ticker.to_string(),
            price: record
                .current_price
                .map(format_price)
                .unwrap_or_else(|| "--".to_string()),
            change: format_change(record),
            age: format!("[{} old]", format_age(now - record.last_updated)),
            color: row_color(record),
            struck,
        })
    }
}

/// Column widths for one partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Widths {
    ticker: usize,
    price: usize,
    change: usize,
    age: usize,
}

impl Widths {
    fn of(rows: &[DisplayRow]) -> Self {
        rows.iter().fold(Self::default(), |w, row| Self {
            ticker: w.ticker.max(row.ticker.chars().count()),
            price: w.price.max(row.price.chars().count()),
            change: w.change.max(row.change.chars().count()),
            age: w.age.max(row.age.chars().count()),
        })
    }

    fn inner(&self) -> usize {
        self.ticker + self.price + self.change + self.age + ROW_OVERHEAD
    }
}

/// Render the whole frame for `snapshot` as seen at `now`
pub fn render_snapshot(
    snapshot: &Snapshot,
    debug_mode: bool,
    now: DateTime<Utc>,
) -> Result<String, RenderError> {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", TITLE.bold()));

    if debug_mode && !snapshot.debug_messages.is_empty() {
        out.push_str("Debug Logs:\n");
        for message in snapshot.debug_messages.iter() {
            out.push_str(&format!("\t{message}\n"));
        }
        out.push('\n');
    }

    if !snapshot.warnings.is_empty() {
        out.push_str("Warnings:\n");
        for warning in snapshot.warnings.iter() {
            out.push_str(&format!("\t{warning}\n"));
        }
    }

    out.push_str(&render_prices(snapshot, now)?);
    Ok(out)
}

fn render_prices(snapshot: &Snapshot, now: DateTime<Utc>) -> Result<String, RenderError> {
    if snapshot.prices.is_empty() {
        return Ok("no data!".to_string());
    }

    let mut out = String::new();
    for (cluster, entries) in snapshot.partitions() {
        let rows = entries
            .into_iter()
            .map(|(ticker, record)| {
                DisplayRow::new(ticker, record, snapshot.is_disconnected(ticker), now)
            })
            .collect::<Result<Vec<_>, _>>()?;
        out.push_str(&render_partition(cluster, &rows));
    }
    Ok(out)
}

fn render_partition(cluster: Cluster, rows: &[DisplayRow]) -> String {
    let widths = Widths::of(rows);
    let border = "─".repeat(widths.inner());

    let mut out = format!("\n{cluster}:\n");
    out.push_str(&format!("┌{border}┐\n"));
    for row in rows {
        out.push_str(&format!("│ {} │\n", render_row(row, &widths)));
    }
    out.push_str(&format!("└{border}┘"));
    out
}

fn render_row(row: &DisplayRow, widths: &Widths) -> String {
    let span = |text: String, bold: bool| -> StyledContent<String> {
        let mut content = text.with(row.color);
        if bold {
            content = content.bold();
        }
        if row.struck {
            content = content.crossed_out();
        }
        content
    };

    let separator = if row.struck {
        " │ ".crossed_out().to_string()
    } else {
        " │ ".to_string()
    };

    format!(
        "{}{}{}{}{}",
        span(format!("{:<w$}", row.ticker, w = widths.ticker), true),
        separator,
        span(format!("{:<w$}", row.price, w = widths.price), true),
        span(format!(" {:<w$}", row.change, w = widths.change), false),
        span(format!(" {:<w$}", row.age, w = widths.age), false),
    )
}

fn validate_record(ticker: &str, record: &TickRecord) -> Result<(), RenderError> {
    let fields = [
        ("current price", record.current_price),
        ("previous close", record.previous_close),
    ];
    for (field, value) in fields {
        if let Some(value) = value {
            if !value.is_finite() || value < 0.0 {
                return Err(RenderError::InvalidPrice {
                    instrument: ticker.to_string(),
                    field,
                    value,
                });
            }
        }
    }
    Ok(())
}

/// US dollar formatting with thousands separators, e.g. `$1,234.56`
pub fn format_price(price: f64) -> String {
    let fixed = format!("{:.2}", price.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if price < 0.0 { "-" } else { "" };
    format!("{sign}${grouped}.{cents}")
}

/// Signed percent change vs previous close: `+5.00%`, `-5.00%`, or empty if unknown
pub fn format_change(record: &TickRecord) -> String {
    match record.change_ratio() {
        Some(ratio) if ratio >= 0.0 => format!("+{:.2}%", ratio * 100.0),
        Some(ratio) => format!("{:.2}%", ratio * 100.0),
        None => String::new(),
    }
}

/// Largest non-zero unit then every smaller unit down to seconds, e.g. `1d00h05m00s`.
/// Anything under a second (including negative skew) is `<1s`.
pub fn format_age(age: TimeDelta) -> String {
    let total = age.num_seconds();
    if total < 1 {
        return "<1s".to_string();
    }

    let days = total / 86_400;
    let hours = total % 86_400 / 3_600;
    let minutes = total % 3_600 / 60;
    let seconds = total % 60;

    let mut out = String::new();
    let mut shown = false;
    if days > 0 {
        out.push_str(&format!("{days}d"));
        shown = true;
    }
    if shown || hours > 0 {
        out.push_str(&format!("{hours:02}h"));
        shown = true;
    }
    if shown || minutes > 0 {
        out.push_str(&format!("{minutes:02}m"));
    }
    out.push_str(&format!("{seconds:02}s"));
    out
}

/// Green above previous close, red below, neutral when equal or unknown
pub fn row_color(record: &TickRecord) -> Color {
    match (record.current_price, record.previous_close) {
        (Some(current), Some(previous)) if current > previous => C_UP,
        (Some(current), Some(previous)) if current < previous => C_DOWN,
        _ => C_NEUTRAL,
    }
}
