//! Sample type and CSV row format.

use std::borrow::Cow;

use chrono::{DateTime, Local};

/// Timestamp format used in the `timestamp datetime` column, microsecond
/// precision, local time.
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Column names, in the order rows are written.
pub const CSV_COLUMNS: [&str; 7] = [
    "test id",
    "sensor label",
    "timestamp epoch sec",
    "timestamp datetime",
    "power mW",
    "supply voltage V",
    "current mA",
];

/// The header row as written to the log file.
pub fn header_row() -> String {
    CSV_COLUMNS.join(",")
}

/// One sensor reading within one polling round.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Round identifier, shared by every sample in the same round.
    pub run_id: u64,
    /// Label of the configured sensor that produced the reading.
    pub sensor_label: String,
    /// Seconds since the Unix epoch, captured just before the read.
    pub timestamp_epoch: f64,
    /// Same instant rendered with [`ISO_FORMAT`].
    pub timestamp_iso: String,
    /// Power in milliwatts.
    pub power_mw: f64,
    /// Supply voltage in volts.
    pub voltage_v: f64,
    /// Current in milliamps.
    pub current_ma: f64,
}

impl Sample {
    /// Builds a sample, deriving both timestamp columns from `at`.
    pub fn new(
        run_id: u64,
        sensor_label: impl Into<String>,
        at: DateTime<Local>,
        power_mw: f64,
        voltage_v: f64,
        current_ma: f64,
    ) -> Self {
        Self {
            run_id,
            sensor_label: sensor_label.into(),
            timestamp_epoch: at.timestamp_micros() as f64 / 1e6,
            timestamp_iso: at.format(ISO_FORMAT).to_string(),
            power_mw,
            voltage_v,
            current_ma,
        }
    }

    /// Renders the sample as one CSV data row (no trailing newline). The
    /// label is the only free-form field and gets quoted when it contains a
    /// delimiter, so rows always split back into exactly seven columns.
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.run_id,
            quote_field(&self.sensor_label),
            self.timestamp_epoch,
            self.timestamp_iso,
            self.power_mw,
            self.voltage_v,
            self.current_ma
        )
    }

    /// Parses a CSV data row produced by [`Sample::to_csv_row`]. Returns
    /// `None` if the row does not have exactly the expected columns or a
    /// numeric column fails to parse.
    pub fn parse_row(line: &str) -> Option<Self> {
        let fields = split_row(line)?;
        if fields.len() != CSV_COLUMNS.len() {
            return None;
        }
        Some(Self {
            run_id: fields[0].trim().parse().ok()?,
            sensor_label: fields[1].clone(),
            timestamp_epoch: fields[2].trim().parse().ok()?,
            timestamp_iso: fields[3].clone(),
            power_mw: fields[4].trim().parse().ok()?,
            voltage_v: fields[5].trim().parse().ok()?,
            current_ma: fields[6].trim().parse().ok()?,
        })
    }
}

/// Quotes a field that contains a comma, quote, or line break, doubling any
/// embedded quotes (RFC 4180 style, like Python's `csv.writer`).
fn quote_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Splits one CSV row into fields, honoring quoted fields with doubled
/// quotes. Returns `None` on an unterminated quote.
fn split_row(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    loop {
        match chars.next() {
            None => {
                if in_quotes {
                    return None;
                }
                fields.push(field);
                return Some(fields);
            }
            Some('"') if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            Some('"') if field.is_empty() => in_quotes = true,
            Some(',') if !in_quotes => fields.push(std::mem::take(&mut field)),
            Some(c) => field.push(c),
        }
    }
}
