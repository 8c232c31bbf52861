//! Canonicalisation of sensor and inverter exports.
//!
//! Column names and timestamp layouts differ between devices and vendors, so
//! columns are identified by ordered substring rules and timestamps by an
//! ordered list of formats with a best-effort fallback.

use std::fmt::Debug;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use snafu::ResultExt;

use crate::config::AnalysisConfig;
use crate::error::{
    IoSnafu, MalformedInputSnafu, MalformedTimestampSnafu, MissingColumnSnafu, Result,
};
use crate::irradiance;
use crate::models::{CleaningEvent, GenerationSample, SensorSample};

/// Formats tried against a whole timestamp column, in order.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// Extra layouts accepted by the per-value fallback parser.
const LENIENT_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"];

const LENIENT_DATE_FORMATS: &[&str] = &["%Y/%m/%d", "%d.%m.%Y", "%Y%m%d"];

/// A table of untyped cells as read from a CSV export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).context(IoSnafu { path })?;
        Self::from_reader(file)
    }

    fn column(&self, index: usize) -> Vec<&str> {
        self.rows
            .iter()
            .map(|row| row.get(index).map(String::as_str).unwrap_or(""))
            .collect()
    }
}

/// Maps a header to a role when it contains any of `tokens`.
#[derive(Debug, Clone, Copy)]
struct ColumnRule<R> {
    tokens: &'static [&'static str],
    role: R,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SensorColumn {
    Timestamp,
    /// Upstream irradiance is never trusted
    Discarded,
    Temperature,
    Humidity,
    Light,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenerationColumn {
    Date,
    TimeOfDay,
    Price,
    Energy,
}

const fn rule<R>(tokens: &'static [&'static str], role: R) -> ColumnRule<R> {
    ColumnRule { tokens, role }
}

const SENSOR_RULES: &[ColumnRule<SensorColumn>] = &[
    rule(&["time", "date"], SensorColumn::Timestamp),
    rule(&["irrad"], SensorColumn::Discarded),
    rule(&["temp"], SensorColumn::Temperature),
    rule(&["humid", "rh"], SensorColumn::Humidity),
    rule(&["lux", "light", "illum", "luminos"], SensorColumn::Light),
];

const GENERATION_RULES: &[ColumnRule<GenerationColumn>] = &[
    rule(&["date"], GenerationColumn::Date),
    rule(&["time", "period"], GenerationColumn::TimeOfDay),
    rule(&["price", "tariff", "rate"], GenerationColumn::Price),
    rule(&["kwh", "generation", "energy", "yield"], GenerationColumn::Energy),
];

/// Column positions resolved from the headers, first claim wins.
struct ColumnMap<'a, R> {
    table: &'static str,
    headers: &'a [String],
    assigned: Vec<(R, usize)>,
}

impl<'a, R: Copy + PartialEq + Debug> ColumnMap<'a, R> {
    fn resolve(table: &'static str, headers: &'a [String], rules: &[ColumnRule<R>]) -> Self {
        let mut assigned: Vec<(R, usize)> = Vec::new();

        for (index, header) in headers.iter().enumerate() {
            let lowered = header.trim().to_lowercase();
            let Some(rule) = rules
                .iter()
                .find(|rule| rule.tokens.iter().any(|token| lowered.contains(token)))
            else {
                continue;
            };

            if assigned.iter().any(|(role, _)| *role == rule.role) {
                tracing::debug!("column '{}' ignored, {:?} already mapped", header, rule.role);
                continue;
            }
            assigned.push((rule.role, index));
        }

        let columns = Self {
            table,
            headers,
            assigned,
        };
        tracing::info!("{} column mapping: {}", table, columns.describe());
        columns
    }

    fn get(&self, role: R) -> Option<usize> {
        self.assigned
            .iter()
            .find(|(assigned, _)| *assigned == role)
            .map(|(_, index)| *index)
    }

    fn require(&self, role: R, name: &'static str) -> Result<usize> {
        match self.get(role) {
            Some(index) => Ok(index),
            None => MissingColumnSnafu {
                table: self.table,
                role: name,
                headers: self.headers.to_vec(),
            }
            .fail(),
        }
    }

    fn describe(&self) -> String {
        self.assigned
            .iter()
            .map(|(role, index)| format!("'{}' -> {:?}", self.headers[*index], role))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Parses a column with the first format that accepts every non-empty value,
/// falling back to `lenient` per value. Empty cells yield `None`.
fn parse_column<T>(
    column: &str,
    values: &[&str],
    formats: &[&str],
    strict: impl Fn(&str, &str) -> Option<T>,
    lenient: impl Fn(&str) -> Option<T>,
) -> Result<Vec<Option<T>>> {
    let present: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();

    if present.is_empty() {
        return MalformedTimestampSnafu {
            column,
            rows: values.len(),
            sample: None::<String>,
        }
        .fail();
    }

    for format in formats {
        if present.iter().all(|value| strict(*value, *format).is_some()) {
            tracing::debug!("column '{}' parsed with format {}", column, format);
            return Ok(values
                .iter()
                .map(|value| strict(value.trim(), *format))
                .collect());
        }
    }

    let parsed: Vec<Option<T>> = values
        .iter()
        .map(|value| {
            let value = value.trim();
            if value.is_empty() {
                None
            } else {
                lenient(value)
            }
        })
        .collect();

    let parsed_count = parsed.iter().filter(|value| value.is_some()).count();
    if parsed_count == 0 {
        return MalformedTimestampSnafu {
            column,
            rows: values.len(),
            sample: present.first().map(|value| value.to_string()),
        }
        .fail();
    }

    if parsed_count < present.len() {
        tracing::warn!(
            "column '{}': {} of {} values unparseable, rows dropped",
            column,
            present.len() - parsed_count,
            present.len()
        );
    }

    Ok(parsed)
}

fn strict_timestamp(value: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, format).ok()
}

fn strict_date(value: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, format).ok()
}

/// Best-effort timestamp parser used when no fixed format fits a column.
pub fn parse_timestamp_lenient(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_local());
    }

    TIMESTAMP_FORMATS
        .iter()
        .chain(LENIENT_TIMESTAMP_FORMATS)
        .find_map(|format| strict_timestamp(value, format))
        .or_else(|| parse_date_lenient(value).and_then(|date| date.and_hms_opt(0, 0, 0)))
}

fn parse_date_lenient(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .chain(LENIENT_DATE_FORMATS)
        .find_map(|format| strict_date(value, format))
}

/// Parses a whole timestamp column.
pub fn parse_timestamps(column: &str, values: &[&str]) -> Result<Vec<Option<NaiveDateTime>>> {
    parse_column(
        column,
        values,
        TIMESTAMP_FORMATS,
        strict_timestamp,
        parse_timestamp_lenient,
    )
}

fn parse_dates(column: &str, values: &[&str]) -> Result<Vec<Option<NaiveDate>>> {
    parse_column(column, values, DATE_FORMATS, strict_date, |value| {
        parse_date_lenient(value)
            .or_else(|| parse_timestamp_lenient(value).map(|ts| ts.date()))
    })
}

/// Start of an "HH:MM" or "HH:MM-HH:MM" period.
fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let start = value.split('-').next()?.trim();
    let mut parts = start.split(':');
    let hour: u32 = parts.next()?.trim().parse().ok()?;
    let minute: u32 = match parts.next() {
        Some(minute) => minute.trim().parse().ok()?,
        None => 0,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|number| number.is_finite())
}

/// Numeric coercion that tolerates currency codes or symbols around the amount.
fn parse_price(value: &str) -> Option<f64> {
    parse_number(value).or_else(|| {
        let digits: String = value
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
            .collect();
        parse_number(&digits)
    })
}

/// Canonical sensor series sorted by timestamp, irradiance derived from light.
pub fn normalize_sensor(table: &RawTable, config: &AnalysisConfig) -> Result<Vec<SensorSample>> {
    let columns = ColumnMap::resolve("sensor", &table.headers, SENSOR_RULES);

    let ts_col = columns.require(SensorColumn::Timestamp, "timestamp")?;
    let temp_col = columns.require(SensorColumn::Temperature, "temperature")?;
    let humid_col = columns.require(SensorColumn::Humidity, "humidity")?;
    let light_col = columns.require(SensorColumn::Light, "light level")?;

    if table.rows.is_empty() {
        tracing::warn!("sensor table has no rows");
        return Ok(Vec::new());
    }

    let timestamps = parse_timestamps(&table.headers[ts_col], &table.column(ts_col))?;
    let mut samples = Vec::with_capacity(table.rows.len());
    let mut dropped = 0usize;

    for (row, timestamp) in table.rows.iter().zip(timestamps) {
        let cell = |index: usize| row.get(index).map(String::as_str).unwrap_or("");
        let parsed = timestamp.and_then(|timestamp| {
            Some((
                timestamp,
                parse_number(cell(temp_col))?,
                parse_number(cell(humid_col))?,
                parse_number(cell(light_col))?,
            ))
        });

        match parsed {
            Some((timestamp, temperature, humidity, light)) => samples.push(SensorSample {
                timestamp,
                temperature,
                humidity,
                light,
                irradiance: irradiance::estimate(light, config),
            }),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        tracing::warn!("dropped {} sensor rows with missing or non-numeric values", dropped);
    }
    if samples.is_empty() {
        return MalformedInputSnafu {
            message: format!("none of {} sensor rows is usable", table.rows.len()),
        }
        .fail();
    }

    samples.sort_by_key(|sample| sample.timestamp);
    Ok(samples)
}

/// Canonical generation series sorted by timestamp.
///
/// A separate date column and "HH:MM" period column are combined; a lone
/// time column holding full timestamps is accepted as well.
pub fn normalize_generation(
    table: &RawTable,
    config: &AnalysisConfig,
) -> Result<Vec<GenerationSample>> {
    let columns = ColumnMap::resolve("generation", &table.headers, GENERATION_RULES);

    let energy_col = columns.require(GenerationColumn::Energy, "energy")?;
    let date_col = columns.get(GenerationColumn::Date);
    let time_col = columns.get(GenerationColumn::TimeOfDay);
    let price_col = columns.get(GenerationColumn::Price);

    if table.rows.is_empty() {
        tracing::warn!("generation table has no rows");
        return Ok(Vec::new());
    }

    let timestamps: Vec<Option<NaiveDateTime>> = match (date_col, time_col) {
        (Some(date_col), time_col) => {
            let dates = parse_dates(&table.headers[date_col], &table.column(date_col))?;
            let times: Vec<NaiveTime> = match time_col {
                Some(time_col) => table
                    .column(time_col)
                    .into_iter()
                    .map(|value| parse_time_of_day(value).unwrap_or(NaiveTime::MIN))
                    .collect(),
                None => vec![NaiveTime::MIN; table.rows.len()],
            };
            dates
                .into_iter()
                .zip(times)
                .map(|(date, time)| date.map(|date| date.and_time(time)))
                .collect()
        }
        (None, Some(time_col)) => {
            parse_timestamps(&table.headers[time_col], &table.column(time_col))?
        }
        (None, None) => {
            return MissingColumnSnafu {
                table: "generation",
                role: "date",
                headers: table.headers.clone(),
            }
            .fail()
        }
    };

    if price_col.is_none() {
        tracing::info!("no price column, using default {}", config.default_unit_price);
    }

    let mut samples = Vec::with_capacity(table.rows.len());
    let mut dropped = 0usize;

    for (row, timestamp) in table.rows.iter().zip(timestamps) {
        let cell = |index: usize| row.get(index).map(String::as_str).unwrap_or("");
        let energy = parse_number(cell(energy_col));

        match (timestamp, energy) {
            (Some(timestamp), Some(energy_kwh)) => samples.push(GenerationSample {
                timestamp,
                energy_kwh,
                unit_price: price_col
                    .and_then(|index| parse_price(cell(index)))
                    .unwrap_or(config.default_unit_price),
            }),
            _ => dropped += 1,
        }
    }

    if dropped > 0 {
        tracing::warn!("dropped {} generation rows with missing timestamp or energy", dropped);
    }
    if samples.is_empty() {
        return MalformedInputSnafu {
            message: format!("none of {} generation rows is usable", table.rows.len()),
        }
        .fail();
    }

    samples.sort_by_key(|sample| sample.timestamp);
    Ok(samples)
}

/// Cleaning dates from a flat text list, one per line; `#` starts a comment.
pub fn parse_cleaning_dates(text: &str) -> Vec<CleaningEvent> {
    let mut events: Vec<CleaningEvent> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let parsed = DATE_FORMATS
                .iter()
                .find_map(|format| strict_date(line, format))
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .or_else(|| parse_timestamp_lenient(line));
            if parsed.is_none() {
                tracing::warn!("skipping unparseable cleaning date '{}'", line);
            }
            parsed.map(|timestamp| CleaningEvent { timestamp })
        })
        .collect();

    events.sort();
    events
}
