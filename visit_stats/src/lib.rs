//! Core visitor-analytics library: record model, envelope parsing,
//! month/location aggregation, and plotters-based chart rendering.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub mod aggregate;
pub mod chart;
pub mod palette;

pub use aggregate::{counts_by_month, location_counts, visits_over_time, MonthKey, MonthlyBucket};
pub use chart::{ActiveChart, ChartKind, ChartSurface};
pub use palette::{color_sets, ColorSets};

#[derive(Error, Debug)]
pub enum VisitError {
    #[error("malformed visitor envelope: {0}")]
    MalformedEnvelope(String),
    #[error("unparseable visit date {value:?} at record {index}")]
    InvalidDate { index: usize, value: String },
    #[error("chart surface has zero area ({width}x{height})")]
    EmptySurface { width: u32, height: u32 },
    #[error("chart rendering failed: {0}")]
    Render(String),
    #[error("failed to encode chart image: {0}")]
    ImageEncode(String),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VisitorKind {
    New,
    Returning,
}

/// A single parsed visit. Wire records carry the date as a string; this
/// type only exists once the date has been validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisitRecord {
    pub visit_date: NaiveDate,
    pub device: DeviceType,
    pub kind: VisitorKind,
    pub location: String,
}

/// Policy for records whose `visitDate` fails to parse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatePolicy {
    /// Fail on the first bad date.
    Strict,
    /// Drop the record and count it in [`ParsedRecords::skipped`].
    Skip,
}

#[derive(Clone, Debug, Default)]
pub struct ParsedRecords {
    pub records: Vec<VisitRecord>,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    visitors: Vec<RawVisitRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVisitRecord {
    visit_date: String,
    device_type: DeviceType,
    new_vs_returning: VisitorKind,
    location: String,
}

const VISIT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `{ "visitors": [...] }` JSON envelope into validated records.
pub fn parse_envelope(input: &[u8], policy: DatePolicy) -> Result<ParsedRecords, VisitError> {
    let envelope: Envelope =
        serde_json::from_slice(input).map_err(|e| VisitError::MalformedEnvelope(e.to_string()))?;

    let mut records = Vec::with_capacity(envelope.visitors.len());
    let mut skipped = 0usize;
    for (index, raw) in envelope.visitors.into_iter().enumerate() {
        match NaiveDate::parse_from_str(&raw.visit_date, VISIT_DATE_FORMAT) {
            Ok(visit_date) => records.push(VisitRecord {
                visit_date,
                device: raw.device_type,
                kind: raw.new_vs_returning,
                location: raw.location,
            }),
            Err(_) => match policy {
                DatePolicy::Strict => {
                    return Err(VisitError::InvalidDate {
                        index,
                        value: raw.visit_date,
                    });
                }
                DatePolicy::Skip => {
                    warn!("skipping record {}: unparseable visitDate {:?}", index, raw.visit_date);
                    skipped += 1;
                }
            },
        }
    }

    Ok(ParsedRecords { records, skipped })
}
