//! Aggregation entry points: per-month breakdown, cumulative visits over
//! time, and per-location totals.
//!
//! Grouping and ordering use a numeric `(year, month)` key; the
//! human-readable "Month Year" label is derived only at presentation time,
//! so chronology never depends on label formatting.

use std::collections::{BTreeMap, HashMap};

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::{DeviceType, VisitRecord, VisitorKind};

/// Calendar-month grouping key. `Ord` follows chronology.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    /// 1-based month.
    pub month: u32,
}

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

impl MonthKey {
    pub fn from_date(date: chrono::NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Display label, e.g. `"January 2024"`. English month names; grouping
    /// identity never depends on this string.
    pub fn label(&self) -> String {
        let name = match self.month {
            1..=12 => MONTH_NAMES[self.month as usize - 1],
            _ => "Unknown",
        };
        format!("{} {}", name, self.year)
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonthlyBucket {
    pub visitors: u64,
    pub desktop: u64,
    pub mobile: u64,
    pub new_visitors: u64,
    pub returning: u64,
}

impl MonthlyBucket {
    fn tally(&mut self, record: &VisitRecord) {
        self.visitors += 1;
        match record.device {
            DeviceType::Desktop => self.desktop += 1,
            DeviceType::Mobile => self.mobile += 1,
        }
        match record.kind {
            VisitorKind::New => self.new_visitors += 1,
            VisitorKind::Returning => self.returning += 1,
        }
    }
}

/// Per-month visitor breakdown, in chronological order.
pub fn counts_by_month(records: &[VisitRecord]) -> Vec<(MonthKey, MonthlyBucket)> {
    let mut buckets: BTreeMap<MonthKey, MonthlyBucket> = BTreeMap::new();
    for record in records {
        buckets
            .entry(MonthKey::from_date(record.visit_date))
            .or_default()
            .tally(record);
    }
    buckets.into_iter().collect()
}

/// Running total of visits per month, in chronological order. The series is
/// non-decreasing and its last value equals `records.len()`.
pub fn visits_over_time(records: &[VisitRecord]) -> Vec<(MonthKey, u64)> {
    let mut per_month: BTreeMap<MonthKey, u64> = BTreeMap::new();
    for record in records {
        *per_month
            .entry(MonthKey::from_date(record.visit_date))
            .or_insert(0) += 1;
    }

    let mut running = 0u64;
    per_month
        .into_iter()
        .map(|(key, count)| {
            running += count;
            (key, running)
        })
        .collect()
}

/// Visit totals keyed by the raw location string. No case or whitespace
/// normalization: "on" and "ON" are distinct keys.
pub fn location_counts(records: &[VisitRecord]) -> HashMap<String, u64> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for record in records {
        *counts.entry(record.location.clone()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(date: (i32, u32, u32), device: DeviceType, kind: VisitorKind, loc: &str) -> VisitRecord {
        VisitRecord {
            visit_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            device,
            kind,
            location: loc.to_string(),
        }
    }

    fn sample() -> Vec<VisitRecord> {
        vec![
            record((2024, 1, 5), DeviceType::Desktop, VisitorKind::New, "ON"),
            record((2024, 1, 20), DeviceType::Mobile, VisitorKind::Returning, "ON"),
            record((2024, 2, 1), DeviceType::Desktop, VisitorKind::New, "BC"),
        ]
    }

    #[test]
    fn test_counts_by_month_worked_example() {
        let buckets = counts_by_month(&sample());
        assert_eq!(buckets.len(), 2);

        let (jan_key, jan) = &buckets[0];
        assert_eq!(jan_key.label(), "January 2024");
        assert_eq!(
            *jan,
            MonthlyBucket {
                visitors: 2,
                desktop: 1,
                mobile: 1,
                new_visitors: 1,
                returning: 1,
            }
        );

        let (feb_key, feb) = &buckets[1];
        assert_eq!(feb_key.label(), "February 2024");
        assert_eq!(
            *feb,
            MonthlyBucket {
                visitors: 1,
                desktop: 1,
                mobile: 0,
                new_visitors: 1,
                returning: 0,
            }
        );
    }

    #[test]
    fn test_visits_over_time_worked_example() {
        let series = visits_over_time(&sample());
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].0.label(), "January 2024");
        assert_eq!(series[0].1, 2);
        assert_eq!(series[1].0.label(), "February 2024");
        assert_eq!(series[1].1, 3);
    }

    #[test]
    fn test_location_counts_worked_example() {
        let counts = location_counts(&sample());
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["ON"], 2);
        assert_eq!(counts["BC"], 1);
    }

    #[test]
    fn test_bucket_sums_match_record_count() {
        let records = vec![
            record((2023, 11, 3), DeviceType::Mobile, VisitorKind::New, "QC"),
            record((2023, 11, 7), DeviceType::Mobile, VisitorKind::Returning, "QC"),
            record((2023, 12, 25), DeviceType::Desktop, VisitorKind::Returning, "AB"),
            record((2024, 1, 1), DeviceType::Desktop, VisitorKind::New, "AB"),
            record((2024, 1, 2), DeviceType::Mobile, VisitorKind::New, "SK"),
        ];
        let buckets = counts_by_month(&records);

        let total = records.len() as u64;
        let devices: u64 = buckets.iter().map(|(_, b)| b.desktop + b.mobile).sum();
        let kinds: u64 = buckets.iter().map(|(_, b)| b.new_visitors + b.returning).sum();
        assert_eq!(devices, total);
        assert_eq!(kinds, total);
        for (_, bucket) in &buckets {
            assert_eq!(bucket.desktop + bucket.mobile, bucket.visitors);
            assert_eq!(bucket.new_visitors + bucket.returning, bucket.visitors);
        }
    }

    #[test]
    fn test_order_is_chronological_not_lexical() {
        // "September 2023" sorts after "January 2024" lexically; chronology
        // must win regardless of input order.
        let records = vec![
            record((2024, 1, 10), DeviceType::Desktop, VisitorKind::New, "ON"),
            record((2023, 9, 2), DeviceType::Mobile, VisitorKind::New, "ON"),
        ];
        let buckets = counts_by_month(&records);
        let labels: Vec<String> = buckets.iter().map(|(k, _)| k.label()).collect();
        assert_eq!(labels, vec!["September 2023", "January 2024"]);

        let series = visits_over_time(&records);
        assert_eq!(series[0].0.label(), "September 2023");
        assert_eq!(series[1].1, 2);
    }

    #[test]
    fn test_cumulative_is_non_decreasing() {
        let records = vec![
            record((2024, 3, 1), DeviceType::Desktop, VisitorKind::New, "ON"),
            record((2024, 1, 1), DeviceType::Mobile, VisitorKind::New, "ON"),
            record((2024, 3, 9), DeviceType::Mobile, VisitorKind::Returning, "BC"),
            record((2024, 5, 4), DeviceType::Desktop, VisitorKind::Returning, "BC"),
        ];
        let series = visits_over_time(&records);
        for pair in series.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
        assert_eq!(series.last().unwrap().1, records.len() as u64);
    }

    #[test]
    fn test_locations_not_normalized() {
        let records = vec![
            record((2024, 1, 1), DeviceType::Desktop, VisitorKind::New, "ON"),
            record((2024, 1, 2), DeviceType::Desktop, VisitorKind::New, "on"),
            record((2024, 1, 3), DeviceType::Desktop, VisitorKind::New, " ON"),
        ];
        let counts = location_counts(&records);
        assert_eq!(counts.len(), 3);
        assert_eq!(counts["ON"], 1);
        assert_eq!(counts["on"], 1);
        assert_eq!(counts[" ON"], 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(counts_by_month(&[]).is_empty());
        assert!(visits_over_time(&[]).is_empty());
        assert!(location_counts(&[]).is_empty());
    }

    #[test]
    fn test_input_slice_untouched() {
        let records = vec![
            record((2024, 2, 1), DeviceType::Desktop, VisitorKind::New, "BC"),
            record((2024, 1, 1), DeviceType::Mobile, VisitorKind::New, "ON"),
        ];
        let before = records.clone();
        let _ = counts_by_month(&records);
        let _ = visits_over_time(&records);
        assert_eq!(records, before);
    }
}
