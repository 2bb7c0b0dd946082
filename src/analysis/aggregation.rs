// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Calendar bucketing of readings

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::statistics::{mean, median_sorted, sample_std_dev, sorted};

/// Bucket width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    /// Weeks start on Monday
    Week,
    Month,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }

    /// Start of the bucket containing `ts`
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let date = ts.date_naive();
        let day = match self {
            Granularity::Hour => {
                return midnight(date) + Duration::hours(ts.hour() as i64);
            }
            Granularity::Day => date,
            Granularity::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
            Granularity::Month => date.with_day(1).unwrap_or(date),
        };
        midnight(day)
    }

    /// Exclusive end of the bucket starting at `start`
    pub fn bucket_end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Granularity::Hour => start + Duration::hours(1),
            Granularity::Day => start + Duration::days(1),
            Granularity::Week => start + Duration::days(7),
            Granularity::Month => {
                let date = start.date_naive();
                let (year, month) = if date.month() == 12 {
                    (date.year() + 1, 1)
                } else {
                    (date.year(), date.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1)
                    .map(midnight)
                    .unwrap_or(start + Duration::days(31))
            }
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Summary of the readings falling in one bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateBucket {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation; zero for a single reading
    pub stddev: f64,
    pub median: f64,
}

/// Group points into calendar buckets. Buckets without points are omitted.
pub fn aggregate(points: &[(DateTime<Utc>, f64)], granularity: Granularity) -> Vec<AggregateBucket> {
    let mut groups: BTreeMap<DateTime<Utc>, Vec<f64>> = BTreeMap::new();
    for &(ts, value) in points {
        groups.entry(granularity.bucket_start(ts)).or_default().push(value);
    }

    groups
        .into_iter()
        .map(|(start, values)| {
            let ordered = sorted(&values);
            AggregateBucket {
                period_start: start,
                period_end: granularity.bucket_end(start),
                count: values.len(),
                mean: mean(&values),
                min: ordered[0],
                max: ordered[ordered.len() - 1],
                stddev: sample_std_dev(&values),
                median: median_sorted(&ordered),
            }
        })
        .collect()
}
