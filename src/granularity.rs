use crate::ingestion::parse_timestamp_column;
use crate::schema::{DataTable, TimeSeriesRow};
use chrono::{NaiveDateTime, TimeDelta};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Native sampling cadence of a time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
    Unknown,
}

impl Granularity {
    /// Classifies a typical gap between observations.
    pub fn from_gap(gap: TimeDelta) -> Self {
        if gap <= TimeDelta::hours(1) {
            Granularity::Hourly
        } else if gap <= TimeDelta::days(1) {
            Granularity::Daily
        } else if gap <= TimeDelta::days(7) {
            Granularity::Weekly
        } else if gap <= TimeDelta::days(31) {
            Granularity::Monthly
        } else if gap <= TimeDelta::days(92) {
            Granularity::Quarterly
        } else {
            Granularity::Yearly
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
            Granularity::Quarterly => "quarterly",
            Granularity::Yearly => "yearly",
            Granularity::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct GranularityDetector;

impl GranularityDetector {
    /// Detects the cadence of a table column. A missing or unparseable column is
    /// `Unknown`; fewer than two distinct timestamps default to `Daily`.
    pub fn detect(table: &DataTable, timestamp_field: &str) -> Granularity {
        let Some(idx) = table.column_index(timestamp_field) else {
            return Granularity::Unknown;
        };

        match parse_timestamp_column(table, idx) {
            Ok(parsed) => Self::detect_timestamps(parsed.into_iter().flatten()),
            Err(e) => {
                debug!("Granularity detection skipped: {}", e);
                Granularity::Unknown
            }
        }
    }

    pub fn detect_rows(rows: &[TimeSeriesRow]) -> Granularity {
        Self::detect_timestamps(rows.iter().map(|r| r.timestamp))
    }

    pub fn detect_timestamps<I>(timestamps: I) -> Granularity
    where
        I: IntoIterator<Item = NaiveDateTime>,
    {
        let mut distinct: Vec<NaiveDateTime> = timestamps.into_iter().collect();
        distinct.sort();
        distinct.dedup();

        if distinct.len() < 2 {
            return Granularity::Daily;
        }

        // BTreeMap iterates gaps ascending, so the first maximal count wins ties
        // in favour of the smaller gap.
        let mut counts: BTreeMap<TimeDelta, usize> = BTreeMap::new();
        for pair in distinct.windows(2) {
            *counts.entry(pair[1] - pair[0]).or_default() += 1;
        }

        let mut mode = None;
        let mut best = 0usize;
        for (gap, count) in counts {
            if count > best {
                best = count;
                mode = Some(gap);
            }
        }

        mode.map(Granularity::from_gap)
            .unwrap_or(Granularity::Unknown)
    }
}
