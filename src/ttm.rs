use crate::error::Result;
use crate::ingestion::prepare_rows;
use crate::schema::{AnalysisConfig, AverageBasis, DataTable, TimeSeriesRow};
use crate::utils::{mean, months_before, percent_change, sample_std_dev};
use chrono::{Datelike, NaiveDateTime};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coefficient of variation (percent) below which volatility is low.
pub const LOW_VOLATILITY_CV: f64 = 15.0;
/// Coefficient of variation (percent) above which volatility is high.
pub const HIGH_VOLATILITY_CV: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Volatility {
    Low,
    Moderate,
    High,
}

impl Volatility {
    pub fn from_cv(cv: f64) -> Self {
        if cv < LOW_VOLATILITY_CV {
            Volatility::Low
        } else if cv > HIGH_VOLATILITY_CV {
            Volatility::High
        } else {
            Volatility::Moderate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Volatility::Low => "low",
            Volatility::Moderate => "moderate",
            Volatility::High => "high",
        }
    }
}

/// Both windows are open on the left and closed on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TtmWindow {
    /// Exclusive lower bound of the trailing window (`period_end - 12 months`).
    pub period_start: NaiveDateTime,
    /// Latest timestamp in the data, inclusive.
    pub period_end: NaiveDateTime,
    /// Exclusive lower bound of the prior-year window (`period_end - 24 months`).
    pub comparison_start: NaiveDateTime,
    /// Inclusive upper bound of the prior-year window; equal to `period_start`.
    pub comparison_end: NaiveDateTime,
}

impl TtmWindow {
    pub fn ending_at(period_end: NaiveDateTime) -> Self {
        let period_start = months_before(period_end, 12);
        Self {
            period_start,
            period_end,
            comparison_start: months_before(period_end, 24),
            comparison_end: period_start,
        }
    }

    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        timestamp > self.period_start && timestamp <= self.period_end
    }

    pub fn comparison_contains(&self, timestamp: NaiveDateTime) -> bool {
        timestamp > self.comparison_start && timestamp <= self.comparison_end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TtmMetric {
    pub metric: String,
    pub ttm_total: f64,
    pub ttm_average: f64,
    pub ttm_std_dev: Option<f64>,
    /// `std_dev / |mean| * 100`.
    pub coefficient_of_variation: Option<f64>,
    pub volatility: Option<Volatility>,
    pub yoy_comparison_total: Option<f64>,
    pub yoy_change_percent: Option<f64>,
    /// Non-null values inside the trailing window.
    pub data_points: usize,
    /// Non-null values inside the prior-year window.
    pub comparison_data_points: usize,
    pub insufficient_data: bool,
}

impl TtmMetric {
    fn empty(metric: &str) -> Self {
        Self {
            metric: metric.to_string(),
            ttm_total: 0.0,
            ttm_average: 0.0,
            ttm_std_dev: None,
            coefficient_of_variation: None,
            volatility: None,
            yoy_comparison_total: None,
            yoy_change_percent: None,
            data_points: 0,
            comparison_data_points: 0,
            insufficient_data: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TtmResult {
    /// `None` when the input had no rows.
    pub window: Option<TtmWindow>,
    /// Rows inside the trailing window.
    pub data_point_count: usize,
    /// Rows inside the prior-year window.
    pub comparison_data_point_count: usize,
    pub average_basis: AverageBasis,
    pub metrics: Vec<TtmMetric>,
    pub insufficient_data: bool,
}

impl TtmResult {
    pub fn metric(&self, name: &str) -> Option<&TtmMetric> {
        self.metrics.iter().find(|m| m.metric == name)
    }
}

pub struct TtmCalculator {
    average_basis: AverageBasis,
}

impl Default for TtmCalculator {
    fn default() -> Self {
        Self::new(AverageBasis::default())
    }
}

impl TtmCalculator {
    pub fn new(average_basis: AverageBasis) -> Self {
        Self { average_basis }
    }

    /// Computes the TTM result straight from a raw table.
    pub fn compute_ttm(
        table: &DataTable,
        timestamp_field: &str,
        metric_fields: &[String],
    ) -> Result<TtmResult> {
        let config = AnalysisConfig::new(timestamp_field).with_metrics(metric_fields.to_vec());
        let prepared = prepare_rows(table, &config)?;
        Ok(Self::default().compute(&prepared.rows, &prepared.metrics))
    }

    pub fn compute(&self, rows: &[TimeSeriesRow], metrics: &[String]) -> TtmResult {
        let Some(period_end) = rows.iter().map(|r| r.timestamp).max() else {
            return TtmResult {
                window: None,
                data_point_count: 0,
                comparison_data_point_count: 0,
                average_basis: self.average_basis,
                metrics: metrics.iter().map(|m| TtmMetric::empty(m)).collect(),
                insufficient_data: true,
            };
        };

        let window = TtmWindow::ending_at(period_end);
        let current: Vec<&TimeSeriesRow> =
            rows.iter().filter(|r| window.contains(r.timestamp)).collect();
        let prior: Vec<&TimeSeriesRow> = rows
            .iter()
            .filter(|r| window.comparison_contains(r.timestamp))
            .collect();

        debug!(
            "TTM window ({}, {}] holds {} rows; comparison window holds {}",
            window.period_start,
            window.period_end,
            current.len(),
            prior.len()
        );

        let metrics = metrics
            .iter()
            .map(|metric| self.compute_metric(metric, &current, &prior))
            .collect();

        TtmResult {
            window: Some(window),
            data_point_count: current.len(),
            comparison_data_point_count: prior.len(),
            average_basis: self.average_basis,
            metrics,
            insufficient_data: current.is_empty(),
        }
    }

    fn compute_metric(
        &self,
        metric: &str,
        current: &[&TimeSeriesRow],
        prior: &[&TimeSeriesRow],
    ) -> TtmMetric {
        let values: Vec<f64> = current.iter().filter_map(|r| r.value(metric)).collect();
        if values.is_empty() {
            return TtmMetric::empty(metric);
        }

        let ttm_total: f64 = values.iter().sum();
        let raw_mean = mean(&values).unwrap_or(0.0);
        let ttm_average = match self.average_basis {
            AverageBasis::RawObservations => raw_mean,
            AverageBasis::CalendarMonths => monthly_mean(metric, current).unwrap_or(raw_mean),
        };

        let ttm_std_dev = sample_std_dev(&values);
        let coefficient_of_variation = ttm_std_dev.and_then(|sd| {
            if raw_mean == 0.0 {
                None
            } else {
                Some(sd / raw_mean.abs() * 100.0)
            }
        });

        let prior_values: Vec<f64> = prior.iter().filter_map(|r| r.value(metric)).collect();
        let yoy_comparison_total = if prior_values.is_empty() {
            None
        } else {
            Some(prior_values.iter().sum::<f64>())
        };
        let yoy_change_percent = yoy_comparison_total.and_then(|base| percent_change(base, ttm_total));

        TtmMetric {
            metric: metric.to_string(),
            ttm_total,
            ttm_average,
            ttm_std_dev,
            coefficient_of_variation,
            volatility: coefficient_of_variation.map(Volatility::from_cv),
            yoy_comparison_total,
            yoy_change_percent,
            data_points: values.len(),
            comparison_data_points: prior_values.len(),
            insufficient_data: false,
        }
    }
}

/// Mean of per-calendar-month totals for the rows that carry a value.
fn monthly_mean(metric: &str, rows: &[&TimeSeriesRow]) -> Option<f64> {
    let mut months: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for row in rows {
        if let Some(value) = row.value(metric) {
            let date = row.timestamp.date();
            *months.entry((date.year(), date.month())).or_default() += value;
        }
    }
    let totals: Vec<f64> = months.into_values().collect();
    mean(&totals)
}
