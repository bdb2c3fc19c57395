use crate::aggregation::{AggregatedSeries, ReportScale, ScaleAggregation};
use crate::utils::{mean, percent_change};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Ratio of positive deltas above which a series is "mostly increasing".
pub const INCREASING_RATIO: f64 = 0.6;
/// Ratio of positive deltas below which a series is "mostly decreasing".
pub const DECREASING_RATIO: f64 = 0.4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PeriodDelta {
    pub period_label: String,
    pub value: Option<f64>,
    pub absolute_change: Option<f64>,
    /// `(value - previous) / previous * 100`, applied as-is for negative bases.
    pub percent_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PeriodExtreme {
    pub period_label: String,
    pub percent_change: f64,
    pub absolute_change: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    MostlyIncreasing,
    MostlyDecreasing,
    Fluctuating,
}

impl TrendDirection {
    pub fn from_ratio(positive_ratio: f64) -> Self {
        if positive_ratio > INCREASING_RATIO {
            TrendDirection::MostlyIncreasing
        } else if positive_ratio < DECREASING_RATIO {
            TrendDirection::MostlyDecreasing
        } else {
            TrendDirection::Fluctuating
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            TrendDirection::MostlyIncreasing => "mostly increasing",
            TrendDirection::MostlyDecreasing => "mostly decreasing",
            TrendDirection::Fluctuating => "fluctuating",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PeriodSummary {
    pub total_periods: usize,
    pub positive_periods: usize,
    pub negative_periods: usize,
    /// Number of deltas with a defined percent change.
    pub measured_changes: usize,
    pub average_percent_change: Option<f64>,
    pub max_percent_change: Option<f64>,
    pub min_percent_change: Option<f64>,
    pub latest_period: Option<String>,
    pub latest_value: Option<f64>,
    pub latest_percent_change: Option<f64>,
    pub largest_increase: Option<PeriodExtreme>,
    pub largest_decrease: Option<PeriodExtreme>,
    /// Set when no percent change could be computed (fewer than two usable periods).
    pub insufficient_data: bool,
}

impl PeriodSummary {
    fn insufficient(total_periods: usize) -> Self {
        Self {
            total_periods,
            insufficient_data: true,
            ..Default::default()
        }
    }

    /// Share of measured changes that were positive.
    pub fn positive_ratio(&self) -> Option<f64> {
        if self.measured_changes == 0 {
            None
        } else {
            Some(self.positive_periods as f64 / self.measured_changes as f64)
        }
    }

    pub fn trend(&self) -> Option<TrendDirection> {
        self.positive_ratio().map(TrendDirection::from_ratio)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PeriodAnalysis {
    pub scale: ReportScale,
    pub metric: String,
    pub category: Option<String>,
    pub deltas: Vec<PeriodDelta>,
    pub summary: PeriodSummary,
}

impl PeriodAnalysis {
    pub fn display_name(&self) -> String {
        match &self.category {
            Some(category) => format!("{} [{}]", self.metric, category),
            None => self.metric.clone(),
        }
    }
}

/// Period-over-period results for every series at one scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScaleAnalysis {
    pub scale: ReportScale,
    pub series: Vec<PeriodAnalysis>,
}

impl ScaleAnalysis {
    pub fn overall(&self, metric: &str) -> Option<&PeriodAnalysis> {
        self.series
            .iter()
            .find(|s| s.metric == metric && s.category.is_none())
    }
}

pub struct PeriodOverPeriodCalculator;

impl PeriodOverPeriodCalculator {
    pub fn compute(series: &AggregatedSeries) -> PeriodAnalysis {
        let deltas = Self::deltas(series);
        let summary = Self::summarize(&deltas);

        PeriodAnalysis {
            scale: series.scale,
            metric: series.metric.clone(),
            category: series.category.clone(),
            deltas,
            summary,
        }
    }

    pub fn compute_scale(aggregation: &ScaleAggregation) -> ScaleAnalysis {
        ScaleAnalysis {
            scale: aggregation.scale,
            series: aggregation.series.iter().map(Self::compute).collect(),
        }
    }

    pub fn deltas(series: &AggregatedSeries) -> Vec<PeriodDelta> {
        let mut deltas = Vec::with_capacity(series.len());
        let mut previous: Option<Option<f64>> = None;

        for period in &series.periods {
            let (absolute_change, pct) = match (previous, period.value) {
                (Some(Some(prev)), Some(curr)) => (Some(curr - prev), percent_change(prev, curr)),
                _ => (None, None),
            };

            deltas.push(PeriodDelta {
                period_label: period.label.clone(),
                value: period.value,
                absolute_change,
                percent_change: pct,
            });
            previous = Some(period.value);
        }

        deltas
    }

    pub fn summarize(deltas: &[PeriodDelta]) -> PeriodSummary {
        let measured: Vec<&PeriodDelta> = deltas
            .iter()
            .filter(|d| d.percent_change.is_some())
            .collect();

        if measured.is_empty() {
            return PeriodSummary::insufficient(deltas.len());
        }

        let changes: Vec<f64> = measured.iter().filter_map(|d| d.percent_change).collect();
        let positive_periods = changes.iter().filter(|c| **c > 0.0).count();
        let negative_periods = changes.iter().filter(|c| **c < 0.0).count();

        let max = changes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = changes.iter().cloned().fold(f64::INFINITY, f64::min);

        // First occurrence wins when two periods share the extreme value.
        let extreme = |target: f64| {
            measured
                .iter()
                .find(|d| d.percent_change == Some(target))
                .map(|d| PeriodExtreme {
                    period_label: d.period_label.clone(),
                    percent_change: target,
                    absolute_change: d.absolute_change,
                })
        };

        let latest = deltas.last();

        PeriodSummary {
            total_periods: deltas.len(),
            positive_periods,
            negative_periods,
            measured_changes: changes.len(),
            average_percent_change: mean(&changes),
            max_percent_change: Some(max),
            min_percent_change: Some(min),
            latest_period: latest.map(|d| d.period_label.clone()),
            latest_value: latest.and_then(|d| d.value),
            latest_percent_change: latest.and_then(|d| d.percent_change),
            largest_increase: if max > 0.0 { extreme(max) } else { None },
            largest_decrease: if min < 0.0 { extreme(min) } else { None },
            insufficient_data: false,
        }
    }
}
