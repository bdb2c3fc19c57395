//! Deterministic rendering of period-over-period and TTM results into plain
//! structured text. No markup, no randomness: the same inputs always produce the
//! same strings.

use crate::aggregation::ReportScale;
use crate::period_over_period::{PeriodAnalysis, PeriodDelta, ScaleAnalysis, TrendDirection};
use crate::schema::AverageBasis;
use crate::ttm::{TtmMetric, TtmResult, Volatility};
use crate::utils::format_percent;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Absolute YoY change (percent) above which a move is significant or concerning.
pub const SIGNIFICANT_CHANGE: f64 = 20.0;
/// Absolute YoY change (percent) above which a move is strong or notable.
pub const NOTABLE_CHANGE: f64 = 10.0;
/// Absolute yearly change (percent) that earns an executive-summary line.
pub const EXECUTIVE_YEARLY_THRESHOLD: f64 = 10.0;
/// Fewest consecutive quarters needed for a momentum signal.
pub const MIN_MOMENTUM_QUARTERS: usize = 2;

pub const NO_EXECUTIVE_INSIGHTS: &str = "insufficient time series data for executive insights";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDirection {
    Increase,
    Decrease,
    Unchanged,
}

impl ChangeDirection {
    pub fn of(change: f64) -> Self {
        if change > 0.0 {
            ChangeDirection::Increase
        } else if change < 0.0 {
            ChangeDirection::Decrease
        } else {
            ChangeDirection::Unchanged
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeriesInsight {
    pub metric: String,
    pub category: Option<String>,
    pub trend: Option<TrendDirection>,
    pub findings: Vec<String>,
    pub insufficient_data: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScaleInsights {
    pub scale: ReportScale,
    pub series: Vec<SeriesInsight>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TtmInsight {
    pub metric: String,
    pub yoy_direction: Option<ChangeDirection>,
    pub volatility: Option<Volatility>,
    pub commentary: String,
    pub findings: Vec<String>,
    pub insufficient_data: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TtmInsights {
    pub summary: String,
    pub metrics: Vec<TtmInsight>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StructuredInsights {
    /// Scales in fixed order: yearly, quarterly, monthly, weekly.
    pub scales: Vec<ScaleInsights>,
    pub ttm: TtmInsights,
    pub executive_summary: Vec<String>,
    #[serde(default)]
    pub data_quality: Vec<String>,
}

impl StructuredInsights {
    pub fn scale(&self, scale: ReportScale) -> Option<&ScaleInsights> {
        self.scales.iter().find(|s| s.scale == scale)
    }

    pub fn has_executive_signals(&self) -> bool {
        !(self.executive_summary.len() == 1 && self.executive_summary[0] == NO_EXECUTIVE_INSIGHTS)
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(StructuredInsights)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::json_schema())
    }
}

/// Qualitative label for a year-over-year change.
pub fn yoy_commentary(change: f64) -> &'static str {
    if change > SIGNIFICANT_CHANGE {
        "significant growth"
    } else if change < -SIGNIFICANT_CHANGE {
        "concerning decline"
    } else if change > NOTABLE_CHANGE {
        "strong growth"
    } else if change < -NOTABLE_CHANGE {
        "notable decline"
    } else {
        "stable"
    }
}

/// Trailing run of same-signed quarterly changes whose magnitude keeps growing
/// (accelerating) or keeps shrinking (decelerating).
#[derive(Debug, Clone, PartialEq)]
pub struct Momentum {
    pub accelerating: bool,
    pub positive: bool,
    pub quarters: usize,
    pub latest_label: String,
    pub latest_change: f64,
}

impl Momentum {
    pub fn detect(deltas: &[PeriodDelta]) -> Option<Self> {
        let mut trailing: Vec<(&str, f64)> = deltas
            .iter()
            .rev()
            .map_while(|d| d.percent_change.map(|p| (d.period_label.as_str(), p)))
            .collect();
        trailing.reverse();

        let n = trailing.len();
        if n < MIN_MOMENTUM_QUARTERS {
            return None;
        }

        let (latest_label, latest) = trailing[n - 1];
        let previous = trailing[n - 2].1;
        if latest == 0.0
            || previous == 0.0
            || latest.signum() != previous.signum()
            || latest.abs() == previous.abs()
        {
            return None;
        }

        let positive = latest > 0.0;
        let accelerating = latest.abs() > previous.abs();
        let continues = |newer: f64, older: f64| {
            older != 0.0
                && older.signum() == newer.signum()
                && if accelerating {
                    newer.abs() > older.abs()
                } else {
                    newer.abs() < older.abs()
                }
        };

        let mut quarters = 2;
        let mut i = n - 2;
        while i > 0 && continues(trailing[i].1, trailing[i - 1].1) {
            quarters += 1;
            i -= 1;
        }

        Some(Self {
            accelerating,
            positive,
            quarters,
            latest_label: latest_label.to_string(),
            latest_change: latest,
        })
    }

    fn describe(&self) -> &'static str {
        match (self.positive, self.accelerating) {
            (true, true) => "growth accelerated",
            (true, false) => "growth decelerated",
            (false, true) => "decline accelerated",
            (false, false) => "decline eased",
        }
    }
}

pub struct InsightNarrator;

impl InsightNarrator {
    pub fn narrate(
        per_scale: &BTreeMap<ReportScale, ScaleAnalysis>,
        ttm: &TtmResult,
    ) -> StructuredInsights {
        let scales = ReportScale::NARRATION_ORDER
            .iter()
            .filter_map(|scale| per_scale.get(scale))
            .map(|analysis| ScaleInsights {
                scale: analysis.scale,
                series: analysis
                    .series
                    .iter()
                    .map(|s| Self::narrate_series(analysis.scale, s))
                    .collect(),
            })
            .collect();

        StructuredInsights {
            scales,
            ttm: Self::narrate_ttm(ttm),
            executive_summary: Self::executive_summary(per_scale),
            data_quality: Vec::new(),
        }
    }

    fn narrate_series(scale: ReportScale, analysis: &PeriodAnalysis) -> SeriesInsight {
        let summary = &analysis.summary;
        let name = analysis.display_name();

        if summary.insufficient_data {
            return SeriesInsight {
                metric: analysis.metric.clone(),
                category: analysis.category.clone(),
                trend: None,
                findings: vec![format!(
                    "{} {}: insufficient data for this metric/scale ({} period(s) available)",
                    scale.title(),
                    name,
                    summary.total_periods
                )],
                insufficient_data: true,
            };
        }

        let noun = scale.period_noun();
        let mut findings = Vec::new();

        let latest_label = summary.latest_period.as_deref().unwrap_or("n/a");
        match (summary.latest_percent_change, summary.latest_value) {
            (Some(change), Some(value)) => findings.push(format!(
                "{} {}: latest {} ({}) changed by {} to {:.2}",
                scale.title(),
                name,
                noun,
                latest_label,
                format_percent(change),
                value
            )),
            _ => findings.push(format!(
                "{} {}: change for the latest {} ({}) could not be computed",
                scale.title(),
                name,
                noun,
                latest_label
            )),
        }

        let trend = summary.trend();
        if let Some(direction) = trend {
            findings.push(format!(
                "Overall trend: {} ({} of {} {}s up, {} down)",
                direction.describe(),
                summary.positive_periods,
                summary.measured_changes,
                noun,
                summary.negative_periods
            ));
        }

        if let Some(up) = &summary.largest_increase {
            findings.push(format!(
                "Largest increase: {} in {}",
                format_percent(up.percent_change),
                up.period_label
            ));
        }
        if let Some(down) = &summary.largest_decrease {
            findings.push(format!(
                "Largest decrease: {} in {}",
                format_percent(down.percent_change),
                down.period_label
            ));
        }

        if let Some(avg) = summary.average_percent_change {
            findings.push(format!(
                "Average change per {}: {}",
                noun,
                format_percent(avg)
            ));
        }

        SeriesInsight {
            metric: analysis.metric.clone(),
            category: analysis.category.clone(),
            trend,
            findings,
            insufficient_data: false,
        }
    }

    fn narrate_ttm(ttm: &TtmResult) -> TtmInsights {
        let Some(window) = ttm.window.filter(|_| !ttm.insufficient_data) else {
            return TtmInsights {
                summary: "insufficient data for trailing-twelve-month analysis".to_string(),
                metrics: ttm
                    .metrics
                    .iter()
                    .map(|m| Self::insufficient_ttm_metric(&m.metric))
                    .collect(),
            };
        };

        let summary = format!(
            "Trailing twelve months ending {} ({} data points; prior-year window {} data points)",
            window.period_end.format("%Y-%m-%d"),
            ttm.data_point_count,
            ttm.comparison_data_point_count
        );

        TtmInsights {
            summary,
            metrics: ttm
                .metrics
                .iter()
                .map(|m| Self::narrate_ttm_metric(m, ttm.average_basis))
                .collect(),
        }
    }

    fn insufficient_ttm_metric(metric: &str) -> TtmInsight {
        TtmInsight {
            metric: metric.to_string(),
            yoy_direction: None,
            volatility: None,
            commentary: "insufficient data".to_string(),
            findings: vec![format!(
                "TTM {}: insufficient data in the trailing twelve months",
                metric
            )],
            insufficient_data: true,
        }
    }

    fn narrate_ttm_metric(metric: &TtmMetric, basis: AverageBasis) -> TtmInsight {
        if metric.insufficient_data {
            return Self::insufficient_ttm_metric(&metric.metric);
        }

        let mut findings = vec![
            format!(
                "TTM {} total: {:.2} across {} data points",
                metric.metric, metric.ttm_total, metric.data_points
            ),
            format!(
                "TTM {} average: {:.2} per {}",
                metric.metric,
                metric.ttm_average,
                match basis {
                    AverageBasis::RawObservations => "observation",
                    AverageBasis::CalendarMonths => "month",
                }
            ),
        ];

        let yoy_direction = metric.yoy_change_percent.map(ChangeDirection::of);
        let commentary = match (metric.yoy_change_percent, metric.yoy_comparison_total) {
            (Some(change), Some(base)) => {
                let direction = match ChangeDirection::of(change) {
                    ChangeDirection::Increase => "increase",
                    ChangeDirection::Decrease => "decrease",
                    ChangeDirection::Unchanged => "no change",
                };
                let commentary = yoy_commentary(change);
                findings.push(format!(
                    "Year-over-year: {} of {:.2}% versus prior-year total {:.2} ({})",
                    direction,
                    change.abs(),
                    base,
                    commentary
                ));
                commentary.to_string()
            }
            _ => {
                findings.push("Year-over-year: no prior-year comparison available".to_string());
                "no prior-year comparison".to_string()
            }
        };

        match (metric.volatility, metric.coefficient_of_variation) {
            (Some(volatility), Some(cv)) => findings.push(format!(
                "Volatility: {} (coefficient of variation {:.1}%)",
                volatility.as_str(),
                cv
            )),
            _ => findings.push("Volatility: not enough observations to measure".to_string()),
        }

        TtmInsight {
            metric: metric.metric.clone(),
            yoy_direction,
            volatility: metric.volatility,
            commentary,
            findings,
            insufficient_data: false,
        }
    }

    fn executive_summary(per_scale: &BTreeMap<ReportScale, ScaleAnalysis>) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(yearly) = per_scale.get(&ReportScale::Yearly) {
            for series in yearly.series.iter().filter(|s| s.category.is_none()) {
                let summary = &series.summary;
                let (Some(change), Some(label)) =
                    (summary.latest_percent_change, summary.latest_period.as_deref())
                else {
                    continue;
                };
                if change.abs() > EXECUTIVE_YEARLY_THRESHOLD {
                    let verb = if change > 0.0 { "grew" } else { "declined" };
                    lines.push(format!(
                        "{} {} {:.2}% year over year in {} ({})",
                        series.metric,
                        verb,
                        change.abs(),
                        label,
                        yoy_commentary(change)
                    ));
                }
            }
        }

        if let Some(quarterly) = per_scale.get(&ReportScale::Quarterly) {
            for series in quarterly.series.iter().filter(|s| s.category.is_none()) {
                if let Some(momentum) = Momentum::detect(&series.deltas) {
                    lines.push(format!(
                        "{} quarterly {} for {} consecutive quarters (latest {} in {})",
                        series.metric,
                        momentum.describe(),
                        momentum.quarters,
                        format_percent(momentum.latest_change),
                        momentum.latest_label
                    ));
                }
            }
        }

        if lines.is_empty() {
            lines.push(NO_EXECUTIVE_INSIGHTS.to_string());
        }
        lines
    }
}
