use crate::error::Result;
use crate::ingestion::prepare_rows;
use crate::schema::{AnalysisConfig, DataTable, TimeSeriesRow};
use crate::utils::{
    last_day_of_month, month_start, quarter_end, quarter_of, quarter_start, week_end,
    week_start, year_end, year_start,
};
use chrono::{Datelike, NaiveDate};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Calendar scale at which periods are reported.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ReportScale {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl ReportScale {
    pub const ALL: [ReportScale; 4] = [
        ReportScale::Weekly,
        ReportScale::Monthly,
        ReportScale::Quarterly,
        ReportScale::Yearly,
    ];

    /// Order in which scales are narrated, coarsest first.
    pub const NARRATION_ORDER: [ReportScale; 4] = [
        ReportScale::Yearly,
        ReportScale::Quarterly,
        ReportScale::Monthly,
        ReportScale::Weekly,
    ];

    /// Start, end and canonical label of the calendar bucket containing `date`.
    pub fn bucket(&self, date: NaiveDate) -> (NaiveDate, NaiveDate, String) {
        match self {
            ReportScale::Weekly => {
                let iso = date.iso_week();
                (
                    week_start(date),
                    week_end(date),
                    format!("{}-W{:02}", iso.year(), iso.week()),
                )
            }
            ReportScale::Monthly => (
                month_start(date),
                last_day_of_month(date.year(), date.month()),
                date.format("%Y-%m").to_string(),
            ),
            ReportScale::Quarterly => (
                quarter_start(date),
                quarter_end(date),
                format!("{}Q{}", date.year(), quarter_of(date.month())),
            ),
            ReportScale::Yearly => (
                year_start(date),
                year_end(date),
                date.year().to_string(),
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportScale::Weekly => "weekly",
            ReportScale::Monthly => "monthly",
            ReportScale::Quarterly => "quarterly",
            ReportScale::Yearly => "yearly",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ReportScale::Weekly => "Weekly",
            ReportScale::Monthly => "Monthly",
            ReportScale::Quarterly => "Quarterly",
            ReportScale::Yearly => "Yearly",
        }
    }

    pub fn period_noun(&self) -> &'static str {
        match self {
            ReportScale::Weekly => "week",
            ReportScale::Monthly => "month",
            ReportScale::Quarterly => "quarter",
            ReportScale::Yearly => "year",
        }
    }
}

impl std::fmt::Display for ReportScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AggregatedPeriod {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Sum of the non-null values in the bucket; `None` when every value was missing.
    pub value: Option<f64>,
    /// Rows that fell in the bucket.
    pub observations: usize,
    /// Rows whose value was missing or non-numeric and left out of the sum.
    pub excluded: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AggregatedSeries {
    pub scale: ReportScale,
    pub metric: String,
    pub category: Option<String>,
    pub periods: Vec<AggregatedPeriod>,
}

impl AggregatedSeries {
    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.periods.iter().map(|p| p.label.as_str()).collect()
    }

    pub fn values(&self) -> Vec<Option<f64>> {
        self.periods.iter().map(|p| p.value).collect()
    }

    pub fn total(&self) -> f64 {
        self.periods.iter().filter_map(|p| p.value).sum()
    }

    pub fn excluded(&self) -> usize {
        self.periods.iter().map(|p| p.excluded).sum()
    }

    /// Display name, e.g. `revenue` or `revenue [North]`.
    pub fn display_name(&self) -> String {
        match &self.category {
            Some(category) => format!("{} [{}]", self.metric, category),
            None => self.metric.clone(),
        }
    }
}

/// Every series computed at one scale: the overall series for each metric,
/// followed by its per-category sub-series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScaleAggregation {
    pub scale: ReportScale,
    pub series: Vec<AggregatedSeries>,
}

impl ScaleAggregation {
    pub fn overall(&self, metric: &str) -> Option<&AggregatedSeries> {
        self.series
            .iter()
            .find(|s| s.metric == metric && s.category.is_none())
    }

    pub fn for_category(&self, metric: &str, category: &str) -> Option<&AggregatedSeries> {
        self.series
            .iter()
            .find(|s| s.metric == metric && s.category.as_deref() == Some(category))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MultiScaleAggregation {
    pub scales: BTreeMap<ReportScale, ScaleAggregation>,
}

impl MultiScaleAggregation {
    /// An empty mapping means no aggregation was possible.
    pub fn is_empty(&self) -> bool {
        self.scales.is_empty()
    }

    pub fn get(&self, scale: ReportScale) -> Option<&ScaleAggregation> {
        self.scales.get(&scale)
    }

    pub fn series(&self, scale: ReportScale, metric: &str) -> Option<&AggregatedSeries> {
        self.get(scale).and_then(|s| s.overall(metric))
    }
}

struct Bucket {
    end: NaiveDate,
    label: String,
    sum: f64,
    has_value: bool,
    observations: usize,
    excluded: usize,
}

impl Bucket {
    fn add(&mut self, value: Option<f64>) {
        self.observations += 1;
        match value {
            Some(v) => {
                self.sum += v;
                self.has_value = true;
            }
            None => self.excluded += 1,
        }
    }
}

type BucketGrid = BTreeMap<NaiveDate, Bucket>;

fn add_to_grid(grid: &mut BucketGrid, scale: ReportScale, row: &TimeSeriesRow, metric: &str) {
    let (start, end, label) = scale.bucket(row.timestamp.date());
    grid.entry(start)
        .or_insert_with(|| Bucket {
            end,
            label,
            sum: 0.0,
            has_value: false,
            observations: 0,
            excluded: 0,
        })
        .add(row.value(metric));
}

fn grid_to_series(
    grid: BucketGrid,
    scale: ReportScale,
    metric: &str,
    category: Option<String>,
) -> AggregatedSeries {
    AggregatedSeries {
        scale,
        metric: metric.to_string(),
        category,
        periods: grid
            .into_iter()
            .map(|(start, b)| AggregatedPeriod {
                label: b.label,
                start,
                end: b.end,
                value: b.has_value.then_some(b.sum),
                observations: b.observations,
                excluded: b.excluded,
            })
            .collect(),
    }
}

pub struct MultiScaleAggregator;

impl MultiScaleAggregator {
    /// Aggregates a raw table at every report scale. An empty table or an absent
    /// timestamp column yields an empty mapping; an absent metric column is an error.
    pub fn aggregate(
        table: &DataTable,
        timestamp_field: &str,
        metric_fields: &[String],
    ) -> Result<MultiScaleAggregation> {
        if table.is_empty() || !table.has_column(timestamp_field) {
            return Ok(MultiScaleAggregation::default());
        }

        let config = AnalysisConfig::new(timestamp_field).with_metrics(metric_fields.to_vec());
        let prepared = prepare_rows(table, &config)?;
        Ok(Self::aggregate_rows(&prepared.rows, &prepared.metrics))
    }

    /// Same as [`MultiScaleAggregator::aggregate`], honouring the configured
    /// category column.
    pub fn aggregate_with_config(
        table: &DataTable,
        config: &AnalysisConfig,
    ) -> Result<MultiScaleAggregation> {
        if table.is_empty() || !table.has_column(&config.timestamp_field) {
            return Ok(MultiScaleAggregation::default());
        }

        let prepared = prepare_rows(table, config)?;
        Ok(Self::aggregate_rows(&prepared.rows, &prepared.metrics))
    }

    pub fn aggregate_rows(rows: &[TimeSeriesRow], metrics: &[String]) -> MultiScaleAggregation {
        if rows.is_empty() || metrics.is_empty() {
            return MultiScaleAggregation::default();
        }

        let mut scales = BTreeMap::new();
        for scale in ReportScale::ALL {
            let mut series = Vec::new();

            for metric in metrics {
                let mut overall: BucketGrid = BTreeMap::new();
                let mut by_category: BTreeMap<&str, BucketGrid> = BTreeMap::new();

                for row in rows {
                    add_to_grid(&mut overall, scale, row, metric);
                    if let Some(category) = row.category.as_deref() {
                        add_to_grid(by_category.entry(category).or_default(), scale, row, metric);
                    }
                }

                series.push(grid_to_series(overall, scale, metric, None));
                for (category, grid) in by_category {
                    series.push(grid_to_series(
                        grid,
                        scale,
                        metric,
                        Some(category.to_string()),
                    ));
                }
            }

            debug!("Aggregated {} series at {} scale", series.len(), scale);
            scales.insert(scale, ScaleAggregation { scale, series });
        }

        MultiScaleAggregation { scales }
    }
}
