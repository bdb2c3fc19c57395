//! # Period Insights
//!
//! A library for turning time-stamped financial and business tables into
//! period-over-period analytics at several calendar scales, a trailing-twelve-month
//! (TTM) comparison, and deterministic insight text.
//!
//! ## Core Concepts
//!
//! - **Granularity**: the native cadence of the data (hourly through yearly), detected from timestamp gaps
//! - **Report Scales**: weekly, monthly, quarterly and yearly buckets, always computed regardless of granularity
//! - **Period-over-Period**: absolute and percent change between consecutive buckets of one scale
//! - **TTM**: rolling 12-month total ending at the latest observation, compared with the 12 months before it
//! - **Insufficient Data**: short series and empty windows are flagged in the results, never raised as errors
//!
//! ## Example
//!
//! ```rust,ignore
//! use period_insights::*;
//!
//! let table = DataTable::with_rows(
//!     vec!["date".to_string(), "revenue".to_string()],
//!     vec![
//!         vec![CellValue::from("2023-01-31"), CellValue::from(100.0)],
//!         vec![CellValue::from("2023-02-28"), CellValue::from(110.0)],
//!         vec![CellValue::from("2023-03-31"), CellValue::from(121.0)],
//!     ],
//! );
//!
//! let config = AnalysisConfig::new("date").with_metrics(["revenue"]);
//! let report = analyze_table(&table, &config).unwrap();
//!
//! for line in &report.insights.executive_summary {
//!     println!("{}", line);
//! }
//! ```

pub mod aggregation;
pub mod cache;
pub mod error;
pub mod granularity;
pub mod ingestion;
pub mod narrative;
pub mod period_over_period;
pub mod quality;
pub mod schema;
pub mod ttm;
pub mod utils;

pub use aggregation::{
    AggregatedPeriod, AggregatedSeries, MultiScaleAggregation, MultiScaleAggregator, ReportScale,
    ScaleAggregation,
};
pub use cache::{AnalysisCache, CacheKey};
pub use error::{AnalysisError, Result};
pub use granularity::{Granularity, GranularityDetector};
pub use ingestion::{prepare_rows, table_from_string_records, PreparedRows};
pub use narrative::{
    InsightNarrator, ScaleInsights, SeriesInsight, StructuredInsights, TtmInsight, TtmInsights,
};
pub use period_over_period::{
    PeriodAnalysis, PeriodDelta, PeriodOverPeriodCalculator, PeriodSummary, ScaleAnalysis,
    TrendDirection,
};
pub use quality::detect_outliers;
pub use schema::*;
pub use ttm::{TtmCalculator, TtmMetric, TtmResult, TtmWindow, Volatility};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything one analysis run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub granularity: Granularity,
    pub metrics: Vec<String>,
    pub aggregation: MultiScaleAggregation,
    pub scales: BTreeMap<ReportScale, ScaleAnalysis>,
    pub ttm: TtmResult,
    pub insights: StructuredInsights,
    /// Data-quality warnings: coerced cells, skipped rows, outliers.
    pub warnings: Vec<String>,
}

impl AnalysisReport {
    pub fn scale(&self, scale: ReportScale) -> Option<&ScaleAnalysis> {
        self.scales.get(&scale)
    }

    /// Overall (non-category) period analysis for a metric at one scale.
    pub fn series(&self, scale: ReportScale, metric: &str) -> Option<&PeriodAnalysis> {
        self.scale(scale).and_then(|s| s.overall(metric))
    }
}

pub struct PeriodAnalysisEngine;

impl PeriodAnalysisEngine {
    pub fn analyze(table: &DataTable, config: &AnalysisConfig) -> Result<AnalysisReport> {
        info!(
            "Analyzing {} rows keyed on '{}'",
            table.len(),
            config.timestamp_field
        );

        let prepared = prepare_rows(table, config)?;
        debug!(
            "Metrics selected for analysis: {}",
            prepared.metrics.join(", ")
        );

        let granularity = GranularityDetector::detect_rows(&prepared.rows);
        debug!("Detected {} granularity", granularity);

        let mut warnings = prepared.warnings.clone();
        warnings.extend(detect_outliers(&prepared.rows, &prepared.metrics));
        for warning in &warnings {
            warn!("Data quality: {}", warning);
        }

        let aggregation = MultiScaleAggregator::aggregate_rows(&prepared.rows, &prepared.metrics);
        let scales: BTreeMap<ReportScale, ScaleAnalysis> = aggregation
            .scales
            .iter()
            .map(|(scale, agg)| (*scale, PeriodOverPeriodCalculator::compute_scale(agg)))
            .collect();

        let ttm = TtmCalculator::new(config.average_basis).compute(&prepared.rows, &prepared.metrics);

        let mut insights = InsightNarrator::narrate(&scales, &ttm);
        insights.data_quality = warnings.clone();

        info!(
            "Analysis complete: {} metrics, {} scales, {} warnings",
            prepared.metrics.len(),
            scales.len(),
            warnings.len()
        );

        Ok(AnalysisReport {
            granularity,
            metrics: prepared.metrics,
            aggregation,
            scales,
            ttm,
            insights,
            warnings,
        })
    }

    /// Like [`PeriodAnalysisEngine::analyze`], reusing a report from `cache` when
    /// the same table contents and configuration were analyzed before.
    pub fn analyze_cached(
        table: &DataTable,
        config: &AnalysisConfig,
        cache: &mut AnalysisCache,
    ) -> Result<AnalysisReport> {
        cache.get_or_compute(table, config, || Self::analyze(table, config))
    }
}

pub fn analyze_table(table: &DataTable, config: &AnalysisConfig) -> Result<AnalysisReport> {
    PeriodAnalysisEngine::analyze(table, config)
}
