use crate::schema::TimeSeriesRow;
use crate::utils::quantile;
use chrono::NaiveDateTime;

/// Multiple of the interquartile range beyond which a value is flagged.
pub const OUTLIER_IQR_FENCE: f64 = 3.0;

/// Fewest values for which quartiles are meaningful.
pub const MIN_OUTLIER_SAMPLE: usize = 4;

/// Flags values outside `[Q1 - 3*IQR, Q3 + 3*IQR]`, one warning per metric.
pub fn detect_outliers(rows: &[TimeSeriesRow], metrics: &[String]) -> Vec<String> {
    let mut warnings = Vec::new();

    for metric in metrics {
        let observations: Vec<(NaiveDateTime, f64)> = rows
            .iter()
            .filter_map(|r| r.value(metric).map(|v| (r.timestamp, v)))
            .collect();
        if observations.len() < MIN_OUTLIER_SAMPLE {
            continue;
        }

        let mut sorted: Vec<f64> = observations.iter().map(|(_, v)| *v).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let (Some(q1), Some(q3)) = (quantile(&sorted, 0.25), quantile(&sorted, 0.75)) else {
            continue;
        };
        let iqr = q3 - q1;
        let lower = q1 - OUTLIER_IQR_FENCE * iqr;
        let upper = q3 + OUTLIER_IQR_FENCE * iqr;
        let median = quantile(&sorted, 0.5).unwrap_or(q1);

        let outliers: Vec<&(NaiveDateTime, f64)> = observations
            .iter()
            .filter(|(_, v)| *v < lower || *v > upper)
            .collect();

        let Some((when, worst)) = outliers
            .iter()
            .max_by(|a, b| (a.1 - median).abs().total_cmp(&(b.1 - median).abs()))
            .map(|o| **o)
        else {
            continue;
        };

        warnings.push(format!(
            "Metric '{}': {} outlier value(s) outside [{:.2}, {:.2}]; most extreme {:.2} at {}",
            metric,
            outliers.len(),
            lower,
            upper,
            worst,
            when.format("%Y-%m-%d")
        ));
    }

    warnings
}
