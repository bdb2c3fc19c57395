use crate::error::{AnalysisError, Result};
use crate::schema::{AnalysisConfig, CellValue, DataTable, TimeSeriesRow};
use crate::utils::TimestampFormat;
use chrono::NaiveDateTime;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Typed rows ready for aggregation, with the metrics they carry and any
/// data-quality warnings raised while coercing cells.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreparedRows {
    pub rows: Vec<TimeSeriesRow>,
    pub metrics: Vec<String>,
    pub warnings: Vec<String>,
}

impl PreparedRows {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Builds a table from CSV-style string records.
pub fn table_from_string_records<I, R, S>(headers: &[String], records: I) -> DataTable
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let rows = records
        .into_iter()
        .map(|record| {
            record
                .into_iter()
                .map(|cell| CellValue::from_raw(cell.as_ref()))
                .collect()
        })
        .collect();

    DataTable::with_rows(headers.to_vec(), rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Numeric,
    Mixed,
    Other,
}

fn column_kind(table: &DataTable, index: usize) -> ColumnKind {
    let mut numbers = 0usize;
    let mut texts = 0usize;
    for cell in table.column_cells(index) {
        match cell {
            CellValue::Number(_) => numbers += 1,
            CellValue::Text(_) => texts += 1,
            CellValue::Null => {}
        }
    }
    match (numbers, texts) {
        (0, _) => ColumnKind::Other,
        (_, 0) => ColumnKind::Numeric,
        _ => ColumnKind::Mixed,
    }
}

fn columns_of_kind(table: &DataTable, exclude: &[&str], kind: ColumnKind) -> Vec<String> {
    table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| !exclude.contains(&name.as_str()))
        .filter(|(idx, _)| column_kind(table, *idx) == kind)
        .map(|(_, name)| name.clone())
        .collect()
}

/// Columns whose non-null cells are all numbers, excluding the given columns.
pub fn numeric_columns(table: &DataTable, exclude: &[&str]) -> Vec<String> {
    columns_of_kind(table, exclude, ColumnKind::Numeric)
}

/// Columns holding both numbers and text. Automatic selection skips them.
pub fn mixed_columns(table: &DataTable, exclude: &[&str]) -> Vec<String> {
    columns_of_kind(table, exclude, ColumnKind::Mixed)
}

fn auto_excluded(config: &AnalysisConfig) -> Vec<&str> {
    let mut exclude = vec![config.timestamp_field.as_str()];
    if let Some(category) = &config.category_field {
        exclude.push(category.as_str());
    }
    exclude
}

/// Resolves the metric list: the requested columns (which must exist) or, when
/// none are requested, every numeric column.
pub fn resolve_metrics(table: &DataTable, config: &AnalysisConfig) -> Result<Vec<String>> {
    if !config.metric_fields.is_empty() {
        for metric in &config.metric_fields {
            if !table.has_column(metric) {
                return Err(AnalysisError::MissingMetricColumn(metric.clone()));
            }
        }
        return Ok(config.metric_fields.clone());
    }

    Ok(numeric_columns(table, &auto_excluded(config)))
}

fn check_shape(table: &DataTable) -> Result<()> {
    let expected = table.columns.len();
    for (idx, row) in table.rows.iter().enumerate() {
        if row.len() != expected {
            return Err(AnalysisError::RaggedRow {
                row: idx,
                expected,
                found: row.len(),
            });
        }
    }
    Ok(())
}

fn cell_text(cell: &CellValue) -> Option<String> {
    match cell {
        CellValue::Text(s) => Some(s.clone()),
        CellValue::Number(v) => Some(v.to_string()),
        CellValue::Null => None,
    }
}

/// Parses the timestamp column. The format is resolved from the first non-null
/// cell and every other cell must match it; null cells yield `None`.
pub fn parse_timestamp_column(
    table: &DataTable,
    index: usize,
) -> Result<Vec<Option<NaiveDateTime>>> {
    let mut format: Option<TimestampFormat> = None;
    let mut parsed = Vec::with_capacity(table.len());

    for (row, cell) in table.column_cells(index).enumerate() {
        let Some(raw) = cell_text(cell) else {
            parsed.push(None);
            continue;
        };

        let fmt = match format {
            Some(fmt) => fmt,
            None => {
                let detected = TimestampFormat::detect(&raw).ok_or_else(|| {
                    AnalysisError::InvalidTimestamp {
                        row,
                        value: raw.clone(),
                        details: "no supported date format matched".to_string(),
                    }
                })?;
                debug!("Resolved timestamp format {}", detected.describe());
                format = Some(detected);
                detected
            }
        };

        let value = fmt
            .parse(&raw)
            .ok_or_else(|| AnalysisError::InvalidTimestamp {
                row,
                value: raw.clone(),
                details: format!("expected format {}", fmt.describe()),
            })?;
        parsed.push(Some(value));
    }

    Ok(parsed)
}

/// Validates the configuration against the table and converts it into typed rows.
pub fn prepare_rows(table: &DataTable, config: &AnalysisConfig) -> Result<PreparedRows> {
    let ts_idx = table
        .column_index(&config.timestamp_field)
        .ok_or_else(|| AnalysisError::MissingTimestampColumn(config.timestamp_field.clone()))?;

    let category_idx = match &config.category_field {
        Some(name) => Some(
            table
                .column_index(name)
                .ok_or_else(|| AnalysisError::MissingCategoryColumn(name.clone()))?,
        ),
        None => None,
    };

    check_shape(table)?;

    let metrics = resolve_metrics(table, config)?;
    if metrics.is_empty() {
        if table.is_empty() {
            return Ok(PreparedRows::default());
        }
        return Err(AnalysisError::NoMetricColumns);
    }

    let metric_indices: Vec<(String, usize)> = metrics
        .iter()
        .filter_map(|m| table.column_index(m).map(|idx| (m.clone(), idx)))
        .collect();

    let timestamps = parse_timestamp_column(table, ts_idx)?;

    let mut rows = Vec::with_capacity(table.len());
    let mut missing_timestamps = 0usize;
    let mut coerced: BTreeMap<&str, usize> = BTreeMap::new();
    let mut missing: BTreeMap<&str, usize> = BTreeMap::new();

    for (row_idx, timestamp) in timestamps.into_iter().enumerate() {
        let Some(timestamp) = timestamp else {
            missing_timestamps += 1;
            continue;
        };
        let cells = &table.rows[row_idx];

        let mut values = BTreeMap::new();
        for (metric, idx) in &metric_indices {
            let cell = &cells[*idx];
            let value = cell.as_number();
            if value.is_none() {
                if cell.is_null() {
                    *missing.entry(metric.as_str()).or_default() += 1;
                } else {
                    *coerced.entry(metric.as_str()).or_default() += 1;
                }
            }
            values.insert(metric.clone(), value);
        }

        let category = category_idx.and_then(|idx| cell_text(&cells[idx]));

        rows.push(TimeSeriesRow {
            timestamp,
            metrics: values,
            category,
        });
    }

    let mut warnings = Vec::new();
    if config.metric_fields.is_empty() {
        for column in mixed_columns(table, &auto_excluded(config)) {
            warnings.push(format!(
                "Column '{}' mixes numbers and text and was left out of automatic metric selection",
                column
            ));
        }
    }
    if missing_timestamps > 0 {
        warnings.push(format!(
            "{} row(s) with an empty '{}' value were skipped",
            missing_timestamps, config.timestamp_field
        ));
    }
    for (metric, count) in &coerced {
        warnings.push(format!(
            "Metric '{}': {} non-numeric value(s) coerced to null and excluded",
            metric, count
        ));
    }
    for (metric, count) in &missing {
        warnings.push(format!(
            "Metric '{}': {} missing value(s) excluded",
            metric, count
        ));
    }

    debug!(
        "Prepared {} rows across {} metrics ({} warnings)",
        rows.len(),
        metrics.len(),
        warnings.len()
    );

    Ok(PreparedRows {
        rows,
        metrics,
        warnings,
    })
}
