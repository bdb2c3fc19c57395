use chrono::NaiveDateTime;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single raw cell as supplied by the data loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Null,
}

impl CellValue {
    /// Coerces the cell to a finite number. Text is trimmed and parsed; anything
    /// else (including NaN and infinities) becomes `None`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(v) if v.is_finite() => Some(*v),
            CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Builds a cell from a CSV-style string: empty is null, numbers are numbers.
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Null;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => CellValue::Number(v),
            _ => CellValue::Text(trimmed.to_string()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<Option<f64>> for CellValue {
    fn from(value: Option<f64>) -> Self {
        value.map(CellValue::Number).unwrap_or(CellValue::Null)
    }
}

static NULL_CELL: CellValue = CellValue::Null;

/// Column-named table of raw cells, row-major.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DataTable {
    #[schemars(description = "Column names, in the order cells appear in each row")]
    pub columns: Vec<String>,

    #[schemars(description = "Rows of cells; every row has exactly one cell per column")]
    pub rows: Vec<Vec<CellValue>>,
}

impl DataTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn push_row(&mut self, row: Vec<CellValue>) {
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates one column; short rows yield `Null` for the missing cell.
    pub fn column_cells(&self, index: usize) -> impl Iterator<Item = &CellValue> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(index).unwrap_or(&NULL_CELL))
    }
}

/// One typed observation produced by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRow {
    pub timestamp: NaiveDateTime,
    /// Metric name to value; `None` marks a missing or non-numeric cell.
    pub metrics: BTreeMap<String, Option<f64>>,
    pub category: Option<String>,
}

impl TimeSeriesRow {
    pub fn value(&self, metric: &str) -> Option<f64> {
        self.metrics.get(metric).copied().flatten()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AverageBasis {
    #[default]
    #[schemars(
        description = "Mean of every raw observation inside the TTM window. Sensitive to row density: daily and weekly data with identical totals give different averages."
    )]
    RawObservations,

    #[schemars(
        description = "Mean of the per-calendar-month totals inside the TTM window. Use for data that is already aggregated monthly or when density should not matter."
    )]
    CalendarMonths,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisConfig {
    #[schemars(description = "Name of the column holding the observation date or datetime")]
    pub timestamp_field: String,

    #[serde(default)]
    #[schemars(
        description = "Metric columns to analyze. Leave empty to auto-select every numeric column other than the timestamp and category columns."
    )]
    pub metric_fields: Vec<String>,

    #[serde(default)]
    #[schemars(description = "Optional column used to split each metric into per-category sub-series")]
    pub category_field: Option<String>,

    #[serde(default)]
    #[schemars(description = "How the TTM average is computed")]
    pub average_basis: AverageBasis,
}

impl AnalysisConfig {
    pub fn new(timestamp_field: impl Into<String>) -> Self {
        Self {
            timestamp_field: timestamp_field.into(),
            metric_fields: Vec::new(),
            category_field: None,
            average_basis: AverageBasis::default(),
        }
    }

    pub fn with_metrics<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metric_fields = metrics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category(mut self, category_field: impl Into<String>) -> Self {
        self.category_field = Some(category_field.into());
        self
    }

    pub fn with_average_basis(mut self, basis: AverageBasis) -> Self {
        self.average_basis = basis;
        self
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalysisConfig)
    }
}
