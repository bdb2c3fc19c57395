use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime};

/// A timestamp layout resolved once per column and then applied to every cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    Rfc3339,
    DateTime(&'static str),
    Date(&'static str),
    /// `YYYY-MM`, anchored to the first day of the month.
    YearMonth,
    /// Bare four-digit `YYYY`, anchored to January 1.
    Year,
}

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%Y%m%d"];

impl TimestampFormat {
    /// Resolves the layout of a sample value: RFC 3339 first, then the explicit
    /// datetime list, the date list, then `YYYY-MM` and finally `YYYY`.
    pub fn detect(sample: &str) -> Option<Self> {
        let sample = sample.trim();

        if DateTime::parse_from_rfc3339(sample).is_ok() {
            return Some(TimestampFormat::Rfc3339);
        }

        for fmt in DATETIME_FORMATS {
            if NaiveDateTime::parse_from_str(sample, fmt).is_ok() {
                return Some(TimestampFormat::DateTime(fmt));
            }
        }

        for fmt in DATE_FORMATS {
            if NaiveDate::parse_from_str(sample, fmt).is_ok() {
                return Some(TimestampFormat::Date(fmt));
            }
        }

        if parse_year_month(sample).is_some() {
            return Some(TimestampFormat::YearMonth);
        }

        if parse_year(sample).is_some() {
            return Some(TimestampFormat::Year);
        }

        None
    }

    pub fn parse(&self, value: &str) -> Option<NaiveDateTime> {
        let value = value.trim();
        match self {
            // Offsets are dropped: buckets follow the wall-clock date as written.
            TimestampFormat::Rfc3339 => DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_local()),
            TimestampFormat::DateTime(fmt) => NaiveDateTime::parse_from_str(value, fmt).ok(),
            TimestampFormat::Date(fmt) => NaiveDate::parse_from_str(value, fmt)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN)),
            TimestampFormat::YearMonth => {
                parse_year_month(value).map(|d| d.and_time(NaiveTime::MIN))
            }
            TimestampFormat::Year => parse_year(value).map(|d| d.and_time(NaiveTime::MIN)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TimestampFormat::Rfc3339 => "RFC 3339".to_string(),
            TimestampFormat::DateTime(fmt) | TimestampFormat::Date(fmt) => fmt.to_string(),
            TimestampFormat::YearMonth => "%Y-%m".to_string(),
            TimestampFormat::Year => "%Y".to_string(),
        }
    }
}

fn parse_year(value: &str) -> Option<NaiveDate> {
    if value.len() != 4 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value
        .parse::<i32>()
        .ok()
        .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
}

fn parse_year_month(value: &str) -> Option<NaiveDate> {
    if value.len() != 7 {
        return None;
    }
    NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d").ok()
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

/// Calendar quarter (1-4) of a month.
pub fn quarter_of(month: u32) -> u32 {
    (month - 1) / 3 + 1
}

pub fn quarter_start(date: NaiveDate) -> NaiveDate {
    let first_month = (quarter_of(date.month()) - 1) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), first_month, 1).unwrap_or(date)
}

pub fn quarter_end(date: NaiveDate) -> NaiveDate {
    last_day_of_month(date.year(), quarter_of(date.month()) * 3)
}

pub fn year_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date)
}

pub fn year_end(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap_or(date)
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let days_from_monday = date.weekday().num_days_from_monday();
    date - Days::new(days_from_monday as u64)
}

/// Sunday of the ISO week containing `date`.
pub fn week_end(date: NaiveDate) -> NaiveDate {
    let days_to_sunday = 6 - date.weekday().num_days_from_monday();
    date + Days::new(days_to_sunday as u64)
}

/// Steps back whole calendar months, clamping to the end of shorter months
/// (2024-02-29 minus 12 months is 2023-02-28).
pub fn months_before(timestamp: NaiveDateTime, months: u32) -> NaiveDateTime {
    timestamp
        .checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDateTime::MIN)
}

/// `(current - previous) / previous * 100`, undefined for a zero base.
pub fn percent_change(previous: f64, current: f64) -> Option<f64> {
    if previous == 0.0 {
        None
    } else {
        Some((current - previous) / previous * 100.0)
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (n - 1 denominator); needs at least two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values)?;
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Linear-interpolated quantile of an ascending slice.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let weight = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Formats a signed percentage with two decimals, e.g. `+12.50%`.
pub fn format_percent(value: f64) -> String {
    format!("{:+.2}%", value)
}
