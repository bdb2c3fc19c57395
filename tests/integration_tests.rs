use anyhow::Result;
use chrono::{Datelike, Months, NaiveDate};
use period_insights::narrative::NO_EXECUTIVE_INSIGHTS;
use period_insights::*;

fn table_from_csv(data: &str) -> Result<DataTable> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    Ok(table_from_string_records(&headers, records))
}

/// Month-end rows starting at `start`, one per value.
fn month_end_csv(start: NaiveDate, columns: &str, values: &[String]) -> String {
    let mut csv = format!("date,{}\n", columns);
    for (i, value) in values.iter().enumerate() {
        let date = start
            .checked_add_months(Months::new(i as u32))
            .map(|d| utils::last_day_of_month(d.year(), d.month()))
            .unwrap();
        csv.push_str(&format!("{},{}\n", date.format("%Y-%m-%d"), value));
    }
    csv
}

#[test]
fn test_two_year_monthly_business() -> Result<()> {
    let values: Vec<String> = (0..24)
        .map(|i| {
            if i < 12 {
                "100,40".to_string()
            } else {
                "150,50".to_string()
            }
        })
        .collect();
    let csv = month_end_csv(
        NaiveDate::from_ymd_opt(2022, 1, 31).unwrap(),
        "revenue,cost",
        &values,
    );
    let table = table_from_csv(&csv)?;

    let report = analyze_table(&table, &AnalysisConfig::new("date"))?;
    assert_eq!(report.granularity, Granularity::Monthly);
    assert_eq!(report.metrics, vec!["revenue".to_string(), "cost".to_string()]);
    assert!(report.warnings.is_empty());

    let monthly = report.aggregation.series(ReportScale::Monthly, "revenue").unwrap();
    assert_eq!(monthly.len(), 24);
    assert_eq!(monthly.labels()[0], "2022-01");
    assert_eq!(monthly.labels()[23], "2023-12");
    assert_eq!(monthly.total(), 3000.0);

    let quarterly = report
        .aggregation
        .series(ReportScale::Quarterly, "revenue")
        .unwrap();
    assert_eq!(
        quarterly.labels(),
        vec!["2022Q1", "2022Q2", "2022Q3", "2022Q4", "2023Q1", "2023Q2", "2023Q3", "2023Q4"]
    );
    assert_eq!(quarterly.values()[4], Some(450.0));

    let yearly = report.series(ReportScale::Yearly, "revenue").unwrap();
    assert_eq!(yearly.deltas[1].absolute_change, Some(600.0));
    assert_eq!(yearly.deltas[1].percent_change, Some(50.0));
    assert!(!yearly.summary.insufficient_data);

    let ttm = report.ttm.metric("revenue").unwrap();
    assert_eq!(ttm.ttm_total, 1800.0);
    assert_eq!(ttm.yoy_comparison_total, Some(1200.0));
    assert_eq!(ttm.yoy_change_percent, Some(50.0));
    assert_eq!(report.ttm.data_point_count, 12);
    assert_eq!(report.ttm.comparison_data_point_count, 12);

    let ttm_insight = report
        .insights
        .ttm
        .metrics
        .iter()
        .find(|m| m.metric == "revenue")
        .unwrap();
    assert_eq!(ttm_insight.commentary, "significant growth");
    assert_eq!(
        ttm_insight.yoy_direction,
        Some(narrative::ChangeDirection::Increase)
    );

    assert!(report
        .insights
        .executive_summary
        .contains(&"revenue grew 50.00% year over year in 2023 (significant growth)".to_string()));
    assert!(report
        .insights
        .executive_summary
        .contains(&"cost grew 25.00% year over year in 2023 (significant growth)".to_string()));

    Ok(())
}

#[test]
fn test_mixed_monthly_series_narrative() -> Result<()> {
    let table = table_from_csv(
        "date,revenue
         2024-01-15,100
         2024-02-15,90
         2024-03-15,80
         2024-04-15,95",
    )?;

    let report = analyze_table(&table, &AnalysisConfig::new("date"))?;
    let monthly = report.series(ReportScale::Monthly, "revenue").unwrap();

    assert_eq!(monthly.summary.positive_periods, 1);
    assert_eq!(monthly.summary.negative_periods, 2);
    assert_eq!(monthly.summary.trend(), Some(TrendDirection::MostlyDecreasing));
    assert_eq!(monthly.summary.latest_period.as_deref(), Some("2024-04"));

    let insight = &report
        .insights
        .scale(ReportScale::Monthly)
        .unwrap()
        .series[0];
    assert_eq!(
        insight.findings[0],
        "Monthly revenue: latest month (2024-04) changed by +18.75% to 95.00"
    );
    assert_eq!(
        insight.findings[1],
        "Overall trend: mostly decreasing (1 of 3 months up, 2 down)"
    );
    assert!(insight
        .findings
        .contains(&"Largest increase: +18.75% in 2024-04".to_string()));
    assert!(insight
        .findings
        .contains(&"Largest decrease: -11.11% in 2024-03".to_string()));

    // Four months of one year: nothing to compare at the yearly scale.
    let yearly = &report.insights.scale(ReportScale::Yearly).unwrap().series[0];
    assert!(yearly.insufficient_data);
    assert_eq!(
        yearly.findings[0],
        "Yearly revenue: insufficient data for this metric/scale (1 period(s) available)"
    );

    let order: Vec<ReportScale> = report.insights.scales.iter().map(|s| s.scale).collect();
    assert_eq!(order, ReportScale::NARRATION_ORDER.to_vec());

    assert_eq!(report.insights.executive_summary, vec![NO_EXECUTIVE_INSIGHTS.to_string()]);
    Ok(())
}

#[test]
fn test_quarterly_momentum_signal() -> Result<()> {
    let table = table_from_csv(
        "date,revenue
         2023-03-31,100
         2023-06-30,105
         2023-09-30,115
         2023-12-31,135",
    )?;

    let report = analyze_table(&table, &AnalysisConfig::new("date"))?;
    assert_eq!(report.granularity, Granularity::Quarterly);
    assert_eq!(
        report.insights.executive_summary,
        vec![
            "revenue quarterly growth accelerated for 3 consecutive quarters (latest +17.39% in 2023Q4)"
                .to_string()
        ]
    );
    Ok(())
}

#[test]
fn test_negative_values_and_zero_base() -> Result<()> {
    let table = table_from_csv(
        "date,net_income,grants
         2021-06-30,5,0
         2022-06-30,-100,0
         2023-06-30,-80,50",
    )?;

    let report = analyze_table(&table, &AnalysisConfig::new("date"))?;

    let income = report.series(ReportScale::Yearly, "net_income").unwrap();
    assert_eq!(income.deltas[2].absolute_change, Some(20.0));
    // Raw formula on a negative base: -100 -> -80 reads as -20%.
    assert_eq!(income.deltas[2].percent_change, Some(-20.0));

    let grants = report.series(ReportScale::Yearly, "grants").unwrap();
    assert_eq!(grants.deltas[1].percent_change, None);
    assert_eq!(grants.deltas[2].absolute_change, Some(50.0));
    assert_eq!(grants.deltas[2].percent_change, None);
    assert_eq!(grants.summary.measured_changes, 0);
    assert!(grants.summary.insufficient_data);

    let ttm = report.ttm.metric("net_income").unwrap();
    assert_eq!(ttm.ttm_total, -80.0);
    assert_eq!(ttm.yoy_comparison_total, Some(-100.0));
    assert_eq!(ttm.yoy_change_percent, Some(-20.0));

    let grants_ttm = report.ttm.metric("grants").unwrap();
    assert_eq!(grants_ttm.yoy_comparison_total, Some(0.0));
    assert_eq!(grants_ttm.yoy_change_percent, None);

    assert!(report
        .insights
        .executive_summary
        .contains(&"net_income declined 20.00% year over year in 2023 (notable decline)".to_string()));
    Ok(())
}

#[test]
fn test_ttm_boundary_and_average_basis() -> Result<()> {
    let table = table_from_csv(
        "date,revenue
         2023-06-30,10
         2024-06-30,20",
    )?;
    let report = analyze_table(&table, &AnalysisConfig::new("date"))?;
    let window = report.ttm.window.unwrap();
    assert_eq!(window.period_end.date(), NaiveDate::from_ymd_opt(2024, 6, 30).unwrap());

    let revenue = report.ttm.metric("revenue").unwrap();
    assert_eq!(revenue.ttm_total, 20.0);
    assert_eq!(revenue.yoy_comparison_total, Some(10.0));
    assert_eq!(revenue.yoy_change_percent, Some(100.0));
    assert_eq!(revenue.ttm_std_dev, None);

    // Two observations a month for a year, 50 each.
    let mut csv = String::from("date,revenue\n");
    for month in 1..=12 {
        csv.push_str(&format!("2023-{:02}-10,50\n2023-{:02}-20,50\n", month, month));
    }
    let table = table_from_csv(&csv)?;

    let raw = analyze_table(&table, &AnalysisConfig::new("date"))?;
    assert_eq!(raw.ttm.metric("revenue").unwrap().ttm_average, 50.0);
    assert_eq!(raw.ttm.average_basis, AverageBasis::RawObservations);

    let config = AnalysisConfig::new("date").with_average_basis(AverageBasis::CalendarMonths);
    let monthly = analyze_table(&table, &config)?;
    let revenue = monthly.ttm.metric("revenue").unwrap();
    assert_eq!(revenue.ttm_average, 100.0);
    assert_eq!(revenue.ttm_total, 1200.0);
    assert!(monthly.insights.ttm.metrics[0]
        .findings
        .contains(&"TTM revenue average: 100.00 per month".to_string()));
    Ok(())
}

#[test]
fn test_daily_data_across_iso_year_boundary() -> Result<()> {
    let mut csv = String::from("date,visits\n");
    let start = NaiveDate::from_ymd_opt(2024, 12, 28).unwrap();
    for (i, day) in start.iter_days().take(9).enumerate() {
        csv.push_str(&format!("{},{}\n", day.format("%Y-%m-%d"), 10 + i));
    }
    let table = table_from_csv(&csv)?;

    let report = analyze_table(&table, &AnalysisConfig::new("date"))?;
    assert_eq!(report.granularity, Granularity::Daily);

    let weekly = report.aggregation.series(ReportScale::Weekly, "visits").unwrap();
    assert_eq!(weekly.labels(), vec!["2024-W52", "2025-W01"]);
    assert_eq!(weekly.values(), vec![Some(21.0), Some(105.0)]);
    assert_eq!(weekly.periods[1].start, NaiveDate::from_ymd_opt(2024, 12, 30).unwrap());
    assert_eq!(weekly.periods[1].end, NaiveDate::from_ymd_opt(2025, 1, 5).unwrap());

    let monthly = report.aggregation.series(ReportScale::Monthly, "visits").unwrap();
    assert_eq!(monthly.labels(), vec!["2024-12", "2025-01"]);

    // Every scale conserves the grand total.
    for scale in ReportScale::ALL {
        let series = report.aggregation.series(scale, "visits").unwrap();
        assert_eq!(series.total(), 126.0);
    }
    Ok(())
}

#[test]
fn test_category_breakdown() -> Result<()> {
    let table = table_from_csv(
        "date,region,sales
         2024-01-10,North,100
         2024-01-20,South,50
         2024-02-10,North,120
         2024-02-20,South,40",
    )?;
    let config = AnalysisConfig::new("date")
        .with_metrics(["sales"])
        .with_category("region");

    let report = analyze_table(&table, &config)?;
    let monthly = report.aggregation.get(ReportScale::Monthly).unwrap();

    let names: Vec<String> = monthly.series.iter().map(|s| s.display_name()).collect();
    assert_eq!(names, vec!["sales", "sales [North]", "sales [South]"]);
    assert_eq!(monthly.overall("sales").unwrap().values(), vec![Some(150.0), Some(160.0)]);
    assert_eq!(
        monthly.for_category("sales", "South").unwrap().values(),
        vec![Some(50.0), Some(40.0)]
    );

    let north = report
        .scale(ReportScale::Monthly)
        .unwrap()
        .series
        .iter()
        .find(|s| s.category.as_deref() == Some("North"))
        .unwrap();
    assert_eq!(north.deltas[1].percent_change, Some(20.0));

    // Category series are narrated but never feed the executive summary.
    let narrated = &report.insights.scale(ReportScale::Monthly).unwrap().series;
    assert_eq!(narrated.len(), 3);
    assert!(narrated[1].findings[0].starts_with("Monthly sales [North]"));
    assert_eq!(report.ttm.metrics.len(), 1);
    Ok(())
}

#[test]
fn test_data_quality_warnings() -> Result<()> {
    let mut csv = String::from("date,orders\n");
    let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    for (i, day) in start.iter_days().take(20).enumerate() {
        let value = match i {
            3 => "n/a".to_string(),
            7 => String::new(),
            12 => "9000".to_string(),
            _ => format!("{}", 100 + (i % 5)),
        };
        csv.push_str(&format!("{},{}\n", day.format("%Y-%m-%d"), value));
    }
    csv.push_str(",100\n");
    let table = table_from_csv(&csv)?;

    let config = AnalysisConfig::new("date").with_metrics(["orders"]);
    let report = analyze_table(&table, &config)?;

    assert_eq!(report.warnings.len(), 4);
    assert!(report.warnings.iter().any(|w| w.contains("skipped")));
    assert!(report
        .warnings
        .contains(&"Metric 'orders': 1 non-numeric value(s) coerced to null and excluded".to_string()));
    assert!(report
        .warnings
        .contains(&"Metric 'orders': 1 missing value(s) excluded".to_string()));
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("most extreme 9000.00 at 2024-03-13")));
    assert_eq!(report.insights.data_quality, report.warnings);

    let monthly = report.aggregation.series(ReportScale::Monthly, "orders").unwrap();
    assert_eq!(monthly.periods[0].observations, 20);
    assert_eq!(monthly.periods[0].excluded, 2);
    Ok(())
}

#[test]
fn test_configuration_errors() -> Result<()> {
    let table = table_from_csv(
        "date,revenue
         2024-01-01,1
         2024-02-01,2",
    )?;

    let missing_ts = analyze_table(&table, &AnalysisConfig::new("period")).unwrap_err();
    assert!(matches!(missing_ts, AnalysisError::MissingTimestampColumn(ref c) if c == "period"));
    assert!(missing_ts.is_configuration_error());

    let missing_metric =
        analyze_table(&table, &AnalysisConfig::new("date").with_metrics(["margin"])).unwrap_err();
    assert!(missing_metric.is_configuration_error());

    let mixed = table_from_csv(
        "date,revenue
         2024-01-01,1
         2024/02/01,2",
    )?;
    let err = analyze_table(&mixed, &AnalysisConfig::new("date")).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidTimestamp { row: 1, .. }));

    let garbage = table_from_csv(
        "date,revenue
         soon,1",
    )?;
    assert!(analyze_table(&garbage, &AnalysisConfig::new("date")).is_err());
    Ok(())
}

#[test]
fn test_empty_table_reports_insufficient_data() -> Result<()> {
    let table = table_from_csv("date,revenue\n")?;
    let report = analyze_table(&table, &AnalysisConfig::new("date"))?;

    assert!(report.aggregation.is_empty());
    assert!(report.scales.is_empty());
    assert!(report.ttm.window.is_none());
    assert!(report.ttm.insufficient_data);
    assert_eq!(
        report.insights.ttm.summary,
        "insufficient data for trailing-twelve-month analysis"
    );
    assert!(!report.insights.has_executive_signals());
    Ok(())
}

#[test]
fn test_alternate_timestamp_formats() -> Result<()> {
    let year_month = table_from_csv(
        "month,revenue
         2024-01,10
         2024-02,20",
    )?;
    let report = analyze_table(&year_month, &AnalysisConfig::new("month"))?;
    assert_eq!(
        report.series(ReportScale::Monthly, "revenue").unwrap().deltas[1].percent_change,
        Some(100.0)
    );

    let hourly = table_from_csv(
        "ts,load
         2024-05-01 00:00:00,1
         2024-05-01 01:00:00,2
         2024-05-01 02:00:00,3",
    )?;
    let report = analyze_table(&hourly, &AnalysisConfig::new("ts"))?;
    assert_eq!(report.granularity, Granularity::Hourly);
    assert_eq!(
        report.aggregation.series(ReportScale::Weekly, "load").unwrap().values(),
        vec![Some(6.0)]
    );
    Ok(())
}

#[test]
fn test_insights_serialize_and_cache() -> Result<()> {
    let csv = month_end_csv(
        NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
        "revenue",
        &["100", "110", "120", "115"].map(String::from),
    );
    let table = table_from_csv(&csv)?;
    let config = AnalysisConfig::new("date");

    let mut cache = AnalysisCache::new();
    let report = PeriodAnalysisEngine::analyze_cached(&table, &config, &mut cache)?;
    let again = PeriodAnalysisEngine::analyze_cached(&table, &config, &mut cache)?;
    assert_eq!(report, again);
    assert_eq!(cache.hits(), 1);

    let json = serde_json::to_value(&report.insights)?;
    for key in ["scales", "ttm", "executive_summary", "data_quality"] {
        assert!(json.get(key).is_some(), "missing key {}", key);
    }
    assert_eq!(json["scales"][0]["scale"], "yearly");

    let restored: StructuredInsights = serde_json::from_value(json)?;
    assert_eq!(restored, report.insights);

    let full = serde_json::to_value(&report)?;
    assert_eq!(full["granularity"], "monthly");
    assert_eq!(full["ttm"]["average_basis"], "raw_observations");

    let schema = StructuredInsights::schema_as_json()?;
    assert!(schema.contains("executive_summary"));
    let config_schema = serde_json::to_string(&AnalysisConfig::generate_json_schema())?;
    assert!(config_schema.contains("timestamp_field"));
    Ok(())
}

#[test]
fn test_bare_year_timestamps() -> Result<()> {
    let table = table_from_csv(
        "year,revenue
         2021,100
         2022,120
         2023,150",
    )?;
    assert_eq!(table.rows[0][0], CellValue::Number(2021.0));

    let report = analyze_table(&table, &AnalysisConfig::new("year"))?;
    assert_eq!(report.granularity, Granularity::Yearly);
    assert_eq!(report.metrics, vec!["revenue".to_string()]);

    let yearly = report.aggregation.series(ReportScale::Yearly, "revenue").unwrap();
    assert_eq!(yearly.labels(), vec!["2021", "2022", "2023"]);
    assert_eq!(yearly.periods[0].start, NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());

    let analysis = report.series(ReportScale::Yearly, "revenue").unwrap();
    assert_eq!(analysis.deltas[1].percent_change, Some(20.0));
    assert_eq!(analysis.deltas[2].percent_change, Some(25.0));
    assert!(report
        .insights
        .executive_summary
        .contains(&"revenue grew 25.00% year over year in 2023 (significant growth)".to_string()));
    Ok(())
}

#[test]
fn test_flat_quarter_breaks_momentum() -> Result<()> {
    let table = table_from_csv(
        "date,revenue
         2023-03-31,100
         2023-06-30,100
         2023-09-30,110",
    )?;
    let report = analyze_table(&table, &AnalysisConfig::new("date"))?;
    assert_eq!(
        report.insights.executive_summary,
        vec![NO_EXECUTIVE_INSIGHTS.to_string()]
    );
    Ok(())
}

#[test]
fn test_auto_selection_reports_mixed_columns() -> Result<()> {
    let table = table_from_csv(
        "date,revenue,units
         2024-01-31,100,5
         2024-02-29,110,n/a
         2024-03-31,120,7",
    )?;
    let report = analyze_table(&table, &AnalysisConfig::new("date"))?;
    assert_eq!(report.metrics, vec!["revenue".to_string()]);
    assert_eq!(
        report.warnings,
        vec!["Column 'units' mixes numbers and text and was left out of automatic metric selection"
            .to_string()]
    );
    assert_eq!(report.insights.data_quality, report.warnings);
    Ok(())
}
