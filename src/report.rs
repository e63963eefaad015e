use std::fmt::Write;

use serde::Serialize;
use tracing::info;

use crate::alerts::{self, AlertContext};
use crate::billing;
use crate::catalog::{Catalog, CategoryKind, Trackable};
use crate::compare::{self, PeriodComparison};
use crate::config::{DateRange, ReportConfig};
use crate::crew;
use crate::error::Result;
use crate::metrics::{CategoryMetricsTable, MetricCell, SourceFailure};
use crate::models::{
    Alert, BillingLag, CrewRecord, ForecastResult, IdentityLookup, LagStatus, Record,
    TimelineSeries, VelocityRecord, WeightedSummary,
};
use crate::progress;
use crate::timeline;
use crate::velocity;

#[derive(Debug, Default)]
pub struct ReportInputs {
    pub records: Vec<Record>,
    pub tickets: Vec<Record>,
    pub lookup: IdentityLookup,
    pub failures: Vec<SourceFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub generated_on: chrono::NaiveDate,
    pub range: Option<DateRange>,
    pub trackables: Vec<String>,
    pub summary: WeightedSummary,
    pub table: CategoryMetricsTable,
    pub velocities: Vec<VelocityRecord>,
    pub forecast: Option<ForecastResult>,
    pub billing: Vec<BillingLag>,
    pub alerts: Vec<Alert>,
    pub crews: Vec<CrewRecord>,
    pub timeline: TimelineSeries,
    pub comparison: Option<PeriodComparison>,
}

pub fn build_report(
    config: &ReportConfig,
    catalog: &Catalog,
    inputs: &ReportInputs,
) -> Result<ProgressReport> {
    let selected = config.select(catalog)?;
    let filter = config.filter();

    let mut table = CategoryMetricsTable::build(catalog, &selected, &inputs.records, &filter);
    for failure in &inputs.failures {
        table.mark_failed(failure);
    }

    let summary = progress::summarize(&table, &selected);
    let mut velocities =
        velocity::compute_velocities(catalog, &selected, &inputs.records, &filter);
    for failure in &inputs.failures {
        velocity::mark_failed(&mut velocities, failure);
    }
    let forecast = velocity::forecast(catalog, &table, &velocities, config.today);
    let billing = billing::billing_lags(&table, &selected);
    let alerts = alerts::evaluate(&AlertContext {
        table: &table,
        selected: &selected,
        velocities: &velocities,
        window_days: config.window_days(),
        today: config.today,
    });
    let crews = crew::rank_crews(
        catalog,
        &selected,
        &inputs.records,
        &inputs.tickets,
        &inputs.lookup,
        &filter,
    );
    let timeline = timeline::build_timeline(
        catalog,
        &selected,
        &inputs.records,
        config.explicit_bounds(),
        config.granularity,
    );
    let comparison = config.comparison.as_ref().map(|(first, second)| {
        compare::compare_periods(
            catalog,
            &selected,
            &inputs.records,
            &inputs.failures,
            first,
            second,
        )
    });

    info!(
        trackables = selected.len(),
        records = inputs.records.len(),
        alerts = alerts.len(),
        crews = crews.len(),
        "report built"
    );

    Ok(ProgressReport {
        generated_on: config.today,
        range: config.range,
        trackables: selected.iter().map(|t| t.id.clone()).collect(),
        summary,
        table,
        velocities,
        forecast,
        billing,
        alerts,
        crews,
        timeline,
        comparison,
    })
}

fn trackable_label<'a>(catalog: &'a Catalog, id: &'a str) -> (&'a str, &'a str) {
    catalog
        .trackable(id)
        .map(|t: &Trackable| (t.name.as_str(), t.unit.as_str()))
        .unwrap_or((id, ""))
}

fn range_label(range: Option<DateRange>) -> String {
    match range {
        Some(DateRange::Between { start, end }) => format!("{start} to {end}"),
        _ => "all time".to_string(),
    }
}

fn lag_label(status: &LagStatus) -> String {
    match status {
        LagStatus::FullyComplete => "fully marked complete".to_string(),
        LagStatus::Behind {
            gap,
            percent_complete,
        } => format!("{gap:.0} behind ({percent_complete:.1}% complete)"),
    }
}

pub fn render_markdown(report: &ProgressReport, catalog: &Catalog) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Construction Progress Report");
    let _ = writeln!(
        output,
        "Generated {} for {} ({} trackables)",
        report.generated_on,
        range_label(report.range),
        report.trackables.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Weighted Progress");
    let _ = writeln!(
        output,
        "- Constructed: {:.1}%",
        report.summary.construction_pct
    );
    let _ = writeln!(output, "- Daily complete: {:.1}%", report.summary.billing_pct);
    let _ = writeln!(output, "- Invoiced: {:.1}%", report.summary.invoiced_pct);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Quantities");
    for id in &report.trackables {
        let (name, unit) = trackable_label(catalog, id);
        let cells: Vec<String> = [
            CategoryKind::Designed,
            CategoryKind::Constructed,
            CategoryKind::DailyComplete,
            CategoryKind::Invoiced,
            CategoryKind::OnHold,
        ]
        .into_iter()
        .map(|kind| match report.table.cell(kind, id) {
            Some(MetricCell::Error { .. }) => format!("{} ERR", kind.label()),
            cell => format!(
                "{} {:.0}",
                kind.label(),
                cell.map(MetricCell::raw_value).unwrap_or(0.0)
            ),
        })
        .collect();
        let _ = writeln!(output, "- {} ({}): {}", name, unit, cells.join(", "));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Velocity & Forecast");
    for record in &report.velocities {
        let (name, unit) = trackable_label(catalog, &record.trackable_id);
        if let Some(error) = &record.error {
            let _ = writeln!(output, "- {}: ERR ({})", name, error);
            continue;
        }
        let last = record
            .last_activity_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "never".to_string());
        let _ = writeln!(
            output,
            "- {}: {:.1} {}/day over {} production days (last activity {})",
            name, record.velocity, unit, record.production_days, last
        );
    }
    match &report.forecast {
        Some(ForecastResult {
            estimated_completion_date: Some(date),
            production_days_needed,
            calendar_days_needed,
        }) => {
            let _ = writeln!(
                output,
                "Estimated completion {} ({} production days, {} calendar days).",
                date, production_days_needed, calendar_days_needed
            );
        }
        _ => {
            let _ = writeln!(output, "No forecast available.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Billing Lag");
    for lag in &report.billing {
        let (name, _) = trackable_label(catalog, &lag.trackable_id);
        let _ = writeln!(
            output,
            "- {}: daily complete {}; invoiced {}",
            name,
            lag_label(&lag.daily_complete),
            lag_label(&lag.invoiced)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Alerts");
    if report.alerts.is_empty() {
        let _ = writeln!(output, "No alerts for this window.");
    } else {
        for alert in &report.alerts {
            let _ = writeln!(
                output,
                "- [{:?}] {}: {}",
                alert.severity, alert.title, alert.message
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Crew Rankings");
    if report.crews.is_empty() {
        let _ = writeln!(output, "No crew activity recorded for this window.");
    } else {
        for crew in report.crews.iter().take(10) {
            let approval = crew
                .avg_approval_days
                .map(|d| format!("{d:.1} days"))
                .unwrap_or_else(|| "n/a".to_string());
            let _ = writeln!(
                output,
                "{}. {} ({:?}): {:.1}/day over {} days, {} open / {} approved tickets (avg approval {}), {:.1}% billed",
                crew.rank,
                crew.name,
                crew.tier,
                crew.daily_rate,
                crew.production_days,
                crew.open_tickets,
                crew.approved_tickets,
                approval,
                crew.billing_efficiency_pct
            );
        }
    }

    if let (Some(first), Some(last)) = (
        report.timeline.labels.first(),
        report.timeline.labels.last(),
    ) {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Cumulative Timeline ({first} to {last})");
        for (id, values) in &report.timeline.series {
            let (name, unit) = trackable_label(catalog, id);
            let _ = writeln!(
                output,
                "- {}: {:.0} {} cumulative",
                name,
                values.last().copied().unwrap_or(0.0),
                unit
            );
        }
    }

    if let Some(comparison) = &report.comparison {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "## Period Comparison ({} vs {})",
            comparison.first.period.end, comparison.second.period.end
        );
        let _ = writeln!(
            output,
            "- Constructed: {:.1}% -> {:.1}%",
            comparison.first.summary.construction_pct, comparison.second.summary.construction_pct
        );
        for delta in &comparison.deltas {
            let _ = writeln!(
                output,
                "- {}: {:.0} -> {:.0} ({:+.0}, {:+.1}%)",
                delta.category.label(),
                delta.total_p1,
                delta.total_p2,
                delta.variance,
                delta.percent_change
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures;
    use crate::config::{Granularity, Period};
    use chrono::NaiveDate;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn config(comparison: Option<(Period, Period)>) -> ReportConfig {
        ReportConfig {
            trackable_ids: Vec::new(),
            range: Some(DateRange::AllTime),
            granularity: Granularity::Monthly,
            comparison,
            today: date(3, 1),
        }
    }

    fn inputs() -> ReportInputs {
        ReportInputs {
            records: vec![
                Record::new("a", 100.0, "DESIGNED", None),
                Record::new("a", 30.0, "CONSTRUCTED", Some(date(2, 2))).with_crew(Some("C1"), None),
                Record::new("a", 20.0, "DAILY_COMPLETE", Some(date(2, 3))).with_crew(Some("C1"), None),
                Record::new("b", 50.0, "DESIGNED", None),
            ],
            ..ReportInputs::default()
        }
    }

    #[test]
    fn builds_every_section() {
        let catalog = fixtures::catalog();
        let comparison = Some((
            Period {
                start: date(1, 1),
                end: date(1, 31),
            },
            Period {
                start: date(2, 1),
                end: date(2, 28),
            },
        ));

        let report = build_report(&config(comparison), &catalog, &inputs()).unwrap();

        assert_eq!(report.trackables, vec!["a", "b"]);
        // a: 50 of 150 designed at weight 0.6
        assert!((report.summary.construction_pct - 20.0).abs() < 1e-9);
        assert_eq!(report.velocities[0].production_days, 2);
        assert!(report.forecast.is_some());
        assert_eq!(report.crews.len(), 1);
        assert_eq!(report.timeline.labels, vec!["Feb 2026"]);
        assert!(report.comparison.is_some());
        assert!(report.alerts.iter().any(|a| a.title == "Stalled work"));
    }

    #[test]
    fn validation_errors_abort_the_run() {
        let catalog = fixtures::catalog();
        let mut config = config(None);
        config.range = None;
        assert!(build_report(&config, &catalog, &inputs()).is_err());
    }

    #[test]
    fn markdown_marks_failed_cells() {
        let catalog = fixtures::catalog();
        let mut inputs = inputs();
        inputs.failures.push(SourceFailure {
            trackable_id: "b".to_string(),
            message: "connection reset".to_string(),
        });

        let report = build_report(&config(None), &catalog, &inputs).unwrap();
        let markdown = render_markdown(&report, &catalog);

        assert!(markdown.starts_with("# Construction Progress Report"));
        assert!(markdown.contains("- B (ft): Designed ERR"));
        assert!(markdown.contains("1. C1 (Gold)"));
        assert!(!markdown.contains("## Period Comparison"));
    }

    #[test]
    fn repeated_trackable_ids_do_not_change_the_figures() {
        let catalog = fixtures::catalog();
        let once = build_report(&config(None), &catalog, &inputs()).unwrap();

        let mut repeated = config(None);
        repeated.trackable_ids = ["a", "a", "b"].iter().map(|id| id.to_string()).collect();
        let twice = build_report(&repeated, &catalog, &inputs()).unwrap();

        assert_eq!(twice.trackables, vec!["a", "b"]);
        assert_eq!(twice.table.raw_value(CategoryKind::Constructed, "a"), 50.0);
        assert_eq!(twice.summary, once.summary);
        assert_eq!(twice.velocities.len(), 2);
    }

    #[test]
    fn failed_fetch_is_not_treated_as_idle_work() {
        let catalog = fixtures::catalog();
        let mut inputs = inputs();
        inputs.failures.push(SourceFailure {
            trackable_id: "b".to_string(),
            message: "timeout".to_string(),
        });

        let report = build_report(&config(None), &catalog, &inputs).unwrap();

        assert_eq!(report.velocities[1].error.as_deref(), Some("timeout"));
        assert!(report.alerts.iter().all(|a| a.title != "Stalled work"));
        let markdown = render_markdown(&report, &catalog);
        assert!(markdown.contains("- B: ERR (timeout)"));
    }

    #[test]
    fn json_export_uses_camel_case() {
        let catalog = fixtures::catalog();
        let report = build_report(&config(None), &catalog, &inputs()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["summary"]["constructionPct"].is_number());
        assert_eq!(json["table"]["constructed"]["a"]["rawValue"], 50.0);
        assert!(json["comparison"].is_null());
    }
}
