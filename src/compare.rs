use serde::Serialize;

use crate::catalog::{Catalog, CategoryKind, DateFilter, Trackable};
use crate::config::Period;
use crate::error::ratio;
use crate::metrics::{CategoryMetricsTable, SourceFailure};
use crate::models::{Record, WeightedSummary};
use crate::progress;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSnapshot {
    pub period: Period,
    pub summary: WeightedSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDelta {
    pub category: CategoryKind,
    pub total_p1: f64,
    pub total_p2: f64,
    pub variance: f64,
    pub percent_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodComparison {
    pub first: PeriodSnapshot,
    pub second: PeriodSnapshot,
    pub deltas: Vec<CategoryDelta>,
}

/// Cumulative snapshot as of the period end. Date-insensitive categories
/// ignore the filter and reflect current state.
pub fn snapshot_table(
    catalog: &Catalog,
    selected: &[&Trackable],
    records: &[Record],
    failures: &[SourceFailure],
    period: &Period,
) -> CategoryMetricsTable {
    let mut table =
        CategoryMetricsTable::build(catalog, selected, records, &DateFilter::UpTo(period.end));
    for failure in failures {
        table.mark_failed(failure);
    }
    table
}

pub fn compare_tables(
    catalog: &Catalog,
    selected: &[&Trackable],
    first: (&Period, &CategoryMetricsTable),
    second: (&Period, &CategoryMetricsTable),
) -> PeriodComparison {
    let ids = || selected.iter().map(|t| t.id.as_str());

    let deltas = catalog
        .categories
        .iter()
        .map(|category| {
            let total_p1 = first.1.total(category.kind, ids());
            let total_p2 = second.1.total(category.kind, ids());
            let variance = total_p2 - total_p1;
            CategoryDelta {
                category: category.kind,
                total_p1,
                total_p2,
                variance,
                percent_change: if total_p1 > 0.0 {
                    ratio(variance, total_p1) * 100.0
                } else {
                    0.0
                },
            }
        })
        .collect();

    PeriodComparison {
        first: PeriodSnapshot {
            period: *first.0,
            summary: progress::summarize(first.1, selected),
        },
        second: PeriodSnapshot {
            period: *second.0,
            summary: progress::summarize(second.1, selected),
        },
        deltas,
    }
}

pub fn compare_periods(
    catalog: &Catalog,
    selected: &[&Trackable],
    records: &[Record],
    failures: &[SourceFailure],
    first: &Period,
    second: &Period,
) -> PeriodComparison {
    let first_table = snapshot_table(catalog, selected, records, failures, first);
    let second_table = snapshot_table(catalog, selected, records, failures, second);
    compare_tables(
        catalog,
        selected,
        (first, &first_table),
        (second, &second_table),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures;
    use chrono::NaiveDate;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn records() -> Vec<Record> {
        vec![
            Record::new("a", 100.0, "DESIGNED", None),
            Record::new("a", 50.0, "CONSTRUCTED", Some(date(1, 10))),
            Record::new("a", 50.0, "CONSTRUCTED", Some(date(2, 10))),
            Record::new("b", 40.0, "ON_HOLD", Some(date(2, 12))),
        ]
    }

    fn delta(comparison: &PeriodComparison, kind: CategoryKind) -> &CategoryDelta {
        comparison
            .deltas
            .iter()
            .find(|d| d.category == kind)
            .unwrap()
    }

    #[test]
    fn later_period_includes_everything_to_date() {
        let catalog = fixtures::catalog();
        let selected: Vec<&Trackable> = catalog.trackables.iter().collect();
        let january = Period {
            start: date(1, 1),
            end: date(1, 31),
        };
        let february = Period {
            start: date(2, 1),
            end: date(2, 28),
        };

        let comparison =
            compare_periods(&catalog, &selected, &records(), &[], &january, &february);

        let constructed = delta(&comparison, CategoryKind::Constructed);
        assert_eq!(constructed.total_p1, 50.0);
        assert_eq!(constructed.total_p2, 100.0);
        assert_eq!(constructed.variance, 50.0);
        assert_eq!(constructed.percent_change, 100.0);

        let on_hold = delta(&comparison, CategoryKind::OnHold);
        assert_eq!(on_hold.total_p1, on_hold.total_p2);
        assert!(comparison.second.summary.construction_pct > comparison.first.summary.construction_pct);
    }

    #[test]
    fn comparing_a_period_with_itself_has_no_variance() {
        let catalog = fixtures::catalog();
        let selected: Vec<&Trackable> = catalog.trackables.iter().collect();
        let period = Period {
            start: date(1, 1),
            end: date(2, 28),
        };

        let comparison = compare_periods(&catalog, &selected, &records(), &[], &period, &period);

        for delta in &comparison.deltas {
            assert_eq!(delta.variance, 0.0);
            assert_eq!(delta.percent_change, 0.0);
        }
        assert_eq!(comparison.first.summary, comparison.second.summary);
    }

    #[test]
    fn empty_first_period_reports_zero_percent_change() {
        let catalog = fixtures::catalog();
        let selected: Vec<&Trackable> = catalog.trackables.iter().collect();
        let before = Period {
            start: date(1, 1),
            end: date(1, 5),
        };
        let after = Period {
            start: date(1, 6),
            end: date(1, 31),
        };

        let comparison = compare_periods(&catalog, &selected, &records(), &[], &before, &after);

        let constructed = delta(&comparison, CategoryKind::Constructed);
        assert_eq!(constructed.variance, 50.0);
        assert_eq!(constructed.percent_change, 0.0);
    }
}
