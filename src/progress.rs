//! A trackable with nothing designed is skipped outright and its share of the
//! renormalized weight is not handed to the others, so a selection containing
//! such trackables under-reports the progress of the rest. Known quirk; do not
//! redistribute.

use crate::catalog::{CategoryKind, Trackable};
use crate::error::ratio;
use crate::metrics::CategoryMetricsTable;
use crate::models::WeightedSummary;

/// `projectWeight / Σ projectWeight` over the selection.
pub fn normalized_weights<'a>(selected: &[&'a Trackable]) -> Vec<(&'a Trackable, f64)> {
    let total: f64 = selected.iter().map(|t| t.project_weight).sum();
    selected
        .iter()
        .map(|t| (*t, ratio(t.project_weight, total)))
        .collect()
}

pub fn weighted_pct(
    table: &CategoryMetricsTable,
    selected: &[&Trackable],
    kind: CategoryKind,
) -> f64 {
    normalized_weights(selected)
        .into_iter()
        .filter_map(|(trackable, weight)| {
            let designed = table.raw_value(CategoryKind::Designed, &trackable.id);
            if designed <= 0.0 {
                return None;
            }
            let achieved = table.raw_value(kind, &trackable.id);
            Some(achieved / designed * 100.0 * weight)
        })
        .sum()
}

pub fn summarize(table: &CategoryMetricsTable, selected: &[&Trackable]) -> WeightedSummary {
    WeightedSummary {
        construction_pct: weighted_pct(table, selected, CategoryKind::Constructed),
        billing_pct: weighted_pct(table, selected, CategoryKind::DailyComplete),
        invoiced_pct: weighted_pct(table, selected, CategoryKind::Invoiced),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::trackable;

    fn table(rows: &[(&str, f64, f64)]) -> CategoryMetricsTable {
        let mut table = CategoryMetricsTable::default();
        for (id, designed, constructed) in rows {
            table.set(CategoryKind::Designed, id, *designed, 1);
            table.set(CategoryKind::Constructed, id, *constructed, 1);
        }
        table
    }

    #[test]
    fn normalized_weights_sum_to_one() {
        let a = trackable("a", 0.3);
        let b = trackable("b", 0.2);
        let c = trackable("c", 0.15);
        let total: f64 = normalized_weights(&[&a, &b, &c])
            .iter()
            .map(|(_, w)| w)
            .sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn weighted_construction_matches_hand_calculation() {
        let a = trackable("a", 0.6);
        let b = trackable("b", 0.4);
        let table = table(&[("a", 100.0, 50.0), ("b", 50.0, 25.0)]);

        let both = summarize(&table, &[&a, &b]);
        assert!((both.construction_pct - 50.0).abs() < 1e-9);

        let only_b = summarize(&table, &[&b]);
        assert!((only_b.construction_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn zero_designed_trackable_keeps_its_weight_share() {
        let a = trackable("a", 0.5);
        let b = trackable("b", 0.5);
        let table = table(&[("a", 100.0, 100.0), ("b", 0.0, 0.0)]);

        let summary = summarize(&table, &[&a, &b]);
        assert!((summary.construction_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn nothing_designed_yields_zero() {
        let a = trackable("a", 0.5);
        let table = table(&[("a", 0.0, 10.0)]);
        assert_eq!(summarize(&table, &[&a]), WeightedSummary::default());
    }

    #[test]
    fn zero_total_weight_does_not_produce_nan() {
        let a = trackable("a", 0.0);
        let table = table(&[("a", 10.0, 5.0)]);
        let pct = weighted_pct(&table, &[&a], CategoryKind::Constructed);
        assert_eq!(pct, 0.0);
    }
}
