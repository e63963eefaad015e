use crate::catalog::{CategoryKind, Trackable};
use crate::error::ratio;
use crate::metrics::CategoryMetricsTable;
use crate::models::{BillingLag, LagStatus};

/// Compares a billing stage against what has been constructed. Never negative:
/// anything at or above the constructed quantity is fully complete.
pub fn lag_status(constructed: f64, achieved: f64) -> LagStatus {
    let gap = constructed - achieved;
    if gap <= 0.0 {
        return LagStatus::FullyComplete;
    }
    LagStatus::Behind {
        gap,
        percent_complete: ratio(achieved, constructed) * 100.0,
    }
}

/// Daily-complete and invoiced lag per trackable, both baselined on Constructed.
pub fn billing_lags(table: &CategoryMetricsTable, selected: &[&Trackable]) -> Vec<BillingLag> {
    selected
        .iter()
        .map(|trackable| {
            let constructed = table.raw_value(CategoryKind::Constructed, &trackable.id);
            let daily = table.raw_value(CategoryKind::DailyComplete, &trackable.id);
            let invoiced = table.raw_value(CategoryKind::Invoiced, &trackable.id);
            BillingLag {
                trackable_id: trackable.id.clone(),
                constructed,
                daily_complete: lag_status(constructed, daily),
                invoiced: lag_status(constructed, invoiced),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::trackable;

    #[test]
    fn reports_gap_and_percent_behind_constructed() {
        let a = trackable("a", 1.0);
        let mut table = CategoryMetricsTable::default();
        table.set(CategoryKind::Constructed, "a", 200.0, 4);
        table.set(CategoryKind::DailyComplete, "a", 150.0, 3);
        table.set(CategoryKind::Invoiced, "a", 50.0, 1);

        let lags = billing_lags(&table, &[&a]);

        assert_eq!(
            lags[0].daily_complete,
            LagStatus::Behind {
                gap: 50.0,
                percent_complete: 75.0
            }
        );
        assert_eq!(
            lags[0].invoiced,
            LagStatus::Behind {
                gap: 150.0,
                percent_complete: 25.0
            }
        );
    }

    #[test]
    fn ahead_of_construction_is_fully_complete_not_negative() {
        assert_eq!(lag_status(100.0, 120.0), LagStatus::FullyComplete);
        assert_eq!(lag_status(100.0, 100.0), LagStatus::FullyComplete);
        assert_eq!(lag_status(0.0, 0.0), LagStatus::FullyComplete);
    }
}
