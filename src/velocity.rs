use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::catalog::{Catalog, CategoryKind, DateFilter, Trackable};
use crate::error::ratio;
use crate::metrics::{CategoryMetricsTable, SourceFailure};
use crate::models::{ForecastResult, Record, VelocityRecord};

/// Calendar days per production day, as a 7/5 fraction.
const CALENDAR_DAYS: i64 = 7;
const PRODUCTION_DAYS: i64 = 5;

/// Velocity divides by production days (distinct dates with qualifying work),
/// not elapsed calendar days.
pub fn velocity_for(trackable: &Trackable, qualifying: &[&Record]) -> VelocityRecord {
    let mut dates = BTreeSet::new();
    let mut total_value = 0.0;

    for record in qualifying {
        let Some(date) = record.activity_date else {
            continue;
        };
        dates.insert(date);
        total_value += trackable.contribution(record);
    }

    VelocityRecord {
        trackable_id: trackable.id.clone(),
        velocity: ratio(total_value, dates.len() as f64),
        production_days: dates.len(),
        total_value,
        last_activity_date: dates.last().copied(),
        error: None,
    }
}

pub fn compute_velocities(
    catalog: &Catalog,
    selected: &[&Trackable],
    records: &[Record],
    filter: &DateFilter,
) -> Vec<VelocityRecord> {
    selected
        .iter()
        .map(|trackable| {
            let qualifying: Vec<&Record> = match catalog.constructed() {
                Some(constructed) => records
                    .iter()
                    .filter(|r| trackable.admits(r) && constructed.admits(r, filter))
                    .collect(),
                None => Vec::new(),
            };
            velocity_for(trackable, &qualifying)
        })
        .collect()
}

/// Replaces the velocity of a trackable whose records could not be fetched
/// with an error marker; marked records are ignored by the forecast and alerts.
pub fn mark_failed(velocities: &mut [VelocityRecord], failure: &SourceFailure) {
    for record in velocities
        .iter_mut()
        .filter(|v| v.trackable_id == failure.trackable_id)
    {
        *record = VelocityRecord {
            trackable_id: failure.trackable_id.clone(),
            velocity: 0.0,
            production_days: 0,
            total_value: 0.0,
            last_activity_date: None,
            error: Some(failure.message.clone()),
        };
    }
}

pub fn calendar_days_for(production_days: i64) -> i64 {
    (production_days * CALENDAR_DAYS + PRODUCTION_DAYS - 1) / PRODUCTION_DAYS
}

/// Weights here are the catalog's raw project weights, not the renormalized
/// selection weights used for percentages.
pub fn forecast(
    catalog: &Catalog,
    table: &CategoryMetricsTable,
    velocities: &[VelocityRecord],
    today: NaiveDate,
) -> Option<ForecastResult> {
    let mut weighted_velocity = 0.0;
    let mut weighted_remaining = 0.0;

    for record in velocities.iter().filter(|v| v.error.is_none()) {
        let Some(trackable) = catalog.trackable(&record.trackable_id) else {
            continue;
        };
        let designed = table.raw_value(CategoryKind::Designed, &trackable.id);
        let constructed = table.raw_value(CategoryKind::Constructed, &trackable.id);
        let remaining = (designed - constructed).max(0.0);
        if remaining <= 0.0 || record.velocity <= 0.0 {
            continue;
        }
        weighted_velocity += record.velocity * trackable.project_weight;
        weighted_remaining += remaining * trackable.project_weight;
    }

    if weighted_velocity <= 0.0 {
        debug!("no forecast available: no trackable has both remaining work and velocity");
        return None;
    }

    let production_days_needed = (weighted_remaining / weighted_velocity).ceil() as i64;
    let calendar_days_needed = calendar_days_for(production_days_needed);
    debug!(
        weighted_remaining,
        weighted_velocity, production_days_needed, calendar_days_needed, "forecast computed"
    );

    Some(ForecastResult {
        estimated_completion_date: today.checked_add_signed(Duration::days(calendar_days_needed)),
        production_days_needed,
        calendar_days_needed,
    })
}
