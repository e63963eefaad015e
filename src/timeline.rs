use chrono::{Datelike, Duration, Months, NaiveDate};
use tracing::debug;

use crate::catalog::{Catalog, DateFilter, Trackable};
use crate::config::Granularity;
use crate::models::{Record, TimelineSeries};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub label: String,
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?.checked_add_months(Months::new(1))
}

/// Splits `[start, end]` into non-overlapping buckets. Weekly buckets are
/// anchored at `start`; monthly buckets follow calendar months except the
/// first, which begins at `start`, and the last, which is clamped to `end`.
pub fn buckets(start: NaiveDate, end: NaiveDate, granularity: Granularity) -> Vec<Bucket> {
    let mut buckets = Vec::new();
    let mut cursor = start;

    while cursor <= end {
        let (bucket_end, next, label) = match granularity {
            Granularity::Daily => (
                cursor,
                cursor.succ_opt(),
                cursor.format("%Y-%m-%d").to_string(),
            ),
            Granularity::Weekly => {
                let last = cursor + Duration::days(6);
                (
                    last,
                    last.succ_opt(),
                    format!("Wk {}", cursor.format("%Y-%m-%d")),
                )
            }
            Granularity::Monthly => {
                let next = first_of_next_month(cursor);
                let last = next.and_then(|n| n.pred_opt()).unwrap_or(end);
                (last, next, cursor.format("%b %Y").to_string())
            }
        };

        buckets.push(Bucket {
            start: cursor,
            end: bucket_end.min(end),
            label,
        });
        match next {
            Some(next) => cursor = next,
            None => break,
        }
    }

    buckets
}

/// Builds cumulative Constructed series for the selected trackables. Without
/// explicit bounds the range spans the qualifying records' activity dates.
pub fn build_timeline(
    catalog: &Catalog,
    selected: &[&Trackable],
    records: &[Record],
    bounds: Option<(NaiveDate, NaiveDate)>,
    granularity: Granularity,
) -> TimelineSeries {
    let Some(constructed) = catalog.constructed() else {
        return TimelineSeries::default();
    };

    let dated: Vec<Vec<(NaiveDate, f64)>> = selected
        .iter()
        .map(|trackable| {
            let mut points: Vec<(NaiveDate, f64)> = records
                .iter()
                .filter(|r| trackable.admits(r) && constructed.admits(r, &DateFilter::All))
                .filter_map(|r| r.activity_date.map(|d| (d, trackable.contribution(r))))
                .collect();
            points.sort_by_key(|(date, _)| *date);
            points
        })
        .collect();

    let range = bounds.or_else(|| {
        let all = dated.iter().flatten().map(|(date, _)| *date);
        Some((all.clone().min()?, all.max()?))
    });
    let Some((start, end)) = range else {
        return TimelineSeries::default();
    };

    let buckets = buckets(start, end, granularity);
    let mut timeline = TimelineSeries {
        labels: buckets.iter().map(|b| b.label.clone()).collect(),
        ..TimelineSeries::default()
    };

    for (trackable, points) in selected.iter().zip(&dated) {
        let mut running = 0.0;
        let mut next = 0;
        let values = buckets
            .iter()
            .map(|bucket| {
                while let Some((date, amount)) = points.get(next) {
                    if *date > bucket.end {
                        break;
                    }
                    running += amount;
                    next += 1;
                }
                running
            })
            .collect();
        timeline.series.insert(trackable.id.clone(), values);
    }

    debug!(
        buckets = timeline.labels.len(),
        trackables = timeline.series.len(),
        "built cumulative timeline"
    );
    timeline
}
