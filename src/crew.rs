use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::debug;

use crate::catalog::{Catalog, CategoryKind, DateFilter, Trackable};
use crate::error::ratio;
use crate::models::{CrewRecord, CrewTier, IdentityLookup, Record, TicketStatus};

/// Display identity for a record: the crew code through the crew lookup, or
/// when there is no crew code, the subcontractor code through its lookup.
/// Codes missing from a lookup stand for themselves.
pub fn resolve_identity(record: &Record, lookup: &IdentityLookup) -> Option<String> {
    let non_blank = |key: &Option<String>| {
        key.as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    };

    let resolved = match non_blank(&record.crew_key) {
        Some(code) => lookup.crews.get(&code).cloned().unwrap_or(code),
        None => {
            let code = non_blank(&record.subcontractor_key)?;
            lookup.subcontractors.get(&code).cloned().unwrap_or(code)
        }
    };

    let trimmed = resolved.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[derive(Default)]
struct CrewTotals {
    output: f64,
    dates: BTreeSet<NaiveDate>,
    billed_output: f64,
    open_tickets: usize,
    approved_tickets: usize,
    approval_days: Vec<f64>,
}

fn tier_for(rank: usize) -> CrewTier {
    match rank {
        1 => CrewTier::Gold,
        2 => CrewTier::Silver,
        3 => CrewTier::Bronze,
        _ => CrewTier::Standard,
    }
}

fn compare_crews(a: &CrewRecord, b: &CrewRecord) -> Ordering {
    b.daily_rate
        .total_cmp(&a.daily_rate)
        .then_with(|| b.total_output.total_cmp(&a.total_output))
        .then_with(|| a.name.cmp(&b.name))
}

pub fn rank_crews(
    catalog: &Catalog,
    selected: &[&Trackable],
    records: &[Record],
    tickets: &[Record],
    lookup: &IdentityLookup,
    filter: &DateFilter,
) -> Vec<CrewRecord> {
    let (Some(constructed), daily_complete) = (
        catalog.constructed(),
        catalog.category(CategoryKind::DailyComplete),
    ) else {
        return Vec::new();
    };

    let mut crews: BTreeMap<String, CrewTotals> = BTreeMap::new();
    let mut unresolved = 0usize;

    for record in records {
        let Some(trackable) = selected.iter().find(|t| t.admits(record)) else {
            continue;
        };
        if !constructed.admits(record, filter) {
            continue;
        }
        let Some(name) = resolve_identity(record, lookup) else {
            unresolved += 1;
            continue;
        };

        let amount = trackable.contribution(record);
        let entry = crews.entry(name).or_default();
        entry.output += amount;
        if let Some(date) = record.activity_date {
            entry.dates.insert(date);
        }
        if daily_complete.is_some_and(|c| c.admits(record, filter)) {
            entry.billed_output += amount;
        }
    }

    for ticket in tickets {
        let Some(status) = ticket.ticket_status else {
            continue;
        };
        if !selected.iter().any(|t| t.id == ticket.trackable_id) {
            continue;
        }
        let Some(name) = resolve_identity(ticket, lookup) else {
            continue;
        };
        let Some(entry) = crews.get_mut(&name) else {
            continue;
        };
        match status {
            TicketStatus::Open => entry.open_tickets += 1,
            TicketStatus::Approved => {
                entry.approved_tickets += 1;
                if let Some(days) = ticket.approval_days.filter(|d| d.is_finite()) {
                    entry.approval_days.push(days);
                }
            }
            TicketStatus::Rejected => {}
        }
    }

    if unresolved > 0 {
        debug!(unresolved, "discarded records without a crew identity");
    }

    let mut ranked: Vec<CrewRecord> = crews
        .into_iter()
        .map(|(name, totals)| {
            let production_days = totals.dates.len();
            CrewRecord {
                name,
                total_output: totals.output,
                production_days,
                daily_rate: ratio(totals.output, production_days as f64),
                open_tickets: totals.open_tickets,
                approved_tickets: totals.approved_tickets,
                avg_approval_days: (!totals.approval_days.is_empty()).then(|| {
                    totals.approval_days.iter().sum::<f64>() / totals.approval_days.len() as f64
                }),
                billing_efficiency_pct: ratio(totals.billed_output, totals.output) * 100.0,
                rank: 0,
                tier: CrewTier::Standard,
            }
        })
        .collect();

    ranked.sort_by(compare_crews);
    for (index, crew) in ranked.iter_mut().enumerate() {
        crew.rank = index + 1;
        crew.tier = tier_for(crew.rank);
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures;

    fn date(d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2026, 5, d)
    }

    fn lookup() -> IdentityLookup {
        let mut lookup = IdentityLookup::default();
        lookup
            .crews
            .insert("C1".to_string(), "North Crew ".to_string());
        lookup
            .crews
            .insert("C2".to_string(), "South Crew".to_string());
        lookup
            .subcontractors
            .insert("SUB1".to_string(), "Acme Crew".to_string());
        lookup
    }

    fn built(value: f64, status: &str, day: u32, crew: Option<&str>, sub: Option<&str>) -> Record {
        Record::new("a", value, status, date(day)).with_crew(crew, sub)
    }

    fn ticket(status: TicketStatus, crew: &str, days: Option<f64>) -> Record {
        let mut record = Record::new("a", 1.0, "QC", date(1)).with_crew(Some(crew), None);
        record.ticket_status = Some(status);
        record.approval_days = days;
        record
    }

    fn rank(records: &[Record], tickets: &[Record]) -> Vec<CrewRecord> {
        let catalog = fixtures::catalog();
        let selected: Vec<&Trackable> = catalog.trackables.iter().collect();
        rank_crews(
            &catalog,
            &selected,
            records,
            tickets,
            &lookup(),
            &DateFilter::All,
        )
    }

    #[test]
    fn subcontractor_fallback_names_the_crew() {
        let records = vec![built(40.0, "CONSTRUCTED", 1, None, Some("SUB1"))];
        let crews = rank(&records, &[]);
        assert_eq!(crews.len(), 1);
        assert_eq!(crews[0].name, "Acme Crew");
        assert_eq!(crews[0].total_output, 40.0);
    }

    #[test]
    fn blank_identity_is_discarded() {
        let records = vec![
            built(40.0, "CONSTRUCTED", 1, Some("  "), None),
            built(40.0, "CONSTRUCTED", 1, None, None),
        ];
        assert!(rank(&records, &[]).is_empty());
    }

    #[test]
    fn unknown_codes_stand_for_themselves() {
        let record = built(1.0, "CONSTRUCTED", 1, Some(" C9 "), Some("SUB1"));
        assert_eq!(resolve_identity(&record, &lookup()), Some("C9".to_string()));
    }

    #[test]
    fn ranks_by_daily_rate_with_quality_and_billing() {
        let records = vec![
            built(100.0, "CONSTRUCTED", 1, Some("C1"), None),
            built(100.0, "INVOICED", 2, Some("C1"), None),
            built(300.0, "DAILY_COMPLETE", 1, Some("C2"), None),
            built(500.0, "DESIGNED", 3, Some("C2"), None),
        ];
        let tickets = vec![
            ticket(TicketStatus::Open, "C1", None),
            ticket(TicketStatus::Approved, "C1", Some(2.0)),
            ticket(TicketStatus::Approved, "C1", Some(4.0)),
            ticket(TicketStatus::Approved, "C1", None),
        ];

        let crews = rank(&records, &tickets);

        assert_eq!(crews[0].name, "South Crew");
        assert_eq!(crews[0].daily_rate, 300.0);
        assert_eq!(crews[0].billing_efficiency_pct, 100.0);
        assert_eq!(crews[0].avg_approval_days, None);
        assert_eq!(crews[0].tier, CrewTier::Gold);

        let north = &crews[1];
        assert_eq!(north.name, "North Crew");
        assert_eq!(north.production_days, 2);
        assert_eq!(north.daily_rate, 100.0);
        assert_eq!(north.open_tickets, 1);
        assert_eq!(north.approved_tickets, 3);
        assert_eq!(north.avg_approval_days, Some(3.0));
        assert_eq!(north.billing_efficiency_pct, 50.0);
        assert_eq!((north.rank, north.tier), (2, CrewTier::Silver));
    }

    #[test]
    fn ties_break_on_output_then_name() {
        let records = vec![
            built(50.0, "CONSTRUCTED", 1, Some("Zed"), None),
            built(50.0, "CONSTRUCTED", 1, Some("Amy"), None),
            built(50.0, "CONSTRUCTED", 1, Some("Bo"), None),
            built(50.0, "CONSTRUCTED", 2, Some("Bo"), None),
            built(10.0, "CONSTRUCTED", 1, Some("Cy"), None),
        ];

        let crews = rank(&records, &[]);
        let names: Vec<&str> = crews.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Bo", "Amy", "Zed", "Cy"]);
        assert_eq!(crews[3].tier, CrewTier::Standard);
        assert_eq!(crews[3].rank, 4);
    }
}
