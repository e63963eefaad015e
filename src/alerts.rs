use chrono::NaiveDate;

use crate::catalog::{CategoryKind, Trackable};
use crate::error::ratio;
use crate::metrics::CategoryMetricsTable;
use crate::models::{Alert, Severity, VelocityRecord};

const ON_HOLD_THRESHOLD: f64 = 0.20;
const BILLING_LAG_THRESHOLD: f64 = 0.25;
const TRACKABLE_BILLING_LAG_THRESHOLD: f64 = 0.30;
const MAX_LAGGING_LISTED: usize = 3;
const INVOICE_OPPORTUNITY_THRESHOLD: f64 = 0.40;
const EARLY_STAGE_MIN_WINDOW_DAYS: i64 = 30;
const EARLY_STAGE_THRESHOLD: f64 = 0.10;
const INACTIVITY_WARNING_DAYS: i64 = 30;
const INACTIVITY_INFO_DAYS: i64 = 14;

pub struct AlertContext<'a> {
    pub table: &'a CategoryMetricsTable,
    pub selected: &'a [&'a Trackable],
    pub velocities: &'a [VelocityRecord],
    /// Evaluation window length; `None` for all time.
    pub window_days: Option<i64>,
    pub today: NaiveDate,
}

impl AlertContext<'_> {
    fn value(&self, kind: CategoryKind, trackable: &Trackable) -> f64 {
        self.table.raw_value(kind, &trackable.id)
    }

    fn total(&self, kind: CategoryKind) -> f64 {
        self.table
            .total(kind, self.selected.iter().map(|t| t.id.as_str()))
    }

    fn measured_velocities(&self) -> impl Iterator<Item = &VelocityRecord> {
        self.velocities.iter().filter(|v| v.error.is_none())
    }

    fn trackable_name(&self, id: &str) -> String {
        self.selected
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

pub fn evaluate(ctx: &AlertContext<'_>) -> Vec<Alert> {
    [
        data_quality(ctx),
        high_on_hold(ctx),
        billing_lag(ctx),
        invoice_opportunity(ctx),
        early_stage(ctx),
        inactivity(ctx),
        stalled(ctx),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn data_quality(ctx: &AlertContext<'_>) -> Option<Alert> {
    let over: Vec<String> = ctx
        .selected
        .iter()
        .filter(|t| {
            let designed = ctx.value(CategoryKind::Designed, t);
            designed > 0.0 && ctx.value(CategoryKind::Constructed, t) > designed
        })
        .map(|t| {
            format!(
                "{} ({:.0} constructed vs {:.0} designed)",
                t.name,
                ctx.value(CategoryKind::Constructed, t),
                ctx.value(CategoryKind::Designed, t)
            )
        })
        .collect();

    if over.is_empty() {
        return None;
    }
    Some(Alert::new(
        Severity::Critical,
        "Constructed exceeds designed",
        format!("Check source data for: {}", over.join(", ")),
    ))
}

fn high_on_hold(ctx: &AlertContext<'_>) -> Option<Alert> {
    let share = ratio(ctx.total(CategoryKind::OnHold), ctx.total(CategoryKind::Designed));
    if share <= ON_HOLD_THRESHOLD {
        return None;
    }

    let offenders: Vec<String> = ctx
        .selected
        .iter()
        .filter_map(|t| {
            let pct = ratio(
                ctx.value(CategoryKind::OnHold, t),
                ctx.value(CategoryKind::Designed, t),
            );
            (pct > ON_HOLD_THRESHOLD).then(|| format!("{} ({:.1}%)", t.name, pct * 100.0))
        })
        .collect();

    let mut message = format!("{:.1}% of designed work is on hold.", share * 100.0);
    if !offenders.is_empty() {
        message.push_str(&format!(" Highest: {}", offenders.join(", ")));
    }
    Some(Alert::new(Severity::Warning, "High on-hold volume", message))
}

fn billing_lag(ctx: &AlertContext<'_>) -> Option<Alert> {
    let constructed = ctx.total(CategoryKind::Constructed);
    let daily = ctx.total(CategoryKind::DailyComplete);
    let lag = ratio(constructed - daily, constructed);
    if lag <= BILLING_LAG_THRESHOLD {
        return None;
    }

    let mut gaps: Vec<(f64, &Trackable)> = ctx
        .selected
        .iter()
        .filter_map(|t| {
            let built = ctx.value(CategoryKind::Constructed, t);
            let gap = built - ctx.value(CategoryKind::DailyComplete, t);
            let pct = ratio(gap, built);
            (gap > 0.0 && pct > TRACKABLE_BILLING_LAG_THRESHOLD).then_some((gap, *t))
        })
        .collect();
    gaps.sort_by(|a, b| b.0.total_cmp(&a.0));
    let lagging: Vec<String> = gaps
        .iter()
        .take(MAX_LAGGING_LISTED)
        .map(|(gap, t)| format!("{} ({:.0} {} behind)", t.name, gap, t.unit))
        .collect();

    let mut message = format!(
        "{:.1}% of constructed work is not yet marked daily complete.",
        lag * 100.0
    );
    if !lagging.is_empty() {
        message.push_str(&format!(" Largest gaps: {}", lagging.join(", ")));
    }
    Some(Alert::new(Severity::Warning, "Billing lag", message))
}

fn invoice_opportunity(ctx: &AlertContext<'_>) -> Option<Alert> {
    let ready = ctx.total(CategoryKind::ReadyForDaily);
    let invoiced = ctx.total(CategoryKind::Invoiced);
    let denominator = ready + invoiced;
    if denominator <= 0.0 {
        return None;
    }
    let share = ready / denominator;
    if share <= INVOICE_OPPORTUNITY_THRESHOLD {
        return None;
    }
    Some(Alert::new(
        Severity::Info,
        "Invoice opportunity",
        format!(
            "{:.1}% of billable work is ready for daily completion and not yet invoiced.",
            share * 100.0
        ),
    ))
}

fn early_stage(ctx: &AlertContext<'_>) -> Option<Alert> {
    let long_window = ctx
        .window_days
        .map_or(true, |days| days >= EARLY_STAGE_MIN_WINDOW_DAYS);
    let constructed = ctx.total(CategoryKind::Constructed);
    let designed = ctx.total(CategoryKind::Designed);
    // Nothing designed means there is no stage to report, even though the
    // guarded ratio would read as 0%.
    if !long_window || constructed <= 0.0 || designed <= 0.0 {
        return None;
    }
    let share = constructed / designed;
    if share >= EARLY_STAGE_THRESHOLD {
        return None;
    }
    Some(Alert::new(
        Severity::Info,
        "Early stage",
        format!(
            "Only {:.1}% of designed work has been constructed.",
            share * 100.0
        ),
    ))
}

fn inactivity(ctx: &AlertContext<'_>) -> Option<Alert> {
    let last = ctx
        .measured_velocities()
        .filter_map(|v| v.last_activity_date)
        .max()?;
    let idle = (ctx.today - last).num_days();
    let severity = if idle > INACTIVITY_WARNING_DAYS {
        Severity::Warning
    } else if idle > INACTIVITY_INFO_DAYS {
        Severity::Info
    } else {
        return None;
    };
    Some(Alert::new(
        severity,
        "No recent activity",
        format!("Last recorded construction activity was {idle} days ago ({last})."),
    ))
}

fn stalled(ctx: &AlertContext<'_>) -> Option<Alert> {
    if !ctx.measured_velocities().any(|v| v.velocity > 0.0) {
        return None;
    }
    let stalled: Vec<String> = ctx
        .measured_velocities()
        .filter(|v| v.velocity <= 0.0)
        .map(|v| ctx.trackable_name(&v.trackable_id))
        .collect();
    if stalled.is_empty() {
        return None;
    }
    Some(Alert::new(
        Severity::Info,
        "Stalled work",
        format!("No production recorded for: {}", stalled.join(", ")),
    ))
}
