use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    Approved,
    Rejected,
}

impl TicketStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Some(TicketStatus::Open),
            "APPROVED" => Some(TicketStatus::Approved),
            "REJECTED" => Some(TicketStatus::Rejected),
            _ => None,
        }
    }
}

/// One progress-tracked unit, or a quality ticket when `ticket_status` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub trackable_id: String,
    pub value: f64,
    pub status_code: String,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub feature_class: Option<String>,
    pub activity_date: Option<NaiveDate>,
    #[serde(default)]
    pub crew_key: Option<String>,
    #[serde(default)]
    pub subcontractor_key: Option<String>,
    #[serde(default)]
    pub ticket_status: Option<TicketStatus>,
    #[serde(default)]
    pub approval_days: Option<f64>,
}

impl Record {
    pub fn new(
        trackable_id: &str,
        value: f64,
        status_code: &str,
        activity_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            trackable_id: trackable_id.to_string(),
            value,
            status_code: status_code.to_string(),
            stage: None,
            feature_class: None,
            activity_date,
            crew_key: None,
            subcontractor_key: None,
            ticket_status: None,
            approval_days: None,
        }
    }

    pub fn with_crew(mut self, crew_key: Option<&str>, subcontractor_key: Option<&str>) -> Self {
        self.crew_key = crew_key.map(str::to_string);
        self.subcontractor_key = subcontractor_key.map(str::to_string);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdentityLookup {
    pub crews: HashMap<String, String>,
    pub subcontractors: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedSummary {
    pub construction_pct: f64,
    pub billing_pct: f64,
    pub invoiced_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VelocityRecord {
    pub trackable_id: String,
    pub velocity: f64,
    pub production_days: usize,
    pub total_value: f64,
    pub last_activity_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastResult {
    pub estimated_completion_date: Option<NaiveDate>,
    pub production_days_needed: i64,
    pub calendar_days_needed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum LagStatus {
    FullyComplete,
    #[serde(rename_all = "camelCase")]
    Behind { gap: f64, percent_complete: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingLag {
    pub trackable_id: String,
    pub constructed: f64,
    pub daily_complete: LagStatus,
    pub invoiced: LagStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CrewTier {
    Gold,
    Silver,
    Bronze,
    Standard,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrewRecord {
    pub name: String,
    pub total_output: f64,
    pub production_days: usize,
    pub daily_rate: f64,
    pub open_tickets: usize,
    pub approved_tickets: usize,
    pub avg_approval_days: Option<f64>,
    pub billing_efficiency_pct: f64,
    pub rank: usize,
    pub tier: CrewTier,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSeries {
    pub labels: Vec<String>,
    pub series: BTreeMap<String, Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(severity: Severity, title: &str, message: String) -> Self {
        Self {
            severity,
            title: title.to_string(),
            message,
        }
    }
}
