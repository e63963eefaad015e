use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::models::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationKind {
    Count,
    Sum,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trackable {
    pub id: String,
    pub name: String,
    pub aggregation_kind: AggregationKind,
    #[serde(default)]
    pub source_field: Option<String>,
    /// Required feature class for a record of this trackable to count.
    #[serde(default)]
    pub membership_filter: Option<String>,
    pub project_weight: f64,
    pub unit: String,
}

impl Trackable {
    pub fn admits(&self, record: &Record) -> bool {
        if record.trackable_id != self.id {
            return false;
        }
        match &self.membership_filter {
            Some(required) => record
                .feature_class
                .as_deref()
                .is_some_and(|class| class.trim().eq_ignore_ascii_case(required.trim())),
            None => true,
        }
    }

    pub fn contribution(&self, record: &Record) -> f64 {
        match self.aggregation_kind {
            AggregationKind::Count => 1.0,
            AggregationKind::Sum => record.value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CategoryKind {
    TotalAssigned,
    Designed,
    Constructed,
    ReadyForDaily,
    DailyComplete,
    Invoiced,
    OnHold,
}

impl CategoryKind {
    pub const ALL: [CategoryKind; 7] = [
        CategoryKind::TotalAssigned,
        CategoryKind::Designed,
        CategoryKind::Constructed,
        CategoryKind::ReadyForDaily,
        CategoryKind::DailyComplete,
        CategoryKind::Invoiced,
        CategoryKind::OnHold,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CategoryKind::TotalAssigned => "Total Assigned",
            CategoryKind::Designed => "Designed",
            CategoryKind::Constructed => "Constructed",
            CategoryKind::ReadyForDaily => "Ready For Daily",
            CategoryKind::DailyComplete => "Daily Complete",
            CategoryKind::Invoiced => "Invoiced",
            CategoryKind::OnHold => "On Hold",
        }
    }
}

/// Status membership: inclusion list, exclusion list, or both, optionally
/// AND-ed with a required workflow stage. An empty inclusion list admits
/// every status not excluded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRule {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub required_stage: Option<String>,
}

impl StatusRule {
    pub fn including(statuses: &[&str]) -> Self {
        Self {
            include: statuses.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn excluding(statuses: &[&str]) -> Self {
        Self {
            exclude: statuses.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn matches(&self, status: &str, stage: Option<&str>) -> bool {
        let status = status.trim();
        let listed = |list: &[String]| list.iter().any(|s| s.trim().eq_ignore_ascii_case(status));

        if !self.include.is_empty() && !listed(&self.include) {
            return false;
        }
        if listed(&self.exclude) {
            return false;
        }
        match &self.required_stage {
            Some(required) => {
                stage.is_some_and(|s| s.trim().eq_ignore_ascii_case(required.trim()))
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub kind: CategoryKind,
    pub name: String,
    pub status_rule: StatusRule,
    pub date_sensitive: bool,
}

impl Category {
    pub fn admits(&self, record: &Record, filter: &DateFilter) -> bool {
        if !self
            .status_rule
            .matches(&record.status_code, record.stage.as_deref())
        {
            return false;
        }
        !self.date_sensitive || filter.admits(record.activity_date)
    }
}

/// Activity-date predicate applied to date-sensitive categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    All,
    Between { start: NaiveDate, end: NaiveDate },
    /// Cumulative snapshot: everything on or before the date.
    UpTo(NaiveDate),
}

impl DateFilter {
    pub fn admits(&self, date: Option<NaiveDate>) -> bool {
        match (self, date) {
            (DateFilter::All, _) => true,
            (DateFilter::Between { start, end }, Some(date)) => date >= *start && date <= *end,
            (DateFilter::UpTo(end), Some(date)) => date <= *end,
            (_, None) => false,
        }
    }
}

pub fn standard_categories() -> Vec<Category> {
    let category = |kind: CategoryKind, rule: StatusRule, date_sensitive: bool| Category {
        kind,
        name: kind.label().to_string(),
        status_rule: rule,
        date_sensitive,
    };

    vec![
        category(CategoryKind::TotalAssigned, StatusRule::default(), false),
        category(
            CategoryKind::Designed,
            StatusRule::excluding(&["CANCELLED"]),
            false,
        ),
        category(
            CategoryKind::Constructed,
            StatusRule::including(&["CONSTRUCTED", "READY_FOR_DAILY", "DAILY_COMPLETE", "INVOICED"]),
            true,
        ),
        category(
            CategoryKind::ReadyForDaily,
            StatusRule::including(&["READY_FOR_DAILY"]),
            true,
        ),
        category(
            CategoryKind::DailyComplete,
            StatusRule::including(&["DAILY_COMPLETE", "INVOICED"]),
            true,
        ),
        category(
            CategoryKind::Invoiced,
            StatusRule::including(&["INVOICED"]),
            true,
        ),
        category(CategoryKind::OnHold, StatusRule::including(&["ON_HOLD"]), false),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub trackables: Vec<Trackable>,
    #[serde(default = "standard_categories")]
    pub categories: Vec<Category>,
}

impl Catalog {
    pub fn new(trackables: Vec<Trackable>) -> Self {
        Self {
            trackables,
            categories: standard_categories(),
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let catalog: Catalog = serde_json::from_str(&raw)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for trackable in &self.trackables {
            if !ids.insert(trackable.id.as_str()) {
                return Err(EngineError::InvalidCatalog(format!(
                    "duplicate trackable id `{}`",
                    trackable.id
                )));
            }
            if !(0.0..=1.0).contains(&trackable.project_weight) {
                return Err(EngineError::InvalidCatalog(format!(
                    "trackable `{}` has weight {} outside 0-1",
                    trackable.id, trackable.project_weight
                )));
            }
            if trackable.aggregation_kind == AggregationKind::Sum
                && trackable
                    .source_field
                    .as_deref()
                    .map_or(true, |field| field.trim().is_empty())
            {
                return Err(EngineError::InvalidCatalog(format!(
                    "sum trackable `{}` needs a source field",
                    trackable.id
                )));
            }
        }

        let mut kinds = HashSet::new();
        for category in &self.categories {
            if !kinds.insert(category.kind) {
                return Err(EngineError::InvalidCatalog(format!(
                    "category {} defined twice",
                    category.kind.label()
                )));
            }
        }
        for required in [
            CategoryKind::Designed,
            CategoryKind::Constructed,
            CategoryKind::DailyComplete,
            CategoryKind::Invoiced,
        ] {
            if !kinds.contains(&required) {
                return Err(EngineError::InvalidCatalog(format!(
                    "missing {} category",
                    required.label()
                )));
            }
        }

        Ok(())
    }

    pub fn trackable(&self, id: &str) -> Option<&Trackable> {
        self.trackables.iter().find(|t| t.id == id)
    }

    pub fn category(&self, kind: CategoryKind) -> Option<&Category> {
        self.categories.iter().find(|c| c.kind == kind)
    }

    pub fn constructed(&self) -> Option<&Category> {
        self.category(CategoryKind::Constructed)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::models::Record;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn status_rule_combines_lists_and_stage() {
        let rule = StatusRule {
            include: vec!["CONSTRUCTED".to_string(), "INVOICED".to_string()],
            exclude: vec!["INVOICED".to_string()],
            required_stage: Some("FIELD".to_string()),
        };
        assert!(rule.matches("constructed", Some("field")));
        assert!(!rule.matches("CONSTRUCTED", None));
        assert!(!rule.matches("INVOICED", Some("FIELD")));
        assert!(!rule.matches("DESIGNED", Some("FIELD")));
    }

    #[test]
    fn status_rule_ignores_padding_on_both_sides() {
        let rule = StatusRule {
            include: vec![" CONSTRUCTED ".to_string()],
            exclude: vec!["ON_HOLD ".to_string()],
            required_stage: Some(" FIELD".to_string()),
        };
        assert!(rule.matches("CONSTRUCTED ", Some("field ")));
        assert!(!StatusRule::excluding(&["ON_HOLD "]).matches(" on_hold", None));
    }

    #[test]
    fn date_sensitive_categories_apply_the_window() {
        let catalog = catalog();
        let constructed = catalog.constructed().unwrap();
        let designed = catalog.category(CategoryKind::Designed).unwrap();
        let record = Record::new("a", 10.0, "CONSTRUCTED", Some(date(2026, 3, 10)));
        let window = DateFilter::Between {
            start: date(2026, 3, 1),
            end: date(2026, 3, 5),
        };

        assert!(!constructed.admits(&record, &window));
        assert!(constructed.admits(&record, &DateFilter::UpTo(date(2026, 3, 10))));
        assert!(designed.admits(&record, &window));
    }

    #[test]
    fn undated_records_only_pass_the_unbounded_filter() {
        assert!(DateFilter::All.admits(None));
        assert!(!DateFilter::UpTo(date(2026, 1, 1)).admits(None));
    }

    #[test]
    fn membership_filter_requires_feature_class() {
        let mut aerial = trackable("fiber", 0.5);
        aerial.membership_filter = Some("AERIAL".to_string());
        let mut record = Record::new("fiber", 100.0, "CONSTRUCTED", None);
        assert!(!aerial.admits(&record));
        record.feature_class = Some("aerial".to_string());
        assert!(aerial.admits(&record));
    }

    #[test]
    fn validation_rejects_sum_without_source_field() {
        let mut bad = trackable("a", 0.5);
        bad.source_field = None;
        let err = Catalog::new(vec![bad]).validate().unwrap_err();
        assert!(matches!(err, EngineError::InvalidCatalog(_)));
    }

    #[test]
    fn validation_rejects_duplicate_ids() {
        let catalog = Catalog::new(vec![trackable("a", 0.5), trackable("a", 0.5)]);
        assert!(catalog.validate().is_err());
        assert!(super::fixtures::catalog().validate().is_ok());
    }

    #[test]
    fn categories_default_when_omitted_from_json() {
        let json = r#"{"trackables":[{"id":"vault","name":"Vaults","aggregationKind":"count","projectWeight":0.2,"unit":"ea"}]}"#;
        let catalog: Catalog = serde_json::from_str(json).unwrap();
        assert_eq!(catalog.categories.len(), CategoryKind::ALL.len());
        assert!(catalog.validate().is_ok());
    }
}
