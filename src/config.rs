use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, DateFilter, Trackable};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DateRange {
    AllTime,
    Between { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(EngineError::InvertedDateRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConfig {
    /// Selected trackable ids. Empty means every trackable in the catalog.
    pub trackable_ids: Vec<String>,
    pub range: Option<DateRange>,
    pub granularity: Granularity,
    pub comparison: Option<(Period, Period)>,
    pub today: NaiveDate,
}

impl ReportConfig {
    /// Checks the configuration against the catalog and resolves the selection.
    /// Repeated ids are kept once, in first-seen order.
    pub fn select<'a>(&self, catalog: &'a Catalog) -> Result<Vec<&'a Trackable>> {
        match self.range {
            None => return Err(EngineError::MissingDateRange),
            Some(DateRange::Between { start, end }) => Period { start, end }.validate()?,
            Some(DateRange::AllTime) => {}
        }
        if let Some((first, second)) = &self.comparison {
            first.validate()?;
            second.validate()?;
        }

        let selected: Vec<&Trackable> = if self.trackable_ids.is_empty() {
            catalog.trackables.iter().collect()
        } else {
            let mut seen = HashSet::new();
            self.trackable_ids
                .iter()
                .filter(|id| seen.insert(id.as_str()))
                .map(|id| {
                    catalog
                        .trackable(id)
                        .ok_or_else(|| EngineError::UnknownTrackable(id.clone()))
                })
                .collect::<Result<_>>()?
        };

        if selected.is_empty() {
            return Err(EngineError::NoTrackablesSelected);
        }
        Ok(selected)
    }

    pub fn filter(&self) -> DateFilter {
        match self.range {
            Some(DateRange::Between { start, end }) => DateFilter::Between { start, end },
            _ => DateFilter::All,
        }
    }

    /// Length of the evaluation window in calendar days; `None` for all time.
    pub fn window_days(&self) -> Option<i64> {
        match self.range {
            Some(DateRange::Between { start, end }) => Some((end - start).num_days()),
            _ => None,
        }
    }

    pub fn explicit_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        match self.range {
            Some(DateRange::Between { start, end }) => Some((start, end)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config(ids: &[&str], range: Option<DateRange>) -> ReportConfig {
        ReportConfig {
            trackable_ids: ids.iter().map(|id| id.to_string()).collect(),
            range,
            granularity: Granularity::Weekly,
            comparison: None,
            today: date(2026, 6, 1),
        }
    }

    #[test]
    fn empty_selection_means_whole_catalog() {
        let catalog = fixtures::catalog();
        let selected = config(&[], Some(DateRange::AllTime))
            .select(&catalog)
            .unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn missing_range_is_a_validation_error() {
        let catalog = fixtures::catalog();
        let err = config(&["a"], None).select(&catalog).unwrap_err();
        assert_eq!(err, EngineError::MissingDateRange);
    }

    #[test]
    fn unknown_trackable_is_rejected() {
        let catalog = fixtures::catalog();
        let err = config(&["zzz"], Some(DateRange::AllTime))
            .select(&catalog)
            .unwrap_err();
        assert_eq!(err, EngineError::UnknownTrackable("zzz".to_string()));
    }

    #[test]
    fn repeated_ids_are_selected_once() {
        let catalog = fixtures::catalog();
        let selected = config(&["b", "a", "b", "a"], Some(DateRange::AllTime))
            .select(&catalog)
            .unwrap();
        let ids: Vec<&str> = selected.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn empty_catalog_has_nothing_to_select() {
        let catalog = Catalog::new(Vec::new());
        let err = config(&[], Some(DateRange::AllTime))
            .select(&catalog)
            .unwrap_err();
        assert_eq!(err, EngineError::NoTrackablesSelected);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let catalog = fixtures::catalog();
        let range = DateRange::Between {
            start: date(2026, 5, 1),
            end: date(2026, 4, 1),
        };
        assert!(matches!(
            config(&["a"], Some(range)).select(&catalog),
            Err(EngineError::InvertedDateRange { .. })
        ));
    }

    #[test]
    fn window_days_follow_range() {
        let range = DateRange::Between {
            start: date(2026, 4, 1),
            end: date(2026, 5, 1),
        };
        assert_eq!(config(&["a"], Some(range)).window_days(), Some(30));
        assert_eq!(config(&["a"], Some(DateRange::AllTime)).window_days(), None);
    }
}
