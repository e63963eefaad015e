use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::{Catalog, CategoryKind, DateFilter, Trackable};
use crate::models::Record;

/// One category/trackable aggregate, or the reason it could not be fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricCell {
    #[serde(rename_all = "camelCase")]
    Value { raw_value: f64, count: usize },
    Error { error: String },
}

impl MetricCell {
    fn empty() -> Self {
        MetricCell::Value {
            raw_value: 0.0,
            count: 0,
        }
    }

    pub fn raw_value(&self) -> f64 {
        match self {
            MetricCell::Value { raw_value, .. } => *raw_value,
            MetricCell::Error { .. } => 0.0,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, MetricCell::Error { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFailure {
    pub trackable_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CategoryMetricsTable {
    cells: BTreeMap<CategoryKind, BTreeMap<String, MetricCell>>,
}

impl CategoryMetricsTable {
    /// Aggregates a record batch into every catalog category for the selected
    /// trackables. Date-sensitive categories apply `filter`.
    pub fn build(
        catalog: &Catalog,
        selected: &[&Trackable],
        records: &[Record],
        filter: &DateFilter,
    ) -> Self {
        let mut cells = BTreeMap::new();

        for category in &catalog.categories {
            let mut row: BTreeMap<String, MetricCell> = selected
                .iter()
                .map(|t| (t.id.clone(), MetricCell::empty()))
                .collect();

            for trackable in selected {
                let Some(MetricCell::Value { raw_value, count }) = row.get_mut(&trackable.id)
                else {
                    continue;
                };
                for record in records
                    .iter()
                    .filter(|r| trackable.admits(r) && category.admits(r, filter))
                {
                    *raw_value += trackable.contribution(record);
                    *count += 1;
                }
            }

            cells.insert(category.kind, row);
        }

        debug!(
            categories = cells.len(),
            trackables = selected.len(),
            records = records.len(),
            "built category metrics table"
        );
        Self { cells }
    }

    pub fn set(&mut self, kind: CategoryKind, trackable_id: &str, raw_value: f64, count: usize) {
        self.cells
            .entry(kind)
            .or_default()
            .insert(trackable_id.to_string(), MetricCell::Value { raw_value, count });
    }

    pub fn mark_failed(&mut self, failure: &SourceFailure) {
        warn!(
            trackable = %failure.trackable_id,
            error = %failure.message,
            "record source failed; cells reported as errors"
        );
        for row in self.cells.values_mut() {
            row.insert(
                failure.trackable_id.clone(),
                MetricCell::Error {
                    error: failure.message.clone(),
                },
            );
        }
    }

    pub fn cell(&self, kind: CategoryKind, trackable_id: &str) -> Option<&MetricCell> {
        self.cells.get(&kind).and_then(|row| row.get(trackable_id))
    }

    /// Missing and failed cells read as zero.
    pub fn raw_value(&self, kind: CategoryKind, trackable_id: &str) -> f64 {
        self.cell(kind, trackable_id)
            .map(MetricCell::raw_value)
            .unwrap_or(0.0)
    }

    pub fn total<'a>(&self, kind: CategoryKind, ids: impl IntoIterator<Item = &'a str>) -> f64 {
        ids.into_iter().map(|id| self.raw_value(kind, id)).sum()
    }

    pub fn has_errors(&self) -> bool {
        self.cells
            .values()
            .any(|row| row.values().any(MetricCell::is_error))
    }
}
