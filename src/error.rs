use chrono::NaiveDate;

/// Conditions that stop a report run before any computation starts.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EngineError {
    #[error("no trackables selected")]
    NoTrackablesSelected,
    #[error("trackable `{0}` is not in the catalog")]
    UnknownTrackable(String),
    #[error("a date range is required unless the report covers all time")]
    MissingDateRange,
    #[error("date range starts on {start} but ends on {end}")]
    InvertedDateRange { start: NaiveDate, end: NaiveDate },
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Divides, returning 0 when the denominator is zero or the result is not finite.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let value = numerator / denominator;
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
