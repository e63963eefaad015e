//! Progress analytics for multi-stage construction projects: weighted
//! completion, production velocity and forecasting, billing lag, crew
//! rankings, alerts, cumulative timelines and period comparisons.
//!
//! Engine modules are pure functions over caller-supplied records. The `db`
//! module is the Postgres record source used by the command-line tool.

pub mod alerts;
pub mod billing;
pub mod catalog;
pub mod compare;
pub mod config;
pub mod crew;
pub mod db;
pub mod error;
pub mod metrics;
pub mod models;
pub mod progress;
pub mod report;
pub mod timeline;
pub mod velocity;
