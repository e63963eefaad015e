use std::collections::{BTreeSet, HashMap};

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics::SourceFailure;
use crate::models::{IdentityLookup, Record, TicketStatus};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let crews = vec![
        ("CRW-01", "Ridgeline Boring"),
        ("CRW-02", "Valley Splice Team"),
        ("CRW-03", "Northside Aerial"),
    ];
    for (code, name) in crews {
        sqlx::query(
            r#"
            INSERT INTO progress_insight.crews (code, display_name)
            VALUES ($1, $2)
            ON CONFLICT (code) DO UPDATE SET display_name = EXCLUDED.display_name
            "#,
        )
        .bind(code)
        .bind(name)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO progress_insight.subcontractors (code, display_name)
        VALUES ($1, $2)
        ON CONFLICT (code) DO UPDATE SET display_name = EXCLUDED.display_name
        "#,
    )
    .bind("SUB-ACME")
    .bind("Acme Utility Contractors")
    .execute(pool)
    .await?;

    let date = |m: u32, d: u32| NaiveDate::from_ymd_opt(2026, m, d).context("invalid date");
    let records = vec![
        ("seed-001", "underground_fiber", 1200.0, "DESIGNED", Some("UNDERGROUND"), None, None, None),
        ("seed-002", "underground_fiber", 800.0, "DAILY_COMPLETE", Some("UNDERGROUND"), Some(date(3, 2)?), Some("CRW-01"), None),
        ("seed-003", "underground_fiber", 650.0, "READY_FOR_DAILY", Some("UNDERGROUND"), Some(date(3, 4)?), Some("CRW-01"), None),
        ("seed-004", "underground_fiber", 400.0, "ON_HOLD", Some("UNDERGROUND"), None, None, None),
        ("seed-005", "aerial_fiber", 2000.0, "DESIGNED", Some("AERIAL"), None, None, None),
        ("seed-006", "aerial_fiber", 900.0, "INVOICED", Some("AERIAL"), Some(date(2, 20)?), Some("CRW-03"), None),
        ("seed-007", "aerial_fiber", 700.0, "CONSTRUCTED", Some("AERIAL"), Some(date(3, 5)?), None, Some("SUB-ACME")),
        ("seed-008", "vaults", 1.0, "INVOICED", None, Some(date(2, 18)?), Some("CRW-02"), None),
        ("seed-009", "vaults", 1.0, "DAILY_COMPLETE", None, Some(date(2, 25)?), Some("CRW-02"), None),
        ("seed-010", "vaults", 1.0, "DESIGNED", None, None, None, None),
        ("seed-011", "drops", 1.0, "DESIGNED", None, None, None, None),
    ];

    for (source_key, trackable_id, value, status, feature_class, activity_date, crew, sub) in records
    {
        sqlx::query(
            r#"
            INSERT INTO progress_insight.records
            (id, trackable_id, value, status_code, feature_class, activity_date,
             crew_key, subcontractor_key, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(trackable_id)
        .bind(value)
        .bind(status)
        .bind(feature_class)
        .bind(activity_date)
        .bind(crew)
        .bind(sub)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    let tickets = vec![
        ("seed-qc-001", "underground_fiber", "CRW-01", "APPROVED", Some(3.0)),
        ("seed-qc-002", "underground_fiber", "CRW-01", "OPEN", None),
        ("seed-qc-003", "vaults", "CRW-02", "APPROVED", Some(1.5)),
    ];
    for (source_key, trackable_id, crew, status, approval_days) in tickets {
        sqlx::query(
            r#"
            INSERT INTO progress_insight.quality_tickets
            (id, trackable_id, crew_key, ticket_status, approval_days, source_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(trackable_id)
        .bind(crew)
        .bind(status)
        .bind(approval_days)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

fn record_from_row(row: &PgRow) -> Record {
    Record {
        trackable_id: row.get("trackable_id"),
        value: row.get("value"),
        status_code: row.get("status_code"),
        stage: row.get("stage"),
        feature_class: row.get("feature_class"),
        activity_date: row.get("activity_date"),
        crew_key: row.get("crew_key"),
        subcontractor_key: row.get("subcontractor_key"),
        ticket_status: None,
        approval_days: None,
    }
}

async fn fetch_trackable(pool: &PgPool, trackable_id: &str) -> anyhow::Result<Vec<Record>> {
    let rows = sqlx::query(
        "SELECT trackable_id, value, status_code, stage, feature_class, activity_date, \
         crew_key, subcontractor_key \
         FROM progress_insight.records \
         WHERE trackable_id = $1",
    )
    .bind(trackable_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(record_from_row).collect())
}

/// Fetches every selected trackable concurrently. A failed fetch is reported
/// per trackable instead of failing the batch.
pub async fn fetch_records(
    pool: &PgPool,
    trackable_ids: &[String],
) -> (Vec<Record>, Vec<SourceFailure>) {
    let mut tasks = JoinSet::new();
    for id in trackable_ids {
        let pool = pool.clone();
        let id = id.clone();
        tasks.spawn(async move {
            let result = fetch_trackable(&pool, &id).await;
            (id, result)
        });
    }

    let mut pending: BTreeSet<String> = trackable_ids.iter().cloned().collect();
    let mut records = Vec::new();
    let mut failures = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((id, Ok(batch))) => {
                debug!(trackable = %id, records = batch.len(), "fetched records");
                pending.remove(&id);
                records.extend(batch);
            }
            Ok((id, Err(err))) => {
                pending.remove(&id);
                failures.push(SourceFailure {
                    trackable_id: id,
                    message: format!("{err:#}"),
                });
            }
            Err(err) => warn!(error = %err, "record fetch task did not complete"),
        }
    }

    failures.extend(pending.into_iter().map(|trackable_id| SourceFailure {
        trackable_id,
        message: "fetch task did not complete".to_string(),
    }));
    (records, failures)
}

pub async fn fetch_tickets(pool: &PgPool, trackable_ids: &[String]) -> anyhow::Result<Vec<Record>> {
    let rows = sqlx::query(
        "SELECT trackable_id, crew_key, subcontractor_key, ticket_status, approval_days, opened_on \
         FROM progress_insight.quality_tickets \
         WHERE trackable_id = ANY($1)",
    )
    .bind(trackable_ids)
    .fetch_all(pool)
    .await?;

    let mut tickets = Vec::new();
    for row in rows {
        let status: String = row.get("ticket_status");
        let mut ticket = Record::new(
            row.get::<String, _>("trackable_id").as_str(),
            1.0,
            &status,
            row.get("opened_on"),
        )
        .with_crew(
            row.get::<Option<String>, _>("crew_key").as_deref(),
            row.get::<Option<String>, _>("subcontractor_key").as_deref(),
        );
        ticket.ticket_status = TicketStatus::parse(&status);
        ticket.approval_days = row.get("approval_days");
        tickets.push(ticket);
    }

    Ok(tickets)
}

async fn fetch_names(pool: &PgPool, table: &str) -> anyhow::Result<HashMap<String, String>> {
    let rows = sqlx::query(&format!(
        "SELECT code, display_name FROM progress_insight.{table}"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("code"), row.get("display_name")))
        .collect())
}

pub async fn fetch_lookups(pool: &PgPool) -> anyhow::Result<IdentityLookup> {
    Ok(IdentityLookup {
        crews: fetch_names(pool, "crews").await?,
        subcontractors: fetch_names(pool, "subcontractors").await?,
    })
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        trackable_id: String,
        value: f64,
        status_code: String,
        stage: Option<String>,
        feature_class: Option<String>,
        activity_date: Option<NaiveDate>,
        crew_key: Option<String>,
        subcontractor_key: Option<String>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO progress_insight.records
            (id, trackable_id, value, status_code, stage, feature_class, activity_date,
             crew_key, subcontractor_key, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.trackable_id)
        .bind(row.value)
        .bind(&row.status_code)
        .bind(&row.stage)
        .bind(&row.feature_class)
        .bind(row.activity_date)
        .bind(&row.crew_key)
        .bind(&row.subcontractor_key)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
