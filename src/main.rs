use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use progress_insight::catalog::Catalog;
use progress_insight::compare;
use progress_insight::config::{DateRange, Granularity, Period, ReportConfig};
use progress_insight::db;
use progress_insight::report::{self, ReportInputs};

#[derive(Parser)]
#[command(name = "progress-insight")]
#[command(about = "Construction progress analytics: completion, velocity, billing and crews", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ScopeArgs {
    /// Catalog of trackables and categories
    #[arg(long, default_value = "config/catalog.json")]
    catalog: PathBuf,
    /// Trackable id to include; repeat for several, omit for all
    #[arg(long = "trackable")]
    trackables: Vec<String>,
    #[arg(long)]
    start: Option<NaiveDate>,
    #[arg(long)]
    end: Option<NaiveDate>,
    #[arg(long, conflicts_with_all = ["start", "end"])]
    all_time: bool,
    #[arg(long, value_enum, default_value_t = Granularity::Weekly)]
    granularity: Granularity,
    /// Overrides the current date for forecasting and inactivity checks
    #[arg(long)]
    today: Option<NaiveDate>,
}

#[derive(Args)]
struct ComparisonArgs {
    #[arg(long, requires_all = ["p1_end", "p2_start", "p2_end"])]
    p1_start: Option<NaiveDate>,
    #[arg(long, requires_all = ["p1_start", "p2_start", "p2_end"])]
    p1_end: Option<NaiveDate>,
    #[arg(long, requires_all = ["p1_start", "p1_end", "p2_end"])]
    p2_start: Option<NaiveDate>,
    #[arg(long, requires_all = ["p1_start", "p1_end", "p2_start"])]
    p2_end: Option<NaiveDate>,
}

impl ComparisonArgs {
    fn periods(&self) -> Option<(Period, Period)> {
        Some((
            Period {
                start: self.p1_start?,
                end: self.p1_end?,
            },
            Period {
                start: self.p2_start?,
                end: self.p2_end?,
            },
        ))
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import progress records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print weighted completion and the completion forecast
    Summary {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Rank crews by daily production rate
    Crews {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a full progress report
    Report {
        #[command(flatten)]
        scope: ScopeArgs,
        #[command(flatten)]
        comparison: ComparisonArgs,
        #[arg(long, value_enum, default_value_t = Format::Markdown)]
        format: Format,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Compare cumulative progress at the end of two periods
    Compare {
        #[command(flatten)]
        scope: ScopeArgs,
        #[command(flatten)]
        comparison: ComparisonArgs,
    },
}

fn report_config(scope: &ScopeArgs, comparison: Option<(Period, Period)>) -> ReportConfig {
    let today = scope.today.unwrap_or_else(|| Utc::now().date_naive());
    let range = if scope.all_time {
        Some(DateRange::AllTime)
    } else {
        match (scope.start, scope.end) {
            (Some(start), Some(end)) => Some(DateRange::Between { start, end }),
            (Some(start), None) => Some(DateRange::Between { start, end: today }),
            _ => None,
        }
    };

    ReportConfig {
        trackable_ids: scope.trackables.clone(),
        range,
        granularity: scope.granularity,
        comparison,
        today,
    }
}

async fn load_inputs(
    pool: &PgPool,
    catalog: &Catalog,
    config: &ReportConfig,
) -> anyhow::Result<ReportInputs> {
    let ids: Vec<String> = config
        .select(catalog)?
        .iter()
        .map(|t| t.id.clone())
        .collect();

    let (records, failures) = db::fetch_records(pool, &ids).await;
    let tickets = db::fetch_tickets(pool, &ids)
        .await
        .context("failed to load quality tickets")?;
    let lookup = db::fetch_lookups(pool)
        .await
        .context("failed to load crew lookups")?;

    Ok(ReportInputs {
        records,
        tickets,
        lookup,
        failures,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} records from {}.", csv.display());
        }
        Commands::Summary { scope } => {
            let catalog = Catalog::from_path(&scope.catalog)
                .with_context(|| format!("failed to load catalog {}", scope.catalog.display()))?;
            let config = report_config(&scope, None);
            let inputs = load_inputs(&pool, &catalog, &config).await?;
            let report = report::build_report(&config, &catalog, &inputs)?;

            println!("Constructed: {:.1}%", report.summary.construction_pct);
            println!("Daily complete: {:.1}%", report.summary.billing_pct);
            println!("Invoiced: {:.1}%", report.summary.invoiced_pct);
            match report.forecast.and_then(|f| f.estimated_completion_date) {
                Some(date) => println!("Estimated completion: {date}"),
                None => println!("No forecast available."),
            }
            for alert in &report.alerts {
                println!("[{:?}] {}: {}", alert.severity, alert.title, alert.message);
            }
        }
        Commands::Crews { scope, limit } => {
            let catalog = Catalog::from_path(&scope.catalog)
                .with_context(|| format!("failed to load catalog {}", scope.catalog.display()))?;
            let config = report_config(&scope, None);
            let inputs = load_inputs(&pool, &catalog, &config).await?;
            let report = report::build_report(&config, &catalog, &inputs)?;

            if report.crews.is_empty() {
                println!("No crew activity found for this window.");
                return Ok(());
            }

            println!("Top crews by daily rate:");
            for crew in report.crews.iter().take(limit) {
                println!(
                    "{}. {} {:.1}/day across {} production days ({:.1}% billed)",
                    crew.rank,
                    crew.name,
                    crew.daily_rate,
                    crew.production_days,
                    crew.billing_efficiency_pct
                );
            }
        }
        Commands::Report {
            scope,
            comparison,
            format,
            out,
        } => {
            let catalog = Catalog::from_path(&scope.catalog)
                .with_context(|| format!("failed to load catalog {}", scope.catalog.display()))?;
            let config = report_config(&scope, comparison.periods());
            let inputs = load_inputs(&pool, &catalog, &config).await?;
            let report = report::build_report(&config, &catalog, &inputs)?;

            let rendered = match format {
                Format::Markdown => report::render_markdown(&report, &catalog),
                Format::Json => serde_json::to_string_pretty(&report)?,
            };
            std::fs::write(&out, rendered)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Compare { scope, comparison } => {
            let catalog = Catalog::from_path(&scope.catalog)
                .with_context(|| format!("failed to load catalog {}", scope.catalog.display()))?;
            let (first, second) = comparison
                .periods()
                .context("--p1-start, --p1-end, --p2-start and --p2-end are required")?;
            let mut config = report_config(&scope, Some((first, second)));
            config.range.get_or_insert(DateRange::AllTime);
            let selected = config.select(&catalog)?;
            let inputs = load_inputs(&pool, &catalog, &config).await?;
            let result = compare::compare_periods(
                &catalog,
                &selected,
                &inputs.records,
                &inputs.failures,
                &first,
                &second,
            );

            println!(
                "Constructed {:.1}% at {} vs {:.1}% at {}",
                result.first.summary.construction_pct,
                first.end,
                result.second.summary.construction_pct,
                second.end
            );
            for delta in &result.deltas {
                println!(
                    "- {}: {:.0} -> {:.0} ({:+.0}, {:+.1}%)",
                    delta.category.label(),
                    delta.total_p1,
                    delta.total_p2,
                    delta.variance,
                    delta.percent_change
                );
            }
        }
    }

    Ok(())
}
