use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::warn;

mod builder;
mod db;
mod engine;
mod file_store;
mod models;
mod store;
mod timing;

use engine::{NoZoneConfig, PulseEngine};
use file_store::FileStore;
use models::{PulseModel, SignalInput, SignalKind, SlotWindow};
use store::PulseStore;

#[derive(Parser)]
#[command(name = "pulse-engine")]
#[command(about = "Windowed signal aggregation engine for Main Street Pulse", long_about = None)]
struct Cli {
    /// Store data as per-tenant JSON documents under this directory
    /// instead of the shared Postgres backend.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Tenant identifier. Required with --data-dir.
    #[arg(long, global = true)]
    tenant: Option<String>,

    /// Default UTC offset for slot resolution, e.g. -05:00.
    #[arg(long, global = true, default_value = "+00:00")]
    utc_offset: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the shared-backend schema
    InitDb,
    /// Load demo signals for a sample town scope
    Seed,
    /// Import signals for one scope from a CSV file
    Record {
        #[arg(long)]
        scope: String,
        #[arg(long, default_value = "mixed")]
        category: String,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print the current model for a scope, recomputing if stale
    Model {
        #[arg(long)]
        scope: String,
    },
    /// Force a recompute for a scope
    Recompute {
        #[arg(long)]
        scope: String,
        #[arg(long)]
        range_days: Option<i64>,
    },
    /// Recompute every recently-active scope
    Batch {
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },
    /// Build a posting-time model from a CSV of post metrics
    Timing {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mainstreet_pulse_engine=info".into()),
        )
        .init();

    let Cli {
        data_dir,
        tenant,
        utc_offset,
        command,
    } = Cli::parse();
    let default_zone: FixedOffset = utc_offset
        .parse()
        .with_context(|| format!("invalid --utc-offset {utc_offset:?}"))?;
    let data_dir = data_dir.as_deref();
    let tenant = tenant.as_deref();

    match command {
        Commands::InitDb => {
            let pool = connect_pool().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Timing { csv } => {
            run_timing(&csv, default_zone)?;
        }
        Commands::Seed => {
            let engine = open_engine(data_dir, tenant, default_zone).await?;
            let written = seed(&engine).await?;
            println!("Seeded {written} demo signals for town:riverton.");
        }
        Commands::Record {
            scope,
            category,
            csv,
        } => {
            let engine = open_engine(data_dir, tenant, default_zone).await?;
            let inputs = read_signal_csv(&csv)?;
            let written = engine.record_signals(&scope, &category, &inputs).await?;
            println!("Recorded {written} signals for {scope}.");
        }
        Commands::Model { scope } => {
            let engine = open_engine(data_dir, tenant, default_zone).await?;
            let model = engine.get_model(&scope).await?;
            print_model(&scope, &model);
        }
        Commands::Recompute { scope, range_days } => {
            let engine = open_engine(data_dir, tenant, default_zone).await?;
            let model = engine.recompute(&scope, range_days).await?;
            print_model(&scope, &model);
        }
        Commands::Batch { limit } => {
            let engine = open_engine(data_dir, tenant, default_zone).await?;
            let outcome = engine.recompute_recent(limit).await?;
            println!(
                "Recomputed {} scopes ({} failed).",
                outcome.recomputed, outcome.failed
            );
        }
    }

    Ok(())
}

async fn connect_pool() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set for the shared Postgres backend")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn open_engine(
    data_dir: Option<&Path>,
    tenant: Option<&str>,
    default_zone: FixedOffset,
) -> anyhow::Result<PulseEngine> {
    let store: Arc<dyn PulseStore> = if let Some(data_dir) = data_dir {
        let tenant = tenant.context("--tenant is required with --data-dir")?;
        Arc::new(FileStore::open(data_dir, tenant)?)
    } else {
        let pool = connect_pool().await?;
        Arc::new(db::PgStore::new(pool, tenant.unwrap_or("default")))
    };

    Ok(PulseEngine::new(store, Arc::new(NoZoneConfig), default_zone))
}

fn read_signal_csv(csv_path: &PathBuf) -> anyhow::Result<Vec<SignalInput>> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        kind: String,
        weight: Option<f64>,
        occurred_at: Option<DateTime<Utc>>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inputs = Vec::new();

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let Some(kind) = SignalKind::parse(&row.kind) else {
            warn!(kind = %row.kind, "skipping row with unknown signal kind");
            continue;
        };
        inputs.push(SignalInput {
            kind,
            weight: row.weight,
            occurred_at: row.occurred_at,
        });
    }

    Ok(inputs)
}

fn run_timing(csv_path: &PathBuf, zone: FixedOffset) -> anyhow::Result<()> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut posts = Vec::new();
    for result in reader.deserialize::<models::PostPerformance>() {
        posts.push(result?);
    }

    let model = timing::build_timing_model(&posts, zone, Utc::now());
    let local_now = Utc::now().with_timezone(&zone);
    let (recommend, confidence) = timing::post_now_recommendation(&model, local_now);

    println!(
        "Best time: {} (from {} posts)",
        model.best_time_label, model.sample_size
    );
    println!(
        "Best hours: {}",
        model
            .best_hours
            .iter()
            .map(|h| format!("{h:02}:00"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "Post now? {} (confidence {:.2})",
        if recommend { "yes" } else { "not yet" },
        confidence
    );
    Ok(())
}

async fn seed(engine: &PulseEngine) -> anyhow::Result<usize> {
    let now = Utc::now();
    let mut written = 0usize;

    // A few weeks of plausible cafe traffic: busy Friday evenings and
    // Saturday mornings, slow Tuesday afternoons, one street fair.
    let mut cafe = Vec::new();
    for week in 0..3i64 {
        cafe.push(at(SignalKind::Busy, 2.0, now - Duration::days(2 + week * 7)));
        cafe.push(at(SignalKind::Busy, 1.5, now - Duration::days(4 + week * 7)));
        cafe.push(at(SignalKind::Slow, 1.0, now - Duration::days(5 + week * 7)));
        cafe.push(at(SignalKind::PostSuccess, 1.2, now - Duration::days(3 + week * 7)));
    }
    written += engine.record_signals("town:riverton", "cafe", &cafe).await?;

    let events = vec![
        at(SignalKind::EventSpike, 5.0, now - Duration::days(6)),
        at(SignalKind::EventSpike, 4.0, now - Duration::days(13)),
    ];
    written += engine
        .record_signals("town:riverton", "mixed", &events)
        .await?;

    let retail = vec![
        at(SignalKind::Busy, 1.0, now - Duration::days(1)),
        at(SignalKind::Slow, 0.8, now - Duration::days(8)),
    ];
    written += engine
        .record_signals("town:riverton", "retail", &retail)
        .await?;

    Ok(written)
}

fn at(kind: SignalKind, weight: f64, occurred_at: DateTime<Utc>) -> SignalInput {
    SignalInput {
        kind,
        weight: Some(weight),
        occurred_at: Some(occurred_at),
    }
}

fn print_model(scope: &str, model: &PulseModel) {
    println!("Pulse model for {scope} (computed {})", model.computed_at);
    println!("Busy windows: {}", format_windows(&model.busy_windows));
    println!("Slow windows: {}", format_windows(&model.slow_windows));
    println!("Event energy: {}", model.event_energy.as_str());

    if model.category_trends.is_empty() {
        println!("Category trends: none yet");
    } else {
        let trends: Vec<String> = model
            .category_trends
            .iter()
            .map(|t| format!("{} {}", t.category, t.trend.as_str()))
            .collect();
        println!("Category trends: {}", trends.join(", "));
    }

    println!("Seasonal: {}", model.seasonal_notes);
}

fn format_windows(windows: &[SlotWindow]) -> String {
    if windows.is_empty() {
        return "none yet".to_string();
    }
    windows
        .iter()
        .map(|w| {
            let day = timing::DAY_NAMES
                .get(w.day_of_week as usize)
                .copied()
                .unwrap_or("?");
            format!("{} {:02}:00", day, w.hour)
        })
        .collect::<Vec<_>>()
        .join(", ")
}
