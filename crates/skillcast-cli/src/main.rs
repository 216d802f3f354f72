use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use skillcast_core::{GrowthScore, RegionCode, SeriesKey};
use skillcast_storage::BackoffPolicy;
use skillcast_sync::{file_sources, maybe_build_scheduler, trailing_window, SyncConfig, SyncPipeline};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Debug, Parser)]
#[command(name = "skillcast-cli")]
#[command(about = "Skill demand forecasting command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ingest postings for the trailing window and aggregate them.
    Sync {
        #[arg(long)]
        postings_dir: Option<PathBuf>,
        #[arg(long)]
        days: Option<i64>,
        /// Also forecast every stale series afterwards.
        #[arg(long)]
        forecast: bool,
    },
    /// Forecast one series, or every stale series when no tag is given.
    Forecast {
        #[arg(long, requires = "region")]
        tag: Option<String>,
        #[arg(long)]
        region: Option<String>,
    },
    /// Rank skills to learn next given the ones you have.
    Recommend {
        #[arg(long, value_delimiter = ',')]
        skills: Vec<String>,
        #[arg(long)]
        region: Option<String>,
    },
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run the cron refresh until interrupted.
    Schedule,
}

fn init_tracing() {
    Registry::default()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("skillcast=info")))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Sync {
        postings_dir: None,
        days: None,
        forecast: false,
    }) {
        Commands::Sync {
            postings_dir,
            days,
            forecast,
        } => {
            let pipeline = SyncPipeline::from_sync_config(&config).await?;
            let sources = file_sources(&postings_dir.unwrap_or(config.postings_dir.clone()))?;
            let window = trailing_window(Utc::now(), days.unwrap_or(config.window_days));
            let backoff = BackoffPolicy::default();
            let batch = pipeline.ingest_window(&sources, &window, &backoff).await?;
            let m = &batch.metrics;
            println!(
                "sync complete: run_id={} received={} malformed={} untagged={} clusters={} applied={} late={}",
                batch.run_id, m.received, m.malformed, m.untagged, m.clusters, m.applied, m.late_arrivals
            );
            if forecast {
                let run = backoff
                    .retry("forecast stale series", || pipeline.run_forecasts(None, Utc::now()))
                    .await?;
                pipeline.write_forecast_report(&run).await?;
                println!(
                    "forecast complete: forecasted={} low_confidence={} insufficient={}",
                    run.forecasted.len(),
                    run.low_confidence,
                    run.insufficient_history.len()
                );
            }
        }
        Commands::Forecast { tag, region } => {
            let pipeline = SyncPipeline::from_sync_config(&config).await?;
            let keys = tag.map(|tag| {
                vec![SeriesKey::new(
                    tag,
                    RegionCode::new(region.unwrap_or_default()),
                    pipeline.config().granularity,
                )]
            });
            let run = BackoffPolicy::default()
                .retry("forecast", || pipeline.run_forecasts(keys.clone(), Utc::now()))
                .await?;
            pipeline.write_forecast_report(&run).await?;
            for key in &run.forecasted {
                if let Some(f) = pipeline.latest_forecast(key).await? {
                    let end = f.horizon_end().map(|p| (p.estimate, p.lower, p.upper));
                    println!("{key}: latest={} horizon_end={end:?} quality={:?}", f.latest_observed, f.quality);
                }
            }
            for key in &run.insufficient_history {
                println!("{key}: not yet forecastable");
            }
        }
        Commands::Recommend { skills, region } => {
            anyhow::ensure!(!skills.is_empty(), "pass at least one skill with --skills");
            let pipeline = SyncPipeline::from_sync_config(&config).await?;
            let region = region.map(RegionCode::new);
            let rec = pipeline.recommend(&skills, region.as_ref()).await?;
            for (rank, item) in rec.items.iter().enumerate() {
                let growth = match item.growth {
                    GrowthScore::Ranked(g) => format!("{:+.1}%", g * 100.0),
                    GrowthScore::Unranked => "unranked".to_string(),
                };
                let flag = if item.low_confidence { " (low confidence)" } else { "" };
                println!(
                    "{:>3}. {:<24} growth={growth:<10} projected={:.1}{flag}",
                    rank + 1,
                    item.tag,
                    item.projected
                );
            }
        }
        Commands::Serve { port } => {
            let pipeline = SyncPipeline::from_sync_config(&config).await?;
            let state = skillcast_web::AppState::new(Arc::new(pipeline));
            skillcast_web::serve(state, port.unwrap_or(config.web_port)).await?;
        }
        Commands::Schedule => {
            config.scheduler_enabled = true;
            let pipeline = Arc::new(SyncPipeline::from_sync_config(&config).await?);
            let sched = maybe_build_scheduler(pipeline, &config, BackoffPolicy::default())
                .await?
                .context("scheduler disabled")?;
            sched.start().await.context("starting scheduler")?;
            info!(cron = %config.sync_cron, "scheduler running; ctrl-c to stop");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            info!("scheduler stopping");
        }
    }

    Ok(())
}
