//! Lottery Tail-Pair Pipeline
//!
//! Batch entry points, meant to be run from a scheduler: tails and
//! features after each draw, predictions before it, verification after.

use chrono::{Duration, NaiveDate};
use clap::{Parser, Subcommand};
use lottery_bot::{
    config::Config,
    ingester::JsonLinesSource,
    pipeline::{FeatureTarget, Pipeline, RunSummary},
    types::{Station, WeekdayScope},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "lottery-bot")]
#[command(about = "Tail-pair feature, training and settlement pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Import newline-delimited JSON draw records
    Import {
        file: String,
        /// Only records of this date
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Derive tail observations from stored draws
    BuildTails {
        /// Defaults to today
        #[arg(long, conflicts_with = "backfill")]
        date: Option<NaiveDate>,
        /// Every draw still missing its tails
        #[arg(long)]
        backfill: bool,
    },
    /// Build per-pair feature tables
    BuildFeatures {
        /// Defaults to today
        #[arg(long, conflicts_with = "backfill")]
        date: Option<NaiveDate>,
        /// Every date with tail observations
        #[arg(long)]
        backfill: bool,
    },
    /// Train and activate models
    Train {
        /// Station such as XSMB or XSMN/tp-hcm
        #[arg(long, required_unless_present = "all")]
        station: Option<Station>,
        /// `all` or `wd0`..`wd6`; defaults to the station's default scopes
        #[arg(long, value_parser = WeekdayScope::from_key)]
        scope: Option<WeekdayScope>,
        /// Every station in its default scopes
        #[arg(long, conflicts_with = "station")]
        all: bool,
        /// Use the lower row floor
        #[arg(long)]
        force: bool,
    },
    /// Predict the top pairs of every station drawing on a date
    Predict {
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Settle predictions against realized results
    Verify {
        /// Without a date, every unsettled prediction up to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Send a profit report
    Report {
        /// Defaults to six days before --to
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Defaults to today
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Evaluate retrain triggers
    CheckTraining {
        /// Train the flagged station/scopes
        #[arg(long)]
        train: bool,
        #[arg(long)]
        force: bool,
    },
    /// Delete old deprecated model artifacts
    CleanupModels {
        #[arg(long)]
        dry_run: bool,
    },
    /// Show active models
    Models,
    /// Test Telegram notification
    TestNotify,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;
    let pipeline = Pipeline::from_config(config).await?;
    let today = pipeline.today();

    let summary = match cli.command {
        Commands::Import { file, date } => {
            pipeline.import(&JsonLinesSource::new(file), date).await?
        }
        Commands::BuildTails { date, backfill } => {
            let date = if backfill { None } else { Some(date.unwrap_or(today)) };
            pipeline.build_tails(date).await?
        }
        Commands::BuildFeatures { date, backfill } => {
            let target = if backfill {
                FeatureTarget::Backfill
            } else {
                FeatureTarget::Date(date.unwrap_or(today))
            };
            pipeline.build_features(target).await?
        }
        Commands::Train {
            station,
            scope,
            all,
            force,
        } => {
            let station = if all { None } else { station };
            let targets = pipeline.training_targets(station.as_ref(), scope);
            pipeline.train(&targets, force).await?
        }
        Commands::Predict { date } => pipeline.predict(date).await?,
        Commands::Verify { date } => pipeline.verify(date).await?,
        Commands::Report { from, to } => {
            let to = to.unwrap_or(today);
            let from = from.unwrap_or(to - Duration::days(6));
            let report = pipeline.report(from, to).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }
        Commands::CheckTraining { train, force } => pipeline.check_training(train, force).await?,
        Commands::CleanupModels { dry_run } => pipeline.cleanup_models(dry_run).await?,
        Commands::Models => return show_models(&pipeline).await,
        Commands::TestNotify => return test_notify(&pipeline).await,
    };

    print_summary(&summary);
    if summary.has_failures() {
        anyhow::bail!("{} station(s) failed", summary.failed());
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("\n📋 {}\n", summary.step);
    for outcome in &summary.outcomes {
        println!("  {:<32} {:?}: {}", outcome.label, outcome.status, outcome.detail);
    }
    for (name, value) in &summary.counters {
        println!("  {}: {}", name, value);
    }
}

async fn show_models(pipeline: &Pipeline) -> anyhow::Result<()> {
    let models = pipeline.db().active_models().await?;

    println!("\n📦 Active models:\n");
    println!(
        "{:<20} {:<6} {:<24} {:>6} {:>7} {:>12}",
        "Station", "Scope", "Version", "AUC", "Hit@k", "Trained to"
    );
    println!("{}", "-".repeat(80));
    for m in models {
        println!(
            "{:<20} {:<6} {:<24} {:>6.3} {:>6.1}% {:>12}",
            m.station.to_string(),
            m.scope.as_key(),
            m.version,
            m.metric_auc,
            m.metric_hit_rate * 100.0,
            m.train_end
        );
    }
    Ok(())
}

async fn test_notify(pipeline: &Pipeline) -> anyhow::Result<()> {
    if !pipeline.notifier().is_enabled() {
        anyhow::bail!("Telegram not configured in config.toml");
    }

    pipeline
        .notifier()
        .send("🧪 <b>Test Notification</b>\n\nIf you see this, Telegram integration is working!")
        .await?;

    println!("✅ Test notification sent!");
    Ok(())
}
