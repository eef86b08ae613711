use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use shlink_visits::{
    AppConfig, BatchLoader, DateInterval, LoadOptions, ShlinkApiClient, SystemClock, VisitsLoader,
    VisitsQuery, VisitsScope, VisitsStore,
    dates::{days_to_date_range, interval_to_date_range},
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "shlink-visits")]
#[command(about = "Load visits from a Shlink server and summarize them")]
struct Args {
    #[command(subcommand)]
    target: Target,

    /// First day to include (YYYY-MM-DD, local time)
    #[arg(long, global = true, conflicts_with = "interval")]
    start_date: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD, local time)
    #[arg(long, global = true, conflicts_with = "interval")]
    end_date: Option<NaiveDate>,

    /// Named interval, e.g. last7Days or last30Days
    #[arg(long, global = true)]
    interval: Option<DateInterval>,

    /// Skip visits flagged as potential bots
    #[arg(long, global = true)]
    exclude_bots: bool,

    /// Also load the period right before the selected range
    #[arg(long, global = true)]
    prev: bool,

    /// Suggest a wider interval when nothing is found
    #[arg(long, global = true)]
    fallback: bool,
}

#[derive(Subcommand, Debug)]
enum Target {
    /// Visits of one short URL
    ShortUrl {
        short_code: String,
        #[arg(long)]
        domain: Option<String>,
    },
    /// Visits of every short URL with a tag
    Tag { tag: String },
    /// Visits of every short URL in a domain (DEFAULT for the default one)
    Domain { domain: String },
    /// Visits that did not match any short URL
    Orphan,
    /// Visits of every short URL
    NonOrphan,
}

impl Target {
    fn into_scope(self) -> VisitsScope {
        match self {
            Target::ShortUrl { short_code, domain } => VisitsScope::ShortUrl { short_code, domain },
            Target::Tag { tag } => VisitsScope::Tag(tag),
            Target::Domain { domain } => VisitsScope::Domain(domain),
            Target::Orphan => VisitsScope::Orphan,
            Target::NonOrphan => VisitsScope::NonOrphan,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy("shlink_visits=debug");

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(run(args, config))
}

async fn run(args: Args, config: AppConfig) -> Result<()> {
    let date_range = match args.interval {
        Some(interval) => interval_to_date_range(interval, &Local::now()),
        None => days_to_date_range(args.start_date, args.end_date, &Local),
    };
    let query = VisitsQuery {
        date_range,
        exclude_bots: args.exclude_bots,
        orphan_type: None,
    };
    let options = LoadOptions {
        do_interval_fallback: args.fallback,
        load_prev_interval: args.prev,
    };

    let scope = args.target.into_scope();
    tracing::info!("Loading visits for {} from {}", scope, config.server.url);

    let client = ShlinkApiClient::new(&config.server, &config.network)?;
    let loader = VisitsLoader::new(client.scoped(scope.clone()), Arc::new(SystemClock))
        .with_batch_loader(BatchLoader::new(
            config.loading.batch_size,
            config.loading.items_per_page,
        ));
    let store = VisitsStore::new(scope);

    // Ctrl-C stops scheduling further batches; requests in flight still finish
    let cancel_store = store.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Cancellation requested");
            cancel_store.cancel();
        }
    });

    loader.load(query, options, &store).await;

    let state = store.snapshot();
    if let Some(err) = state.error_data {
        anyhow::bail!("Failed to load visits: {}", err);
    }

    let bots = state.visits.iter().filter(|visit| visit.potential_bot).count();
    tracing::info!(
        "Loaded {} visits ({} potential bots){}",
        state.visits.len(),
        bots,
        if state.cancel_load { ", cancelled before completion" } else { "" }
    );
    if let Some(prev_visits) = &state.prev_visits {
        tracing::info!("Previous period: {} visits", prev_visits.len());
    }
    if let Some(latest) = state.visits.first() {
        tracing::info!("Most recent visit: {}", latest.date);
    }
    if let Some(interval) = state.fallback_interval {
        tracing::info!(
            "No visits in range. Most recent visit falls in: {}",
            interval.label().unwrap_or("all time")
        );
    }

    Ok(())
}
