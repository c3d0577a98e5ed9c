//! Glazebid pipeline worker binary.
//!
//! Usage:
//!     glazebid-worker [--worker-id worker-1] [--mode full|render_only]
//!
//! Configuration comes from the environment (see `config.rs`); the few
//! CLI flags exist for overriding the worker identity in compose files.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use glazebid_worker::config::WorkerMode;
use glazebid_worker::pdf::PdfiumEngine;
use glazebid_worker::scheduler::Scheduler;
use glazebid_worker::storage::S3Store;
use glazebid_worker::{Config, WorkerContext};

#[derive(Parser, Debug)]
#[command(name = "glazebid-worker", about = "Glazebid document pipeline worker")]
struct Args {
    /// Worker identity recorded on locks and heartbeats.
    #[arg(long, env = "WORKER_ID")]
    worker_id: Option<String>,

    /// Operating mode: full or render_only.
    #[arg(long, env = "WORKER_MODE")]
    mode: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "glazebid_worker=info,glazebid_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(worker_id) = args.worker_id {
        config.worker_id = worker_id;
    }
    if let Some(mode) = args.mode {
        config.worker_mode = WorkerMode::from_env_value(&mode);
    }

    // Unrecoverable startup failures exit non-zero; everything after
    // startup is retried from the loop.
    let db_config = glazebid_db::DbConfig::from_url(&config.database_url)
        .context("invalid DATABASE_URL")?;
    let pool = glazebid_db::create_pool(&db_config)
        .await
        .context("could not open database")?;

    let pdf = PdfiumEngine::new().context("could not bind pdfium library")?;
    let store = S3Store::new(&config);

    let ctx = WorkerContext::new(config, pool, Arc::new(store), Arc::new(pdf));
    let mut scheduler = Scheduler::new(ctx);
    scheduler.install_signal_handlers();
    scheduler.startup().await.context("worker startup failed")?;
    scheduler.run().await;

    Ok(())
}
