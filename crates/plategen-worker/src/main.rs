//! Asset generation worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use plategen_backend::{HttpMediaClient, HttpPlanner, VideoBackend};
use plategen_queue::{ClaimConfig, JobQueue, RedisClaims, StatusStore};
use plategen_worker::{JobExecutor, ProcessingContext, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("plategen=info".parse().unwrap())
        .add_directive("hyper=warn".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting plategen-worker");

    // Load configuration
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    // One backend client per worker process, shared by reference
    let media_client = match HttpMediaClient::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Failed to create media backend client: {}", e);
            std::process::exit(1);
        }
    };
    let planner = match HttpPlanner::from_env() {
        Ok(p) => Arc::new(p),
        Err(e) => {
            error!("Failed to create planner client: {}", e);
            std::process::exit(1);
        }
    };

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };
    let claims = match RedisClaims::new(ClaimConfig::from_env()) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Failed to create claim store: {}", e);
            std::process::exit(1);
        }
    };
    let status = match StatusStore::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create status store: {}", e);
            std::process::exit(1);
        }
    };

    let ctx = ProcessingContext::new(
        config.clone(),
        media_client.clone(),
        media_client as Arc<dyn VideoBackend>,
        planner,
    );

    let executor = JobExecutor::new(config, queue, ctx, claims, status);

    // Setup signal handlers
    let shutdown_handle = tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
    });

    // Run executor
    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    // Wait for shutdown
    shutdown_handle.await.ok();

    info!("Worker shutdown complete");
}
