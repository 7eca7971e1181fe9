use std::sync::Arc;

use clap::Parser;
use supportlens_core::classifier::{create_classifier, GatewayConfig};
use supportlens_core::{db, SupportLensConfig};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use supportlens_server::{http, seed};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "supportlens.toml")]
    config: String,

    /// Run the storage health check and exit
    #[arg(long)]
    health: bool,

    /// Load the seed dataset and exit
    #[arg(long)]
    seed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match SupportLensConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Connect to the store and ensure the schema exists. Bootstrap retries
    // with a bounded fixed delay; exhaustion aborts startup, since every
    // interaction must be durably recorded.
    let pool = match db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to open trace database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = db::bootstrap_schema(&pool, &config.database).await {
        eprintln!(
            "Schema bootstrap failed after {} attempts: {}",
            config.database.bootstrap_max_attempts, e
        );
        std::process::exit(1);
    }

    if args.health {
        if db::health_check(&pool).await {
            println!("✅ trace database reachable");
            return Ok(());
        }
        println!("❌ trace database unreachable");
        std::process::exit(1);
    }

    if args.seed {
        let inserted = seed::seed(&pool).await?;
        println!("Seeded {} traces.", inserted);
        return Ok(());
    }

    // Classification backend, constructed once and injected by handle.
    let classifier: Arc<dyn supportlens_core::ClassifierBackend> =
        Arc::from(create_classifier(GatewayConfig::new(None, &config.classifier)));

    // Shutdown broadcast on Ctrl+C
    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    http::start_http_server(pool, classifier, config, tx.subscribe()).await?;

    Ok(())
}
