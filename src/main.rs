use leaderboard::{run_ingestion, run_viewer, AppConfig, AppState, RedisStore};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Logs go to stderr so they never interleave with viewer frames
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leaderboard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = AppConfig::from_env();
    info!(?config, "Starting leaderboard");

    let store = match RedisStore::connect(&config.store).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!(error = %err, "Failed to connect to store");
            std::process::exit(1);
        }
    };
    let state = AppState::from_config(store, &config);

    match std::env::args().nth(1).as_deref() {
        Some("ingest") => {
            let summary = run_ingestion(state, config.ingest).await;
            match serde_json::to_string_pretty(&summary) {
                Ok(json) => println!("{json}"),
                Err(err) => error!(error = %err, "Failed to serialize ingestion summary"),
            }
        }
        Some("view") | None => {
            let input = BufReader::new(tokio::io::stdin());
            let mut output = tokio::io::stdout();
            if let Err(err) = run_viewer(state.reader, config.viewer, input, &mut output).await {
                error!(error = %err, "Viewer failed");
                std::process::exit(1);
            }
        }
        Some(other) => {
            eprintln!("unknown command '{other}', expected 'view' or 'ingest'");
            std::process::exit(2);
        }
    }
}
