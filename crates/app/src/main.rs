use std::sync::Arc;

use gateway::{HttpGateway, HttpGatewayConfig, InMemoryResultCache, SessionGateway, StaticToken};
use services::{Clock, ResultsService, RuntimeSettings, SessionRuntime};
use tracing_subscriber::EnvFilter;

mod config;
mod console;

use config::{AppConfig, Command, print_usage};

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout belongs to the session prompts
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if matches!(
        argv.first().map(String::as_str),
        Some("--help" | "-h" | "help")
    ) {
        print_usage();
        return Ok(());
    }

    let config = AppConfig::from_env(argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    init_tracing(&config.log_filter);
    tracing::debug!(api = %config.api_url, "configuration resolved");

    let auth = Arc::new(StaticToken::new(config.token.clone()));
    let gateway: Arc<dyn SessionGateway> = Arc::new(HttpGateway::new(
        HttpGatewayConfig::new(config.api_url.clone()),
        auth.clone(),
    )?);
    let cache = Arc::new(InMemoryResultCache::new());

    let outcome = match config.command {
        Command::Run(session) => {
            let runtime =
                SessionRuntime::new(gateway, cache, RuntimeSettings::default(), Clock::default());
            console::run_session(&runtime, session).await
        }
        Command::Results { session_id, mode } => {
            let results = ResultsService::new(gateway, cache);
            match results.result(&session_id, mode).await {
                Ok(result) => {
                    console::print_result(&result);
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        }
    };

    if auth.was_rejected() {
        eprintln!("the server rejected the configured token; check ASSESS_TOKEN or --token");
    }
    outcome
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
