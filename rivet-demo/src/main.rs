use std::time::Duration;

use rivet_core::{init_tracing_with, LogFormat, RivetConfig};
use tracing::{error, info};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "rivet-demo failed");
        eprintln!("rivet-demo: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = RivetConfig::load("dev")?;
    let format = match config.get_or("logging.format", String::from("pretty"))?.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Pretty,
    };
    init_tracing_with(format);
    info!(profile = config.profile(), "Configuration loaded");

    let assembled = rivet_demo::build(&config)?;

    let limiter = assembled.limiter.clone();
    let cache = assembled.cache.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            limiter.purge_expired(PURGE_INTERVAL);
            cache.evict_expired();
        }
    });

    let addr = format!("0.0.0.0:{}", config.server_port()?);
    assembled.app.serve(&addr).await
}
