use std::time::Duration;

use relay_server::config::{generate_config_template, Config};
use relay_server::server;
use relay_server::shutdown::Coordinator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "relay_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "relay_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("relay server v{} starting", env!("CARGO_PKG_VERSION"));

    // Bind the listener and start the dispatcher; bind failure is fatal.
    let relay = server::start(&config).await?;
    let events = relay.events.clone();

    let coordinator = Coordinator::new(events, Duration::from_secs(config.shutdown_grace_secs));

    // Serve until either the accept loop fails or the shutdown
    // coordinator finishes its grace period.
    tokio::select! {
        res = relay.accept_loop() => {
            res?;
        }
        _ = coordinator.run() => {}
    }

    tracing::info!("relay server exiting");
    Ok(())
}
