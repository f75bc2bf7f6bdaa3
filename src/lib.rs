pub mod api;
pub mod clients;
pub mod config;
pub mod db;
pub mod entities;
pub mod extraction;
pub mod models;
pub mod services;
pub mod state;

use tokio::signal;

pub use config::Config;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    config.validate()?;

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        None | Some("serve" | "daemon" | "-d" | "--daemon") => run_server(config).await,
        Some("init" | "--init") => {
            let path = std::path::Path::new("config.toml");
            if path.exists() {
                println!("config.toml already exists");
            } else {
                Config::default().save_to_path(path)?;
                println!("✓ Config file created. Edit config.toml and run again.");
            }
            Ok(())
        }
        Some(other) => {
            print_help();
            anyhow::bail!("Unknown command: {other}")
        }
    }
}

fn print_help() {
    println!("Factura - invoice intake and extraction server");
    println!();
    println!("Usage: factura [command]");
    println!();
    println!("Commands:");
    println!("  serve    Start the API server (default)");
    println!("  init     Create a default config.toml");
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    info!(
        "Factura v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let port = config.server.port;
    let state = api::create_app_state_from_config(config).await?;
    let app = api::router(state).await;

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server running at http://{addr}");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Web server error: {}", e);
        }
    });

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {}", e),
    }

    server_handle.abort();
    info!("Server stopped");

    Ok(())
}
