//! SafeSender Relay Service
//!
//! Anonymous end-to-end encrypted message relay. Clients encrypt in the
//! browser; this service only holds opaque envelopes until they are read
//! once or expire.

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use clap::Parser;
use safesender_relay::{Relay, Sweeper};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod api;
mod config;
mod error;

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "safesender-service")]
#[command(about = "SafeSender anonymous encrypted message relay")]
struct Args {
    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "5000")]
    port: u16,

    /// Relay settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Application state
pub struct AppState {
    pub relay: Arc<Relay>,
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let relay_config = config::load_relay_config(args.config.as_deref())?;
    let body_limit = config::json_body_limit(&relay_config);
    info!(
        message_lifetime_minutes = relay_config.message_lifetime_minutes(),
        sweep_interval_secs = relay_config.sweep_interval_secs,
        "Starting SafeSender relay"
    );

    let relay = Arc::new(Relay::new(relay_config)?);
    let app_state = web::Data::new(AppState {
        relay: Arc::clone(&relay),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Sweeper::new(Arc::clone(&relay)).spawn(shutdown_rx);

    info!("Binding to {}:{}", args.host, args.port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .app_data(api::json_config(body_limit))
            .wrap(cors)
            // no remote address or path: both can identify a user
            .wrap(middleware::Logger::new("%{METHOD}xi %s %b %Dms").custom_request_replace(
                "METHOD",
                |req| req.method().to_string(),
            ))
            .configure(api::configure)
    })
    .bind((args.host.as_str(), args.port))?
    .run()
    .await?;

    info!("HTTP server stopped, shutting down sweeper");
    let _ = shutdown_tx.send(true);
    sweeper.await?;

    Ok(())
}
