//! smtproxy: SMTP-to-HTTP bridge
//!
//! Accepts mail over SMTP and relays each message to a transactional mail
//! provider's HTTPS JSON API.
//!
//! # Architecture
//!
//! - [`main`]: process entry point; loads config, wires providers, runs the
//!   server until `SIGINT`/`SIGTERM`.
//! - [`config`]: environment-driven configuration for the listener, auth
//!   table, and provider credentials.
//! - [`errors`]: the `AppError` hierarchy and its SMTP reply-code mapping.
//! - [`model`]: the neutral message model parser and providers share.
//! - [`parser`]: RFC 5322/MIME parsing into the neutral model.
//! - [`provider`]: the `Provider` trait and the HTTPS/JSON reference
//!   implementation.
//! - [`registry`]: concurrent name-indexed provider lookup with a default.
//! - [`dispatch`]: logging and upstream error translation around registry
//!   sends.
//! - [`session`]: the per-connection SMTP verb state machine.
//! - [`framing`]: connection acceptance, line framing, and SMTP replies.

mod config;
mod dispatch;
mod errors;
mod framing;
mod model;
mod parser;
mod provider;
mod registry;
mod session;

use std::sync::Arc;

use config::Config;
use framing::{Backend, Server};
use provider::http::{HttpProvider, HttpProviderConfig};
use provider::Provider;
use registry::Registry;
use session::SessionConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// Loads `.env` if present, initialises `tracing` from `LOG_LEVEL`/
/// `RUST_LOG`, loads [`Config`], builds and registers the configured
/// providers, then runs the SMTP server until a shutdown signal arrives.
///
/// # Environment Variables
///
/// See [`Config::load_from_env`] for the full configuration surface.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level_directive()))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load_from_env()?;
    let registry = build_registry(&config)?;

    let session_config = SessionConfig::from_config(&config, registry);
    let backend = Backend::new(session_config, config.smtp_domain.clone(), config.allow_insecure_auth);
    let server = Arc::new(Server::new(&config, backend));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received");
        signal_token.cancel();
    });

    server.run(shutdown).await?;
    Ok(())
}

fn build_registry(config: &Config) -> Result<Registry, Box<dyn std::error::Error>> {
    let registry = Registry::new();
    for provider_config in &config.enabled_providers {
        let provider: Arc<dyn Provider> = Arc::new(HttpProvider::new(HttpProviderConfig {
            name: provider_config.name.clone(),
            api_key: provider_config.api_key.clone(),
            base_url: provider_config.base_url.clone(),
            timeout: provider_config.timeout,
        })?);
        registry.register(provider)?;
    }
    if !config.default_provider.is_empty() {
        registry.set_default(&config.default_provider)?;
    }
    Ok(registry)
}

fn log_level_directive() -> tracing_subscriber::filter::Directive {
    std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_owned())
        .parse()
        .unwrap_or_else(|_| "info".parse().expect("'info' is always a valid directive"))
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
