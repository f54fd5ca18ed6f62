//! hrms - command-line client for the HRMS API.
//!
//! Stands in for the web frontend: stores the session issued at login,
//! sends requests through the refreshing API client, and reports when the
//! session can no longer be refreshed.

mod cli;

use std::io;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use hrms_client_core::{ApiClient, Config, Credentials, RequestDescriptor, SessionEvent};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{parse_query, Cli, Commands};

// ============================================================================
// Constants
// ============================================================================

/// Directory for rotating log files; stderr only when unset
const LOG_DIR_ENV: &str = "HRMS_LOG_DIR";

const LOG_FILE_PREFIX: &str = "hrms.log";

/// Initialize the tracing subscriber for logging
fn init_tracing(verbose: bool) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.verbose);

    let mut config = Config::load()?.apply_env()?;
    if let Some(url) = cli.base_url {
        config.base_url = url;
    }
    debug!(base_url = %config.base_url, backend = ?config.credential_backend, "Configuration loaded");

    let client = ApiClient::from_config(&config)?;

    match cli.command {
        Commands::Login {
            username,
            access_token,
            refresh_token,
        } => {
            let access_token = match access_token {
                Some(token) => token,
                None => rpassword::prompt_password("Access token: ")?,
            };
            let refresh_token = match refresh_token {
                Some(token) => token,
                None => rpassword::prompt_password("Refresh token: ")?,
            };
            if access_token.trim().is_empty() || refresh_token.trim().is_empty() {
                anyhow::bail!("Both an access token and a refresh token are required");
            }
            client.login(Credentials::new(access_token.trim(), refresh_token.trim()));

            if username.is_some() {
                config.last_username = username;
                config.save().context("Failed to save config")?;
            }
            info!("Logged in");
            eprintln!("Logged in.");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Logout => {
            client.logout();
            eprintln!("Logged out.");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => {
            println!("API:           {}", client.base_url());
            println!("Backend:       {:?}", config.credential_backend);
            println!(
                "Authenticated: {}",
                if client.is_authenticated() { "yes" } else { "no" }
            );
            if let Some(ref username) = config.last_username {
                println!("User:          {}", username);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Get { path, query } => {
            let descriptor = RequestDescriptor::get(path).queries(parse_query(&query)?);
            send(&client, descriptor).await
        }
        Commands::Delete { path } => send(&client, RequestDescriptor::delete(path)).await,
        Commands::Post { path, body } => {
            send(&client, RequestDescriptor::post(path).body(parse_body(&body)?)).await
        }
        Commands::Put { path, body } => {
            send(&client, RequestDescriptor::put(path).body(parse_body(&body)?)).await
        }
        Commands::Patch { path, body } => {
            send(&client, RequestDescriptor::patch(path).body(parse_body(&body)?)).await
        }
    }
}

fn parse_body(body: &str) -> Result<Value> {
    serde_json::from_str(body).context("Request body must be valid JSON")
}

/// Send the request, print the envelope, and report session changes.
async fn send(client: &ApiClient, descriptor: RequestDescriptor) -> Result<ExitCode> {
    let mut events = client.subscribe();
    let result = client.request::<Value>(descriptor).await;
    report_session_events(&mut events);

    match result {
        Ok(envelope) => {
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{}", serde_json::to_string_pretty(&err.to_envelope())?);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn report_session_events(events: &mut broadcast::Receiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::Refreshed => debug!("Session refreshed"),
            SessionEvent::Expired { message } => {
                debug!(reason = %message, "Session expired");
                eprintln!("Session expired. Please log in again.");
            }
        }
    }
}
