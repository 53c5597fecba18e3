//! medidesk - command-line driver for the hospital admin API session layer.
//!
//! Stores a session token, issues requests through the shared client and
//! shows what the route guard would do, so the session behaviour can be
//! checked against a running backend without the web frontend.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use medidesk_core::auth::SessionData;
use medidesk_core::{
    config, ApiRequest, ClientConfig, FileTokenStore, HttpClient, Navigation, Notification,
    NotificationLevel, NotificationLog, RouteGuard, SharedLocation, TokenStore,
};

const USAGE: &str = "\
Usage:
  medidesk login <token> [username]
  medidesk logout
  medidesk status
  medidesk get [--at <current-path>] <path>...
  medidesk navigate <path>";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let config = ClientConfig::from_env();
    let store = Arc::new(open_store()?);
    info!(command = %command, base_url = %config.base_url, "medidesk starting");

    match command.as_str() {
        "login" => login(&store, rest),
        "logout" => {
            store.clear()?;
            println!("Signed out");
            Ok(())
        }
        "status" => {
            status(&store);
            Ok(())
        }
        "get" => get(&config, store, rest).await,
        "navigate" => navigate(&config, &store, rest),
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }
}

fn open_store() -> Result<FileTokenStore> {
    let dir = config::session_dir()?;
    FileTokenStore::open(dir).context("Failed to open session store")
}

fn login(store: &FileTokenStore, args: &[String]) -> Result<()> {
    let Some(token) = args.first() else {
        bail!("login needs a token\n\n{}", USAGE);
    };
    let username = args.get(1).cloned();
    store.save_session(SessionData::new(token.clone(), username))?;
    println!("Session saved");
    Ok(())
}

fn status(store: &FileTokenStore) {
    match store.session() {
        Some(session) => {
            let who = session.username.as_deref().unwrap_or("unknown user");
            println!(
                "Signed in as {} since {}",
                who,
                session.created_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
        None => println!("Not signed in"),
    }
}

/// Issue every GET at once so overlapping auth failures share one cycle.
async fn get(config: &ClientConfig, store: Arc<FileTokenStore>, args: &[String]) -> Result<()> {
    let (current_path, paths) = match args {
        [flag, at, paths @ ..] if flag == "--at" => (at.clone(), paths),
        paths => ("/".to_string(), paths),
    };
    if paths.is_empty() {
        bail!("get needs at least one path\n\n{}", USAGE);
    }

    let notifications = Arc::new(NotificationLog::new());
    let client = HttpClient::new(
        config,
        store,
        Arc::new(SharedLocation::new(current_path)),
        notifications.clone(),
    )?;

    let results = join_all(paths.iter().map(|p| client.send(ApiRequest::get(p.as_str())))).await;

    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(response) => {
                println!("{} -> {}", path, response.status);
                match serde_json::from_slice::<serde_json::Value>(&response.body) {
                    Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
                    Err(_) => println!("{}", response.text()),
                }
            }
            Err(e) => println!("{} -> error: {}", path, e),
        }
    }

    print_notifications(&notifications.drain());
    Ok(())
}

fn navigate(config: &ClientConfig, store: &FileTokenStore, args: &[String]) -> Result<()> {
    let Some(path) = args.first() else {
        bail!("navigate needs a path\n\n{}", USAGE);
    };

    let notifications = Arc::new(NotificationLog::new());
    let guard = RouteGuard::new(config, notifications.clone());

    match guard.check(store.has_session(), path) {
        Navigation::Allow => println!("allow {}", path),
        Navigation::AllowWithWarning => println!("allow {} (not signed in)", path),
        Navigation::Redirect { to } => println!("redirect {} -> {}", path, to),
    }

    print_notifications(&notifications.drain());
    Ok(())
}

fn print_notifications(notifications: &[Notification]) {
    for n in notifications {
        let level = match n.level {
            NotificationLevel::Warn => "warning",
            NotificationLevel::Error => "error",
        };
        eprintln!("[{}] {}", level, n.message);
    }
}
