use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use yt_api::YouTubeClient;
use yt_auth::{Authenticator, CredentialStore, OAuthConfig};

mod server;
mod status;

/// YouTube playlist exporter - pick one of your playlists in the browser and
/// save its watch URLs to a local JSON file
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to serve the picker on
    #[arg(long, default_value = "127.0.0.1:3000")]
    listen: String,

    /// OAuth client ID (falls back to the CLIENT_ID environment variable)
    #[arg(long)]
    client_id: Option<String>,

    /// OAuth client secret (falls back to the CLIENT_SECRET environment variable)
    #[arg(long)]
    client_secret: Option<String>,

    /// Redirect URI registered for the OAuth client (falls back to
    /// REDIRECT_URI, then to http://<listen>/oauth2callback)
    #[arg(long)]
    redirect_uri: Option<String>,

    /// Path of the persisted token record
    #[arg(long, default_value = "secret/token.json")]
    token_path: PathBuf,

    /// Directory playlist exports are written to
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// YouTube Data API base URL
    #[arg(long, default_value = yt_api::DEFAULT_API_BASE)]
    api_base: String,
}

fn arg_or_env(arg: Option<String>, var: &str) -> Result<String> {
    arg.or_else(|| std::env::var(var).ok()).with_context(|| {
        format!(
            "missing --{} argument and {} environment variable",
            var.to_lowercase().replace('_', "-"),
            var
        )
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let client_id = arg_or_env(args.client_id, "CLIENT_ID")?;
    let client_secret = arg_or_env(args.client_secret, "CLIENT_SECRET")?;
    let redirect_uri = args
        .redirect_uri
        .or_else(|| std::env::var("REDIRECT_URI").ok())
        .unwrap_or_else(|| format!("http://{}/oauth2callback", args.listen));

    let config = OAuthConfig::new(client_id, client_secret, redirect_uri);
    let store = CredentialStore::new(args.token_path);
    let auth = Authenticator::new(config, store);

    let state = server::AppState::new(
        auth,
        YouTubeClient::with_base_url(args.api_base),
        args.data_dir,
    );
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("failed to bind '{}'", args.listen))?;
    tracing::info!("server listening on http://{}", args.listen);
    tracing::info!("go to http://{}/auth to start the OAuth flow", args.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        tracing::info!("received SIGINT, shutting down");
    }
}
