//! kis-credentials - inspect and seed the KIS credential store.
//!
//! Commands:
//! - `resolve`: show which tier supplies the API key pair
//! - `sync`: push the environment key pair into the store
//! - `token`: show the cached access token status
//! - `invalidate-token`: deactivate the cached access token

use std::io;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kis_credentials::{CredentialManager, FallbackResolver, Settings, StoreGate, TokenCache};

const USAGE: &str = "usage: kis-credentials <resolve|sync|token|invalidate-token>";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

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

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else {
        bail!(USAGE);
    };

    let settings = Settings::from_env();
    let gate = Arc::new(StoreGate::new(settings.clone()));
    let manager = CredentialManager::new(gate.clone());
    let tokens = TokenCache::new(gate.clone());
    let resolver = FallbackResolver::new(manager, settings);

    info!(command = %command, "kis-credentials starting");

    match command.as_str() {
        "resolve" => resolve(&resolver).await,
        "sync" => sync(&resolver, &gate).await,
        "token" => token_status(&tokens).await,
        "invalidate-token" => invalidate(&tokens, &gate).await,
        other => bail!("unknown command '{}'\n{}", other, USAGE),
    }
}

async fn resolve(resolver: &FallbackResolver) -> Result<()> {
    let resolved = resolver.get_credentials_with_fallback().await;
    match resolved.key_pair() {
        Some(pair) => println!("source: {}\napp_key: {}", resolved.source, pair.masked_key()),
        None => bail!("no KIS API key pair in the credential store or environment"),
    }
    Ok(())
}

async fn sync(resolver: &FallbackResolver, gate: &StoreGate) -> Result<()> {
    if let Some(reason) = gate.get_init_error() {
        bail!("credential store unavailable: {}", reason);
    }
    if !resolver.sync_env_to_store().await {
        bail!("failed to sync environment key pair (are KIS_APP_KEY and KIS_APP_SECRET set?)");
    }
    println!("environment key pair synced to credential store");
    Ok(())
}

async fn token_status(tokens: &TokenCache) -> Result<()> {
    let now = Utc::now();
    if let Some(token) = tokens.get_valid_token().await {
        println!(
            "valid token, expires {} ({} minutes left{})",
            token.expires_at,
            token.minutes_until_expiry(now),
            if token.needs_refresh_at(now) { ", refresh due" } else { "" }
        );
    } else if let Some(token) = tokens.get_token().await {
        println!("stored token without a valid expiry filter match (expires_at {})", token.expires_at);
    } else {
        println!("no active token");
    }
    Ok(())
}

async fn invalidate(tokens: &TokenCache, gate: &StoreGate) -> Result<()> {
    if let Some(reason) = gate.get_init_error() {
        bail!("credential store unavailable: {}", reason);
    }
    if !tokens.invalidate_token().await {
        bail!("failed to invalidate token");
    }
    println!("token invalidated");
    Ok(())
}
