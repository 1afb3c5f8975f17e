//! CLI handlers for status, login, refresh, token, and logout.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Cli, Commands, LoginArgs};
use crate::config::{RefreshEndpointConfig, SessionConfig, ENV_REFRESH_URL, ENV_STORAGE_DIR};
use crate::error::SessionError;
use crate::refresh::{HttpRefreshClient, RefreshClient};
use crate::session::{SessionTokenManager, TokenPair};
use crate::storage::file::default_storage_dir;
use crate::storage::FileStore;

/// Run a parsed command line against the process environment.
pub async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    run_with(cli, |key| std::env::var(key).ok()).await
}

/// `refresh` and `token` need a refresh endpoint and fail before touching the
/// session when none is usable.
async fn run_with(
    cli: Cli,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let dir = cli
        .dir
        .clone()
        .or_else(|| lookup(ENV_STORAGE_DIR).filter(|v| !v.is_empty()).map(PathBuf::from))
        .unwrap_or_else(default_storage_dir);
    let config = SessionConfig::from_lookup(&lookup)?;
    match cli.command {
        Commands::Status => handle_status(&offline_manager(dir, config)),
        Commands::Login(args) => handle_login(&offline_manager(dir, config), args),
        Commands::Logout => handle_logout(&offline_manager(dir, config)),
        Commands::Refresh => {
            let endpoint = resolve_endpoint(cli.refresh_url.as_deref(), &lookup)?;
            handle_refresh(&online_manager(dir, config, endpoint)?).await
        }
        Commands::Token => {
            let endpoint = resolve_endpoint(cli.refresh_url.as_deref(), &lookup)?;
            handle_token(&online_manager(dir, config, endpoint)?).await
        }
    }
}

/// Endpoint from `--refresh-url`, else the environment. The timeout always
/// comes from the environment.
fn resolve_endpoint(
    flag: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<RefreshEndpointConfig, SessionError> {
    let endpoint = RefreshEndpointConfig::from_lookup(|key| match (key, flag) {
        (ENV_REFRESH_URL, Some(url)) => Some(url.to_string()),
        _ => lookup(key),
    });
    match endpoint {
        Err(SessionError::Configuration(reason)) if flag.is_none() => Err(
            SessionError::Configuration(format!("{reason} (pass --refresh-url or set it)")),
        ),
        other => other,
    }
}

fn online_manager(
    dir: PathBuf,
    config: SessionConfig,
    endpoint: RefreshEndpointConfig,
) -> Result<SessionTokenManager, SessionError> {
    let client = HttpRefreshClient::new(endpoint)?;
    Ok(SessionTokenManager::new(
        Arc::new(FileStore::new(dir)),
        Arc::new(client),
        config,
    ))
}

fn offline_manager(dir: PathBuf, config: SessionConfig) -> SessionTokenManager {
    SessionTokenManager::new(Arc::new(FileStore::new(dir)), Arc::new(OfflineClient), config)
}

fn handle_status(manager: &SessionTokenManager) -> Result<(), Box<dyn std::error::Error>> {
    let Some(tokens) = manager.get_tokens() else {
        println!("Session: {}", manager.phase());
        return Ok(());
    };
    println!("Session: {}", manager.phase());
    println!("   Token: {}", tokens.fingerprint());
    match tokens.expires_at_utc() {
        Some(at) if tokens.is_expired() => println!("   Expired: {}", at.to_rfc3339()),
        Some(at) => println!("   Expires: {}", at.to_rfc3339()),
        None => println!("   Expires: invalid ({})", tokens.expires_at),
    }
    Ok(())
}

fn handle_login(
    manager: &SessionTokenManager,
    args: LoginArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let pair = TokenPair::new(args.access_token, args.refresh_token, args.expires_at);
    if !pair.is_complete() {
        return Err("access and refresh tokens must be non-empty".into());
    }
    manager.login(pair);
    println!("Session stored.");
    Ok(())
}

async fn handle_refresh(manager: &SessionTokenManager) -> Result<(), Box<dyn std::error::Error>> {
    manager.try_refresh().await?;
    println!("Session refreshed.");
    Ok(())
}

async fn handle_token(manager: &SessionTokenManager) -> Result<(), Box<dyn std::error::Error>> {
    let token = manager.valid_access_token().await?;
    println!("{token}");
    Ok(())
}

fn handle_logout(manager: &SessionTokenManager) -> Result<(), Box<dyn std::error::Error>> {
    manager.logout();
    println!("Logged out.");
    Ok(())
}

/// Client for `status`, `login` and `logout`, which never refresh.
struct OfflineClient;

#[async_trait]
impl RefreshClient for OfflineClient {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, SessionError> {
        Err(SessionError::Configuration(
            "this command does not refresh sessions".to_string(),
        ))
    }
}
