use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use onedrive_core::{ApiErrorClass, OAuthClient, OneDriveClient};
use tokio::sync::mpsc;

use crate::storage::{OAuthState, TokenStorage};
use crate::sync::engine::{EngineError, SyncEngine};
use crate::sync::index::IndexStore;
use crate::sync::local_watcher::{LocalEvent, start_notify_watcher};

const DEFAULT_SYNC_DIR_NAME: &str = "OneDrive";
const DEFAULT_REMOTE_ROOT: &str = "/";
const DEFAULT_POLL_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub sync_root: PathBuf,
    pub remote_root: String,
    pub db_path: Option<PathBuf>,
    pub poll_interval: Duration,
    pub enable_local_watcher: bool,
    pub verbose: bool,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let default_sync = home.join(DEFAULT_SYNC_DIR_NAME);
        let sync_root = std::env::var("ONEDRIVE_SYNC_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or(default_sync);
        let remote_root = std::env::var("ONEDRIVE_REMOTE_ROOT")
            .unwrap_or_else(|_| DEFAULT_REMOTE_ROOT.to_string());
        let db_path = std::env::var("ONEDRIVE_DB_PATH").ok().map(PathBuf::from);
        let poll_interval =
            Duration::from_secs(read_u64_env("ONEDRIVE_POLL_SECS", DEFAULT_POLL_SECS));
        let enable_local_watcher = read_bool_env("ONEDRIVE_ENABLE_LOCAL_WATCHER", true);

        Ok(Self {
            sync_root,
            remote_root,
            db_path,
            poll_interval,
            enable_local_watcher,
            verbose: false,
        })
    }
}

pub struct DaemonRuntime {
    config: DaemonConfig,
    engine: SyncEngine,
}

impl DaemonRuntime {
    pub async fn bootstrap(config: DaemonConfig, resync: bool) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.sync_root)
            .await
            .with_context(|| format!("failed to create sync root at {:?}", config.sync_root))?;

        let storage = TokenStorage::new().context("failed to locate token storage")?;
        let token = resolve_valid_token(&storage).await?;
        let client = OneDriveClient::new(token)?;

        let index = match &config.db_path {
            Some(path) => IndexStore::open_at(path).await,
            None => IndexStore::new_default().await,
        }
        .context("failed to initialize index store")?;
        if resync {
            index.clear().await.context("failed to reset index")?;
            eprintln!("[onedrived] resync requested: dropped index rows and cursor");
        }

        let cursor = index.get_sync_cursor().await?;
        let mut engine = SyncEngine::new(
            client,
            index,
            config.sync_root.clone(),
            config.remote_root.clone(),
        );
        engine.set_cursor(cursor.cursor);

        Ok(Self { config, engine })
    }

    /// One full pass: download phase, then upload phase.
    pub async fn run_once(mut self) -> anyhow::Result<()> {
        self.run_pass().await?;
        eprintln!("[onedrived] sync pass complete");
        Ok(())
    }

    pub async fn run_monitor(mut self) -> anyhow::Result<()> {
        eprintln!(
            "[onedrived] started: sync_root={}, remote_root={}, local_watcher={}",
            self.config.sync_root.display(),
            self.config.remote_root,
            if self.config.enable_local_watcher {
                "enabled"
            } else {
                "disabled"
            }
        );

        let (watcher, mut local_rx): (
            Option<notify::RecommendedWatcher>,
            Option<mpsc::UnboundedReceiver<LocalEvent>>,
        ) = if self.config.enable_local_watcher {
            match start_notify_watcher(&self.config.sync_root) {
                Ok((watcher, rx)) => (Some(watcher), Some(rx)),
                Err(err) => {
                    eprintln!("[onedrived] warning: failed to start local watcher: {err}");
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        // One engine, one loop: poll passes and watcher events interleave
        // here, never run concurrently.
        let mut poll = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(err) = self.run_pass().await {
                        log_engine_error(&err);
                    }
                }
                event = next_local_event(&mut local_rx) => {
                    let Some(event) = event else {
                        local_rx = None;
                        continue;
                    };
                    if self.config.verbose {
                        eprintln!("[onedrived] local event: {event:?}");
                    }
                    match self.engine.ingest_local_event(event).await {
                        Ok(()) => {}
                        Err(EngineError::MissingItem(path)) => {
                            eprintln!("[onedrived] ignoring event for untracked path: {path}");
                        }
                        Err(err) => log_engine_error(&err),
                    }
                }
                res = tokio::signal::ctrl_c() => {
                    res.context("failed waiting for shutdown signal")?;
                    eprintln!("[onedrived] shutting down");
                    break;
                }
            }
        }

        drop(watcher);
        Ok(())
    }

    async fn run_pass(&mut self) -> Result<(), EngineError> {
        self.engine.apply_differences().await?;
        self.engine.upload_differences(None).await?;
        Ok(())
    }
}

async fn next_local_event(
    rx: &mut Option<mpsc::UnboundedReceiver<LocalEvent>>,
) -> Option<LocalEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn log_engine_error(err: &EngineError) {
    if let EngineError::Api(api) = err {
        match api.classification() {
            Some(ApiErrorClass::Auth) => {
                eprintln!("[onedrived] sync error (authorization rejected, refresh the saved token): {api}");
            }
            Some(ApiErrorClass::RateLimit) => {
                eprintln!("[onedrived] sync error (rate limited, the next poll retries): {api}");
            }
            _ => eprintln!("[onedrived] sync error: {api}"),
        }
        return;
    }
    eprintln!("[onedrived] sync error: {err}");
}

async fn resolve_valid_token(storage: &TokenStorage) -> anyhow::Result<String> {
    if let Ok(token) = std::env::var("ONEDRIVE_TOKEN") {
        return Ok(token);
    }

    let state = storage
        .load()
        .context("failed to read saved credentials")?
        .context("no saved credentials; set ONEDRIVE_TOKEN or complete the OAuth flow first")?;
    if !state.is_expired(now_unix()) {
        return Ok(state.access_token);
    }

    let refresh = state
        .refresh_token
        .clone()
        .context("saved access token expired and no refresh token is available")?;
    let client_id = std::env::var("ONEDRIVE_CLIENT_ID")
        .context("ONEDRIVE_CLIENT_ID is required to refresh the saved token")?;
    let client_secret = std::env::var("ONEDRIVE_CLIENT_SECRET")
        .context("ONEDRIVE_CLIENT_SECRET is required to refresh the saved token")?;

    let oauth = OAuthClient::new(client_id, client_secret)?;
    let token = oauth
        .refresh_token(&refresh)
        .await
        .context("token refresh failed")?;
    let renewed = OAuthState::from_token(&token, now_unix());
    storage
        .save(&renewed)
        .context("failed to persist refreshed token")?;
    Ok(renewed.access_token)
}

fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn read_bool_env(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_bool_env_parses_common_spellings() {
        unsafe {
            std::env::set_var("ONEDRIVED_TEST_BOOL", "yes");
        }
        assert!(read_bool_env("ONEDRIVED_TEST_BOOL", false));
        unsafe {
            std::env::set_var("ONEDRIVED_TEST_BOOL", "0");
        }
        assert!(!read_bool_env("ONEDRIVED_TEST_BOOL", true));
        unsafe {
            std::env::remove_var("ONEDRIVED_TEST_BOOL");
        }
        assert!(read_bool_env("ONEDRIVED_TEST_BOOL", true));
    }

    #[test]
    fn read_u64_env_rejects_zero() {
        unsafe {
            std::env::set_var("ONEDRIVED_TEST_U64", "0");
        }
        assert_eq!(read_u64_env("ONEDRIVED_TEST_U64", 30), 30);
        unsafe {
            std::env::set_var("ONEDRIVED_TEST_U64", "90");
        }
        assert_eq!(read_u64_env("ONEDRIVED_TEST_U64", 30), 90);
        unsafe {
            std::env::remove_var("ONEDRIVED_TEST_U64");
        }
    }
}
