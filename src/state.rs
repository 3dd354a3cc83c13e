use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthClient;
use crate::lifecycle::{LifecycleController, StaleRow};
use crate::session::SessionContext;
use crate::store::{MeetingStore, RestMeetingStore};
use crate::types::Config;

/// Overrides `apiUrl` from the config file.
pub const API_URL_ENV: &str = "MEETDESK_API_URL";

/// Largest accepted `upcomingWindowDays` (ten years).
pub const MAX_UPCOMING_WINDOW_DAYS: i64 = 3650;

/// Everything a command needs: config, the shared session and the controller
/// wired to the REST store.
pub struct AppState {
    pub config: Config,
    pub session: SessionContext,
    pub controller: LifecycleController,
    session_path: PathBuf,
}

impl AppState {
    /// Loads config, restores the saved session and builds the REST store.
    pub fn new() -> Result<Self, String> {
        let config = load_config()?;
        let session_path = session_path(&config)?;
        Self::from_parts(config, session_path)
    }

    pub fn from_parts(config: Config, session_path: PathBuf) -> Result<Self, String> {
        let session = SessionContext::new();
        if let Err(e) = session.restore(&session_path) {
            log::warn!("State: ignoring saved session: {}", e);
        }

        let store = RestMeetingStore::with_timeout(&config.api_url, config.timeout(), session.clone())
            .map_err(|e| e.to_string())?;
        log::info!("State: using meeting store at {}", store.base_url());

        Ok(Self::with_store(config, session, Arc::new(store), session_path))
    }

    /// Builds state around an arbitrary store.
    pub fn with_store(
        config: Config,
        session: SessionContext,
        store: Arc<dyn MeetingStore>,
        session_path: PathBuf,
    ) -> Self {
        let controller = LifecycleController::new(store, session.clone());
        match load_journal(&journal_path(&session_path)) {
            Ok(rows) if !rows.is_empty() => {
                log::info!("State: {} stale rows awaiting reconcile", rows.len());
                controller.requeue_stale_rows(rows);
            }
            Ok(_) => {}
            Err(e) => log::warn!("State: ignoring cleanup journal: {}", e),
        }
        Self {
            config,
            session,
            controller,
            session_path,
        }
    }

    pub fn auth_client(&self) -> Result<AuthClient, String> {
        AuthClient::new(&self.config.api_url, self.config.timeout()).map_err(|e| e.to_string())
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    /// Writes the current session to disk (or removes the file after logout).
    pub fn persist_session(&self) -> Result<(), String> {
        self.session.save(&self.session_path)
    }

    /// Writes the controller's stale rows so a later run can reconcile them.
    pub fn persist_journal(&self) -> Result<(), String> {
        save_journal(&journal_path(&self.session_path), &self.controller.stale_rows())
    }
}

/// The cleanup journal lives next to the session file.
fn journal_path(session_path: &Path) -> PathBuf {
    session_path.with_file_name("stale_rows.json")
}

fn load_journal(path: &Path) -> Result<Vec<StaleRow>, String> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read journal: {}", e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse journal: {}", e))
}

/// An empty journal removes the file.
fn save_journal(path: &Path, rows: &[StaleRow]) -> Result<(), String> {
    if rows.is_empty() {
        if path.exists() {
            fs::remove_file(path).map_err(|e| format!("Failed to remove journal: {}", e))?;
        }
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create journal directory: {}", e))?;
    }
    let content = serde_json::to_string_pretty(rows)
        .map_err(|e| format!("Failed to serialize journal: {}", e))?;
    fs::write(path, content).map_err(|e| format!("Failed to write journal: {}", e))
}

impl Config {
    pub fn timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Get the state directory (~/.meetdesk)
fn state_dir() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".meetdesk"))
}

/// Get the canonical config file path (~/.meetdesk/config.json)
pub fn config_path() -> Result<PathBuf, String> {
    Ok(state_dir()?.join("config.json"))
}

/// Session file: `sessionPath` from config, else ~/.meetdesk/session.json
pub fn session_path(config: &Config) -> Result<PathBuf, String> {
    match config.session_path.as_deref().map(str::trim) {
        Some(p) if !p.is_empty() => Ok(PathBuf::from(p)),
        _ => Ok(state_dir()?.join("session.json")),
    }
}

/// Load configuration from ~/.meetdesk/config.json, then apply env overrides.
pub fn load_config() -> Result<Config, String> {
    let mut config = load_config_from(&config_path()?)?;
    if let Ok(url) = std::env::var(API_URL_ENV) {
        apply_api_url_override(&mut config, &url);
    }
    Ok(config)
}

/// A missing file yields defaults; an unreadable or malformed one is an error.
pub fn load_config_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        log::info!("Config: {} not found, using defaults", path.display());
        return Ok(Config::default());
    }

    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;

    let config: Config =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;

    if !(0..=MAX_UPCOMING_WINDOW_DAYS).contains(&config.upcoming_window_days) {
        return Err(format!(
            "upcomingWindowDays must be between 0 and {} (got {})",
            MAX_UPCOMING_WINDOW_DAYS, config.upcoming_window_days
        ));
    }

    Ok(config)
}

fn apply_api_url_override(config: &mut Config, url: &str) {
    let url = url.trim();
    if !url.is_empty() {
        log::info!("Config: {} overrides apiUrl", API_URL_ENV);
        config.api_url = url.to_string();
    }
}

/// Create or update a config file.
///
/// Starts from the file's current contents (or defaults), applies the
/// mutator, creates the parent directory if needed and writes it back.
pub fn update_config_at(path: &Path, mutator: impl FnOnce(&mut Config)) -> Result<Config, String> {
    let mut config = load_config_from(path)?;
    mutator(&mut config);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config dir: {}", e))?;
        }
    }

    let content = serde_json::to_string_pretty(&config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))?;

    Ok(config)
}
