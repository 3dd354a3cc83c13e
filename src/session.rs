//! Session context.
//!
//! Holds who is logged in and the optional bearer token. `login` populates
//! it and `logout` clears it; the handle is cloned into the store client and
//! the lifecycle controller at construction instead of living in a global.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "user" | "usuario" => Some(Role::User),
            _ => None,
        }
    }
}

/// Profile returned by the login routes, when the backend sends one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

// Some backends send numeric ids, others strings.
fn id_as_string<'de, D: serde::Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let v = serde_json::Value::deserialize(d)?;
    Ok(match v {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub username: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

/// Shared, cloneable handle to the current session.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(&self, session: Session) {
        log::info!(
            "Session: {} logged in as {:?}",
            session.username,
            session.role
        );
        *self.inner.write() = Some(session);
    }

    pub fn logout(&self) {
        if let Some(previous) = self.inner.write().take() {
            log::info!("Session: {} logged out", previous.username);
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.inner
            .read()
            .as_ref()
            .map_or(false, |s| s.role == Role::Admin)
    }

    pub fn token(&self) -> Option<String> {
        self.inner.read().as_ref().and_then(|s| s.token.clone())
    }

    /// Name used to attribute actions in logs.
    pub fn actor(&self) -> String {
        self.inner
            .read()
            .as_ref()
            .map(|s| s.username.clone())
            .unwrap_or_else(|| "anonymous".to_string())
    }

    /// Restores a session saved by [`SessionContext::save`]. A missing file is
    /// not an error: the context simply stays logged out.
    pub fn restore(&self, path: &Path) -> Result<(), String> {
        if !path.exists() {
            return Ok(());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read session file: {}", e))?;
        let session: Session = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse session file: {}", e))?;
        *self.inner.write() = Some(session);
        Ok(())
    }

    /// Writes the current session to disk, or removes the file when logged out.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        match self.current() {
            Some(session) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| format!("Failed to create session directory: {}", e))?;
                }
                let content = serde_json::to_string_pretty(&session)
                    .map_err(|e| format!("Failed to serialize session: {}", e))?;
                fs::write(path, content).map_err(|e| format!("Failed to write session: {}", e))
            }
            None => {
                if path.exists() {
                    fs::remove_file(path)
                        .map_err(|e| format!("Failed to remove session file: {}", e))?;
                }
                Ok(())
            }
        }
    }
}
