use std::path::PathBuf;

use onedrive_core::OAuthToken;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("token file is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("XDG state directory is unavailable")]
    MissingStateDir,
}

/// Expiry is checked with a safety margin so a token is refreshed before it
/// lapses mid-pass.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthState {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl OAuthState {
    pub fn from_token(token: &OAuthToken, now: i64) -> Self {
        Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token.expires_in.map(|secs| now + secs as i64),
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        match self.expires_at {
            Some(at) => now + EXPIRY_MARGIN_SECS >= at,
            None => false,
        }
    }
}

/// Refresh-token persistence as a plain JSON file under the user state
/// directory, owner-readable only.
pub struct TokenStorage {
    path: PathBuf,
}

impl TokenStorage {
    pub fn new() -> Result<Self, StorageError> {
        let mut path = dirs::state_dir()
            .or_else(dirs::data_dir)
            .ok_or(StorageError::MissingStateDir)?;
        path.push("onedrived");
        path.push("oauth.json");
        Ok(Self { path })
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Result<Option<OAuthState>, StorageError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    pub fn save(&self, state: &OAuthState) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(state)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    pub fn delete(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TokenStorage::at(dir.path().join("nested/oauth.json"));
        let state = OAuthState {
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            expires_at: Some(1_700_000_000),
        };

        storage.save(&state).unwrap();
        let loaded = storage.load().unwrap().unwrap();

        assert_eq!(loaded.access_token, "access");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(loaded.expires_at, Some(1_700_000_000));
    }

    #[test]
    fn load_of_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TokenStorage::at(dir.path().join("oauth.json"));
        assert!(storage.load().unwrap().is_none());
        storage.delete().unwrap();
    }

    #[test]
    fn expiry_honors_margin() {
        let state = OAuthState {
            access_token: "access".into(),
            refresh_token: None,
            expires_at: Some(1_000),
        };
        assert!(!state.is_expired(900));
        assert!(state.is_expired(941));
        assert!(state.is_expired(2_000));

        let no_expiry = OAuthState {
            access_token: "access".into(),
            refresh_token: None,
            expires_at: None,
        };
        assert!(!no_expiry.is_expired(i64::MAX - EXPIRY_MARGIN_SECS - 1));
    }
}
