//! Persisted token state (`state.json`)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::models::Token;

/// On-disk layout; every field is optional so that partial files still load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_ts: Option<i64>,
}

pub struct StateStore {
    path: PathBuf,
    data: PersistedState,
}

impl StateStore {
    /// Read the state file once. A missing or unreadable file yields an
    /// empty state; the engine then asks for authorization.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(data) => {
                    tracing::info!("[State] Loaded {}", path.display());
                    data
                }
                Err(e) => {
                    tracing::error!("[State] Unable to parse {}: {}", path.display(), e);
                    PersistedState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("[State] {} not found, starting without token", path.display());
                PersistedState::default()
            }
            Err(e) => {
                tracing::error!("[State] Unable to read {}: {}", path.display(), e);
                PersistedState::default()
            }
        };
        Self { path, data }
    }

    #[cfg(test)]
    pub fn data(&self) -> &PersistedState {
        &self.data
    }

    pub fn token(&self) -> Token {
        Token {
            access_token: self.data.access_token.clone().unwrap_or_default(),
            refresh_token: self.data.refresh_token.clone().unwrap_or_default(),
            expires_at: self.data.expires_ts.unwrap_or(0),
        }
    }

    /// Replace the token fields and write the file atomically
    pub async fn save_token(&mut self, token: &Token) -> Result<(), BridgeError> {
        self.data.access_token = Some(token.access_token.clone());
        self.data.refresh_token = Some(token.refresh_token.clone());
        self.data.expires_ts = Some(token.expires_at);
        self.write().await
    }

    async fn write(&self) -> Result<(), BridgeError> {
        let body = serde_json::to_vec_pretty(&self.data)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!("[State] Saved {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().join("state.json"));
        assert_eq!(store.data(), &PersistedState::default());
        assert_eq!(store.token(), Token::default());
    }

    #[test]
    fn test_corrupt_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = StateStore::load(&path);
        assert!(!store.token().has_refresh_token());
    }

    #[test]
    fn test_partial_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"refresh_token": "r1"}"#).unwrap();

        let token = StateStore::load(&path).token();
        assert_eq!(token.refresh_token, "r1");
        assert!(token.access_token.is_empty());
        assert!(!token.is_usable());
    }

    #[tokio::test]
    async fn test_save_token_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut store = StateStore::load(&path);

        let token = Token {
            access_token: "a2".to_string(),
            refresh_token: "r2".to_string(),
            expires_at: 1_700_010_800,
        };
        store.save_token(&token).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({
                "access_token": "a2",
                "refresh_token": "r2",
                "expires_ts": 1_700_010_800
            })
        );
        assert!(!dir.path().join("state.json.tmp").exists());
        assert_eq!(StateStore::load(&path).token(), token);
    }
}
