//! Usage: Durable key-value storage for the `access`/`refresh` session token pair.

use crate::shared::error::AppResult;
use crate::shared::mutex_ext::MutexExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TokenKey {
    Access,
    Refresh,
}

impl TokenKey {
    pub const ALL: [TokenKey; 2] = [TokenKey::Access, TokenKey::Refresh];

    pub fn as_str(self) -> &'static str {
        match self {
            TokenKey::Access => "access",
            TokenKey::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

impl SessionTokens {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Some(access.into()),
            refresh: Some(refresh.into()),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }

    fn slot(&mut self, key: TokenKey) -> &mut Option<String> {
        match key {
            TokenKey::Access => &mut self.access,
            TokenKey::Refresh => &mut self.refresh,
        }
    }

    fn get(&self, key: TokenKey) -> Option<&str> {
        match key {
            TokenKey::Access => self.access.as_deref(),
            TokenKey::Refresh => self.refresh.as_deref(),
        }
    }
}

/// Storage backend for session tokens. Values are opaque strings (JWTs).
///
/// Empty or whitespace-only values are treated as absent by the provided
/// helpers, so a half-cleared store never produces `Bearer ` headers.
pub trait TokenStore: Send + Sync {
    fn get(&self, key: TokenKey) -> AppResult<Option<String>>;

    fn set(&self, key: TokenKey, value: &str) -> AppResult<()>;

    fn remove(&self, key: TokenKey) -> AppResult<()>;

    fn access_token(&self) -> AppResult<Option<String>> {
        Ok(non_empty(self.get(TokenKey::Access)?))
    }

    fn refresh_token(&self) -> AppResult<Option<String>> {
        Ok(non_empty(self.get(TokenKey::Refresh)?))
    }

    fn load(&self) -> AppResult<SessionTokens> {
        Ok(SessionTokens {
            access: self.access_token()?,
            refresh: self.refresh_token()?,
        })
    }

    fn save(&self, tokens: &SessionTokens) -> AppResult<()> {
        for key in TokenKey::ALL {
            match tokens.get(key).map(str::trim).filter(|v| !v.is_empty()) {
                Some(value) => self.set(key, value)?,
                None => self.remove(key)?,
            }
        }
        Ok(())
    }

    fn clear(&self) -> AppResult<()> {
        for key in TokenKey::ALL {
            self.remove(key)?;
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: Mutex<BTreeMap<TokenKey, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: &SessionTokens) -> Self {
        let store = Self::default();
        store.inner.with_recovered(|map| {
            for key in TokenKey::ALL {
                if let Some(value) = tokens.get(key) {
                    map.insert(key, value.to_string());
                }
            }
        });
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: TokenKey) -> AppResult<Option<String>> {
        Ok(self.inner.with_recovered(|map| map.get(&key).cloned()))
    }

    fn set(&self, key: TokenKey, value: &str) -> AppResult<()> {
        self.inner
            .with_recovered(|map| map.insert(key, value.to_string()));
        Ok(())
    }

    fn remove(&self, key: TokenKey) -> AppResult<()> {
        self.inner.with_recovered(|map| map.remove(&key));
        Ok(())
    }
}

/// JSON-file token store. The file is rewritten through a temp file and a
/// backup so a crash mid-write leaves either the old or the new pair on disk.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    cache: Mutex<SessionTokens>,
}

impl FileTokenStore {
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let tokens = read_tokens_file(&path)?;
        Ok(Self {
            path,
            cache: Mutex::new(tokens),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, f: impl FnOnce(&mut SessionTokens)) -> AppResult<()> {
        let mut guard = self.cache.lock_or_recover();
        let mut next = guard.clone();
        f(&mut next);
        if next == *guard {
            return Ok(());
        }
        write_tokens_file(&self.path, &next)?;
        *guard = next;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: TokenKey) -> AppResult<Option<String>> {
        Ok(self
            .cache
            .with_recovered(|tokens| tokens.get(key).map(str::to_string)))
    }

    fn set(&self, key: TokenKey, value: &str) -> AppResult<()> {
        self.update(|tokens| *tokens.slot(key) = Some(value.to_string()))
    }

    fn remove(&self, key: TokenKey) -> AppResult<()> {
        self.update(|tokens| *tokens.slot(key) = None)
    }

    fn save(&self, tokens: &SessionTokens) -> AppResult<()> {
        let normalized = SessionTokens {
            access: non_empty(tokens.access.clone()),
            refresh: non_empty(tokens.refresh.clone()),
        };
        self.update(|current| *current = normalized)
    }

    fn clear(&self) -> AppResult<()> {
        self.update(|current| *current = SessionTokens::default())
    }
}

fn read_tokens_file(path: &Path) -> AppResult<SessionTokens> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(SessionTokens::default())
        }
        Err(err) => {
            return Err(format!(
                "STORAGE_ERROR: failed to read token file {}: {err}",
                path.display()
            )
            .into())
        }
    };
    if content.trim().is_empty() {
        return Ok(SessionTokens::default());
    }

    match serde_json::from_str::<SessionTokens>(&content) {
        Ok(tokens) => Ok(tokens),
        Err(err) => {
            // A corrupt file is treated as an anonymous session rather than a hard failure.
            tracing::warn!(path = %path.display(), "token file is not valid json, ignoring: {err}");
            Ok(SessionTokens::default())
        }
    }
}

fn write_tokens_file(path: &Path, tokens: &SessionTokens) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("STORAGE_ERROR: failed to create token dir: {e}"))?;
    }

    let file_name = path
        .file_name()
        .and_then(|v| v.to_str())
        .unwrap_or("tokens.json");
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));
    let backup_path = path.with_file_name(format!("{file_name}.bak"));

    let content = serde_json::to_vec_pretty(tokens)
        .map_err(|e| format!("STORAGE_ERROR: failed to serialize tokens: {e}"))?;
    std::fs::write(&tmp_path, content)
        .map_err(|e| format!("STORAGE_ERROR: failed to write temp token file: {e}"))?;

    if backup_path.exists() {
        let _ = std::fs::remove_file(&backup_path);
    }
    if path.exists() {
        std::fs::rename(path, &backup_path)
            .map_err(|e| format!("STORAGE_ERROR: failed to create token file backup: {e}"))?;
    }
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::rename(&backup_path, path);
        return Err(format!("STORAGE_ERROR: failed to finalize token file: {e}").into());
    }
    if backup_path.exists() {
        let _ = std::fs::remove_file(&backup_path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_treats_blank_values_as_absent() {
        let store = MemoryTokenStore::new();
        store.set(TokenKey::Access, "   ").unwrap();
        assert_eq!(store.access_token().unwrap(), None);

        store.set(TokenKey::Access, "tok1").unwrap();
        assert_eq!(store.access_token().unwrap().as_deref(), Some("tok1"));
    }

    #[test]
    fn save_removes_missing_keys() {
        let store = MemoryTokenStore::with_tokens(&SessionTokens::new("a", "r"));
        store
            .save(&SessionTokens {
                access: Some("a2".to_string()),
                refresh: None,
            })
            .unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.access.as_deref(), Some("a2"));
        assert_eq!(loaded.refresh, None);
    }

    #[test]
    fn clear_purges_both_keys() {
        let store = MemoryTokenStore::with_tokens(&SessionTokens::new("a", "r"));
        store.clear().unwrap();
        assert!(store.load().unwrap().is_anonymous());
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session").join("tokens.json");

        let store = FileTokenStore::open(&path).unwrap();
        assert!(store.load().unwrap().is_anonymous());
        store.save(&SessionTokens::new("tok1", "ref1")).unwrap();
        store.set(TokenKey::Access, "tok2").unwrap();
        drop(store);

        let reopened = FileTokenStore::open(&path).unwrap();
        let loaded = reopened.load().unwrap();
        assert_eq!(loaded.access.as_deref(), Some("tok2"));
        assert_eq!(loaded.refresh.as_deref(), Some("ref1"));
        assert!(!path.with_file_name("tokens.json.tmp").exists());
        assert!(!path.with_file_name("tokens.json.bak").exists());
    }

    #[test]
    fn file_store_clear_writes_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = FileTokenStore::open(&path).unwrap();
        store.save(&SessionTokens::new("tok1", "ref1")).unwrap();
        store.clear().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, serde_json::json!({}));
    }

    #[test]
    fn file_store_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = FileTokenStore::open(&path).unwrap();
        assert!(store.load().unwrap().is_anonymous());
    }
}
