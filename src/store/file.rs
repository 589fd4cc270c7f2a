//! File-based token store with atomic writes.
//!
//! Stores the session token under `dirs::data_dir()/<namespace>/`.
//! Uses temp file + rename for atomic writes.

use crate::host::{SessionToken, TokenStore};
use crate::PlaygateError;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const TOKEN_FILE: &str = "session-token.json";

/// File-based [`TokenStore`].
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    /// Directory holding the token file.
    store_dir: PathBuf,
}

impl FileTokenStore {
    /// Create a store with the given namespace.
    ///
    /// The token is stored under `dirs::data_dir()/<namespace>/`.
    pub fn new(namespace: &str) -> Result<Self, PlaygateError> {
        let base_dir = dirs::data_dir()
            .ok_or_else(|| PlaygateError::StoreIO("Could not find data directory".to_string()))?;
        Self::with_path(base_dir.join(namespace))
    }

    /// Create a store at a specific directory.
    pub fn with_path(store_dir: PathBuf) -> Result<Self, PlaygateError> {
        fs::create_dir_all(&store_dir)
            .map_err(|e| PlaygateError::StoreIO(format!("Failed to create store dir: {}", e)))?;
        Ok(Self { store_dir })
    }

    fn token_path(&self) -> PathBuf {
        self.store_dir.join(TOKEN_FILE)
    }
}

impl TokenStore for FileTokenStore {
    fn persist(&self, token: &SessionToken) -> Result<(), PlaygateError> {
        let target_path = self.token_path();
        let temp_path = self.store_dir.join(format!("{}.tmp", TOKEN_FILE));

        let json = serde_json::to_string(token)
            .map_err(|e| PlaygateError::StoreIO(format!("Failed to serialize token: {}", e)))?;

        fs::write(&temp_path, &json)
            .map_err(|e| PlaygateError::StoreIO(format!("Failed to write temp file: {}", e)))?;

        fs::rename(&temp_path, &target_path)
            .map_err(|e| PlaygateError::StoreIO(format!("Failed to rename token file: {}", e)))?;

        debug!(path = %target_path.display(), "Session token persisted");
        Ok(())
    }

    fn read(&self) -> Result<Option<SessionToken>, PlaygateError> {
        let path = self.token_path();
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path)
            .map_err(|e| PlaygateError::StoreIO(format!("Failed to read token file: {}", e)))?;
        let token = serde_json::from_str(&json)
            .map_err(|e| PlaygateError::StoreIO(format!("Corrupt token file: {}", e)))?;
        Ok(Some(token))
    }

    fn clear(&self) -> Result<(), PlaygateError> {
        let path = self.token_path();
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| PlaygateError::StoreIO(format!("Failed to delete token: {}", e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_token(token: &str) -> SessionToken {
        SessionToken {
            token: token.to_string(),
            user_id: "viewer@example.com".to_string(),
        }
    }

    #[test]
    fn test_token_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileTokenStore::with_path(temp_dir.path().to_path_buf()).unwrap();

        store.persist(&make_token("abc")).unwrap();
        assert_eq!(store.read().unwrap(), Some(make_token("abc")));
    }

    #[test]
    fn test_read_missing() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileTokenStore::with_path(temp_dir.path().to_path_buf()).unwrap();
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn test_overwrite_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileTokenStore::with_path(temp_dir.path().to_path_buf()).unwrap();

        store.persist(&make_token("first")).unwrap();
        store.persist(&make_token("second")).unwrap();

        assert_eq!(store.read().unwrap().unwrap().token, "second");
        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileTokenStore::with_path(temp_dir.path().to_path_buf()).unwrap();

        store.persist(&make_token("abc")).unwrap();
        store.clear().unwrap();
        assert!(store.read().unwrap().is_none());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_file_is_store_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileTokenStore::with_path(temp_dir.path().to_path_buf()).unwrap();
        fs::write(temp_dir.path().join(TOKEN_FILE), "not json").unwrap();
        assert!(matches!(store.read(), Err(PlaygateError::StoreIO(_))));
    }
}
