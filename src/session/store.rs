//! Session file storage.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::Session;

/// Stores the session as pretty-printed JSON under
/// `<home>/.<appName>/session.json` with mode 0600.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(app_name: &str) -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Internal("could not determine home directory".into()))?;
        Ok(Self {
            path: home.join(format!(".{}", app_name)).join("session.json"),
        })
    }

    /// Store backed by an explicit file path.
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the session; `None` when no session file exists.
    ///
    /// A present but malformed file is a decode error, not `None`.
    pub fn load(&self) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let session: Session = serde_json::from_str(&content)?;
        Ok(Some(session))
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> SessionStore {
        SessionStore::at_path(dir.path().join(".twmd").join("session.json"))
    }

    #[test]
    fn test_load_absent_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(!store.exists());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let session = Session::new(vec![
            "auth_token=A; Domain=.x.com".to_string(),
            "ct0=C; Domain=.x.com".to_string(),
        ]);
        store.save(&session).unwrap();
        assert!(store.exists());

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.cookies, session.cookies);
        assert_eq!(loaded.updated_at, session.updated_at);
        assert_eq!(loaded.valid, session.valid);
    }

    #[cfg(unix)]
    #[test]
    fn test_save_sets_owner_only_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&Session::anonymous()).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_load_malformed_is_error() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&Session::anonymous()).unwrap();
        store.clear().unwrap();
        assert!(!store.exists());
        // clearing again is a no-op
        store.clear().unwrap();
    }
}
