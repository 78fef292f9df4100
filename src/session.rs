//! Process-scoped user configuration: token, username, email.
//!
//! The session store has an explicit lifecycle: loaded lazily on first
//! read, invalidated explicitly before auth-sensitive reads, and written
//! atomically. The core operations never read process-global mutable state
//! — they accept a [`UserConfig`] as a parameter.

use std::fs;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::lane::LaneLog;

// ---------------------------------------------------------------------------
// UserConfig
// ---------------------------------------------------------------------------

/// The persisted user configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    /// Auth token, when logged in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Display username.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Contact email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserConfig {
    /// Build lane-creation log metadata from this config.
    #[must_use]
    pub fn lane_log(&self) -> LaneLog {
        LaneLog::now(self.username.clone(), self.email.clone())
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A lazily loaded, explicitly invalidated view of the user config file.
#[derive(Debug)]
pub struct Session {
    path: PathBuf,
    cached: Option<UserConfig>,
}

impl Session {
    /// Open a session backed by the config file at `path`. Nothing is read
    /// until [`Session::config`] is called.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: None,
        }
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current config, loading it on first access. A missing or
    /// unparseable file yields the default (empty) config.
    pub fn config(&mut self) -> &UserConfig {
        if self.cached.is_none() {
            self.cached = Some(self.read());
        }
        self.cached.as_ref().expect("populated above")
    }

    /// Drop the cached config so the next read hits the file. Call before
    /// auth-sensitive reads.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// Persist `config` atomically and cache it.
    ///
    /// # Errors
    /// I/O failure.
    pub fn save(&mut self, config: UserConfig) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(&config).expect("config serialization is infallible");
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        self.cached = Some(config);
        Ok(())
    }

    fn read(&self) -> UserConfig {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %self.path.display(),
                    "user config is unparseable, using defaults: {e}"
                );
                UserConfig::default()
            }),
            Err(_) => UserConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(dir.path().join("config.json"));
        assert_eq!(*session.config(), UserConfig::default());
    }

    #[test]
    fn save_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut session = Session::new(&path);
        session
            .save(UserConfig {
                token: Some("tok".into()),
                username: Some("dev".into()),
                email: Some("dev@example.com".into()),
            })
            .unwrap();

        let mut fresh = Session::new(&path);
        assert_eq!(fresh.config().username.as_deref(), Some("dev"));
    }

    #[test]
    fn invalidate_rereads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut session = Session::new(&path);
        assert!(session.config().token.is_none());

        // Another process writes the file.
        fs::write(&path, r#"{"token":"fresh"}"#).unwrap();
        // The cache still answers…
        assert!(session.config().token.is_none());
        // …until invalidated.
        session.invalidate();
        assert_eq!(session.config().token.as_deref(), Some("fresh"));
    }

    #[test]
    fn lane_log_carries_identity() {
        let config = UserConfig {
            token: None,
            username: Some("dev".into()),
            email: Some("dev@example.com".into()),
        };
        let log = config.lane_log();
        assert_eq!(log.username.as_deref(), Some("dev"));
        assert!(!log.date.is_empty());
    }
}
