//! Profile files under `saves/`
//!
//! Each profile is `saves/<name>.json`. `saves/.last_profile` holds the
//! name of the last profile saved or loaded, read once at startup.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::model::Profile;

const LAST_PROFILE_FILE: &str = ".last_profile";
const EXTENSION: &str = "json";

/// Errors raised by profile persistence
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("invalid profile name {0:?}")]
    InvalidName(String),

    #[error("profile '{0}' not found")]
    NotFound(String),

    #[error("profile I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("profile {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid profile format: {0}")]
    Invalid(String),
}

/// Directory of saved profiles
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

fn validate_name(name: &str) -> Result<&str, ProfileError> {
    let trimmed = name.trim();
    let bad = trimmed.is_empty()
        || trimmed.starts_with('.')
        || trimmed.contains(['/', '\\'])
        || trimmed.contains("..");
    if bad {
        return Err(ProfileError::InvalidName(name.to_string()));
    }
    Ok(trimmed)
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[cfg(test)]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf, ProfileError> {
        let name = validate_name(name)?;
        Ok(self.dir.join(format!("{}.{}", name, EXTENSION)))
    }

    pub fn save(&self, name: &str, profile: &Profile) -> Result<PathBuf, ProfileError> {
        let path = self.path_for(name)?;
        let io_err = |source| ProfileError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        let body = serde_json::to_string_pretty(&profile.to_json()).map_err(|source| {
            ProfileError::Parse {
                path: path.clone(),
                source,
            }
        })?;
        std::fs::write(&path, body).map_err(io_err)?;

        info!(?path, "profile saved");
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<Profile, ProfileError> {
        let path = self.path_for(name)?;
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ProfileError::NotFound(name.trim().to_string()))
            }
            Err(source) => return Err(ProfileError::Io { path, source }),
        };

        let value: serde_json::Value = serde_json::from_str(&text).map_err(|source| {
            ProfileError::Parse {
                path: path.clone(),
                source,
            }
        })?;
        let profile = Profile::from_json(&value)?;
        debug!(?path, "profile read");
        Ok(profile)
    }

    /// Profile names, sorted
    pub fn list(&self) -> Result<Vec<String>, ProfileError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ProfileError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == EXTENSION))
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .filter(|name| validate_name(name).is_ok())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Name recorded by the last save or load, if any.
    ///
    /// Older pointers hold a full path to the profile; only its stem is kept.
    pub fn last_profile(&self) -> Option<String> {
        let raw = std::fs::read_to_string(self.dir.join(LAST_PROFILE_FILE)).ok()?;
        let raw = raw.trim();
        let name = if raw.ends_with(".json") {
            Path::new(raw).file_stem()?.to_str()?
        } else {
            raw
        };
        validate_name(name).ok().map(str::to_string)
    }

    pub fn set_last_profile(&self, name: &str) -> Result<(), ProfileError> {
        let name = validate_name(name)?;
        let path = self.dir.join(LAST_PROFILE_FILE);
        std::fs::create_dir_all(&self.dir)
            .and_then(|()| std::fs::write(&path, name))
            .map_err(|source| ProfileError::Io { path, source })
    }

    pub fn clear_last_profile(&self) -> Result<(), ProfileError> {
        let path = self.dir.join(LAST_PROFILE_FILE);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ProfileError::Io { path, source }),
        }
    }
}
