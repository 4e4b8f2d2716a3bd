//! Durable per-player trophy records.
//!
//! Profiles are keyed by player id. The file store spreads them across
//! `shard_<n>` directories using a hash-mod of the id's first character.

use crate::error::ServerError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub trophies: u32,
}

pub trait ProfileStore: Send + Sync {
    /// Returns `Ok(None)` for players with no record yet.
    fn load(&self, player_id: &str) -> Result<Option<Profile>, ServerError>;
    fn save(&self, player_id: &str, profile: &Profile) -> Result<(), ServerError>;
}

pub struct FileProfileStore {
    root: PathBuf,
    shards: u32,
}

impl FileProfileStore {
    pub fn new(root: impl Into<PathBuf>, shards: u32) -> Self {
        Self {
            root: root.into(),
            shards: shards.max(1),
        }
    }

    pub fn shard_of(&self, player_id: &str) -> u32 {
        player_id.chars().next().map(|c| c as u32).unwrap_or(0) % self.shards
    }

    pub fn profile_path(&self, player_id: &str) -> PathBuf {
        self.root
            .join(format!("shard_{}", self.shard_of(player_id)))
            .join(format!("{}.json", encode_file_name(player_id)))
    }
}

/// Percent-encodes everything outside `[A-Za-z0-9_-]` so ids like `../x`
/// cannot leave their shard directory.
fn encode_file_name(player_id: &str) -> String {
    let mut encoded = String::with_capacity(player_id.len());
    for byte in player_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "%{:02X}", byte);
        }
    }
    encoded
}

impl ProfileStore for FileProfileStore {
    fn load(&self, player_id: &str) -> Result<Option<Profile>, ServerError> {
        let path = self.profile_path(player_id);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ServerError::persistence(player_id, e)),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| ServerError::persistence(player_id, e))
    }

    fn save(&self, player_id: &str, profile: &Profile) -> Result<(), ServerError> {
        let path = self.profile_path(player_id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| ServerError::persistence(player_id, e))?;
        }

        let json = serde_json::to_string_pretty(profile)
            .map_err(|e| ServerError::persistence(player_id, e))?;
        write_atomically(&path, json.as_bytes()).map_err(|e| ServerError::persistence(player_id, e))
    }
}

// Write-then-rename so a crash mid-save never leaves a truncated record.
fn write_atomically(path: &Path, data: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)
}

/// In-memory store for tests and storage-less deployments.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<String, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(self, player_id: &str, profile: Profile) -> Self {
        if let Ok(mut profiles) = self.profiles.lock() {
            profiles.insert(player_id.to_string(), profile);
        }
        self
    }
}

fn poisoned(player_id: &str) -> ServerError {
    let cause = io::Error::new(io::ErrorKind::Other, "store poisoned");
    ServerError::persistence(player_id, cause)
}

impl ProfileStore for MemoryProfileStore {
    fn load(&self, player_id: &str) -> Result<Option<Profile>, ServerError> {
        let profiles = self.profiles.lock().map_err(|_| poisoned(player_id))?;
        Ok(profiles.get(player_id).copied())
    }

    fn save(&self, player_id: &str, profile: &Profile) -> Result<(), ServerError> {
        let mut profiles = self.profiles.lock().map_err(|_| poisoned(player_id))?;
        profiles.insert(player_id.to_string(), *profile);
        Ok(())
    }
}
