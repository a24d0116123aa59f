//! JSON file persistence: one store per source under `<data_dir>/feed/` and
//! the global last update stamp.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use deunicode::deunicode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

use crate::entry::{sort_entries, time_tuple, CanonicalEntry};
use crate::error::{PlanetError, Result};

const FEED_DIR: &str = "feed";
const LAST_UPDATE_FILE: &str = "last_update.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Added,
    Updated,
}

/// The persisted entries of one source, unique by link.
#[derive(Debug)]
pub struct EntryStore {
    path: PathBuf,
    entries: Vec<CanonicalEntry>,
}

impl EntryStore {
    pub fn path_for(data_dir: &Path, source_name: &str) -> PathBuf {
        data_dir
            .join(FEED_DIR)
            .join(format!("{}.json", slugify(source_name)))
    }

    /// Loads the store of `source_name`. A missing file is a first run and
    /// yields an empty store, as does a file that cannot be read back.
    pub fn load(data_dir: &Path, source_name: &str) -> Self {
        let path = Self::path_for(data_dir, source_name);
        let entries = match Self::read_entries(&path) {
            Ok(Some(entries)) => entries,
            Ok(None) => {
                debug!("No store yet for '{}', starting empty", source_name);
                Vec::new()
            }
            Err(e) => {
                warn!("{}; rebuilding '{}' from an empty store", e, source_name);
                Vec::new()
            }
        };

        Self { path, entries }
    }

    /// Reads an existing store; `Ok(None)` when the file does not exist.
    pub fn read_entries(path: &Path) -> Result<Option<Vec<CanonicalEntry>>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PlanetError::StoreCorrupt {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| PlanetError::StoreCorrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[CanonicalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replaces the entry sharing the candidate's link, or appends it.
    pub fn merge(&mut self, candidate: CanonicalEntry) -> MergeOutcome {
        match self.entries.iter_mut().find(|e| e.link == candidate.link) {
            Some(existing) => {
                *existing = candidate;
                MergeOutcome::Updated
            }
            None => {
                self.entries.push(candidate);
                MergeOutcome::Added
            }
        }
    }

    /// Drops entries dated strictly before `now - horizon` and returns how
    /// many were removed. Without a horizon nothing is dropped.
    pub fn retain(&mut self, horizon: Option<Duration>, now: DateTime<Utc>) -> usize {
        let Some(horizon) = horizon else {
            return 0;
        };
        // A horizon reaching past the earliest representable date keeps everything
        let Some(cutoff) = now.checked_sub_signed(horizon) else {
            return 0;
        };
        let before = self.entries.len();
        self.entries.retain(|e| e.date >= cutoff);
        before - self.entries.len()
    }

    pub fn sort(&mut self) {
        sort_entries(&mut self.entries, |e| e.date);
    }

    /// Sorts and writes the whole store, replacing the previous file only
    /// once the new content is fully on disk.
    pub fn save(&mut self) -> Result<()> {
        self.sort();
        let json = serde_json::to_string_pretty(&self.entries)?;
        write_atomic(&self.path, json.as_bytes())
    }
}

#[derive(Serialize, Deserialize)]
struct LastUpdateFile {
    #[serde(with = "time_tuple")]
    last_update: DateTime<Utc>,
}

/// When the last ingestion run completed.
pub struct LastUpdate;

impl LastUpdate {
    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(LAST_UPDATE_FILE)
    }

    pub fn load(data_dir: &Path) -> Result<Option<DateTime<Utc>>> {
        let path = Self::path(data_dir);
        match fs::read_to_string(&path) {
            Ok(content) => {
                let file: LastUpdateFile = serde_json::from_str(&content)?;
                Ok(Some(file.last_update))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(data_dir: &Path, at: DateTime<Utc>) -> Result<()> {
        let json = serde_json::to_string(&LastUpdateFile { last_update: at })?;
        write_atomic(&Self::path(data_dir), json.as_bytes())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let persist_err = |source| PlanetError::Persist {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(persist_err)?;
    }

    let tmp = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp).map_err(persist_err)?;
    file.write_all(bytes).map_err(persist_err)?;
    file.sync_all().map_err(persist_err)?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        persist_err(e)
    })
}

/// Filesystem-safe storage key for a source name: lowercase ASCII letters
/// and digits separated by single dashes. Non-Latin scripts are
/// transliterated first.
pub fn slugify(name: &str) -> String {
    let ascii = deunicode(&name.nfkc().collect::<String>());
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;

    for ch in ascii.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "source".to_string()
    } else {
        slug
    }
}
