//! Recorded actions and their on-disk store.
//!
//! A script is one pretty-printed JSON file `<script_dir>/<name>.json`
//! holding an ordered array of action objects:
//!
//! ```json
//! [
//!   {
//!     "action": "click",
//!     "button": "left",
//!     "x": 100,
//!     "y": 100,
//!     "delay": 0.35,
//!     "timestamp": "14:03:07.123456"
//!   }
//! ]
//! ```
//!
//! There is no locking: concurrent writers to the same name race and the
//! last write wins.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::errors::{AutomationError, Result};
use crate::input::MouseButton;

/// File extension of persisted scripts.
pub const SCRIPT_EXTENSION: &str = "json";

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    /// Any kind this build does not know how to replay.
    #[serde(other)]
    Other,
}

/// One recorded pointer event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "action")]
    pub kind: ActionKind,
    pub button: MouseButton,
    pub x: i32,
    pub y: i32,
    /// Seconds since the previous action (or session start), 2 decimals.
    pub delay: f64,
    /// Wall-clock time of the event; informational only.
    #[serde(default)]
    pub timestamp: String,
}

impl Action {
    pub fn click(button: MouseButton, x: i32, y: i32, delay_secs: f64, timestamp: String) -> Self {
        Self {
            kind: ActionKind::Click,
            button,
            x,
            y,
            delay: round_delay(delay_secs),
            timestamp,
        }
    }
}

/// Round a delay to hundredths of a second, never negative.
pub fn round_delay(secs: f64) -> f64 {
    ((secs.max(0.0)) * 100.0).round() / 100.0
}

/// Ordered list of actions; insertion order is replay order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptSequence(Vec<Action>);

impl ScriptSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        self.0.push(action);
    }

    pub fn actions(&self) -> &[Action] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.0.iter()
    }

    /// Sum of all delays, in seconds.
    pub fn total_delay(&self) -> f64 {
        self.0.iter().map(|a| a.delay).sum()
    }
}

impl From<Vec<Action>> for ScriptSequence {
    fn from(actions: Vec<Action>) -> Self {
        Self(actions)
    }
}

impl<'a> IntoIterator for &'a ScriptSequence {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Default script name: `script_YYYYmmdd_HHMMSS` in local time.
pub fn generated_name() -> String {
    format!("script_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0')
    {
        return Err(AutomationError::ScriptError(format!(
            "invalid script name '{name}'"
        )));
    }
    Ok(())
}

/// Owns the on-disk script directory.
#[derive(Debug, Clone)]
pub struct ScriptStore {
    dir: PathBuf,
}

impl ScriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{SCRIPT_EXTENSION}"))
    }

    /// Persist `sequence` under `name` (or a generated one).
    ///
    /// Returns `Ok(None)` without touching the disk when the sequence is
    /// empty.  An existing script with the same name is overwritten.
    pub fn save(&self, sequence: &ScriptSequence, name: Option<&str>) -> Result<Option<PathBuf>> {
        if sequence.is_empty() {
            log::debug!("empty sequence, nothing saved");
            return Ok(None);
        }
        let name = match name {
            Some(n) => n.to_owned(),
            None => generated_name(),
        };
        validate_name(&name)?;

        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&name);
        let json = serde_json::to_string_pretty(sequence)?;
        std::fs::write(&path, json)?;
        log::info!("saved {} action(s) to {}", sequence.len(), path.display());
        Ok(Some(path))
    }

    /// Load the script called `name`; `Ok(None)` if it does not exist.
    pub fn load(&self, name: &str) -> Result<Option<ScriptSequence>> {
        validate_name(name)?;
        let path = self.path_for(name);
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let sequence = serde_json::from_str(&text).map_err(|e| {
            AutomationError::ScriptError(format!("malformed script {}: {e}", path.display()))
        })?;
        Ok(Some(sequence))
    }

    /// Names of all saved scripts, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    /// Name of the most recently written script.
    pub fn latest(&self) -> Result<Option<String>> {
        Ok(self
            .entries()?
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
            .map(|(name, _)| name))
    }

    fn entries(&self) -> Result<Vec<(String, SystemTime)>> {
        let read = match std::fs::read_dir(&self.dir) {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for entry in read {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SCRIPT_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let modified = std::fs::metadata(&path)?
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push((stem.to_owned(), modified));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
