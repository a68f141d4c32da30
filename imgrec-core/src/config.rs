//! User settings, read from an optional JSON file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{AutomationError, Result};
use crate::input::MoveProfile;
use crate::matcher::DEFAULT_THRESHOLD;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding `<name>.json` scripts.
    pub script_dir: PathBuf,
    /// Minimum correlation score for a template match.
    pub threshold: f32,
    /// Recorder polling interval.
    pub poll_interval_ms: u64,
    /// Duration of the eased pointer move before each click.
    pub move_duration_ms: u64,
    /// Number of intermediate positions in that move.
    pub move_steps: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            script_dir: PathBuf::from("scripts"),
            threshold: DEFAULT_THRESHOLD,
            poll_interval_ms: 50,
            move_duration_ms: 200,
            move_steps: 20,
        }
    }
}

impl Settings {
    /// Read settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let settings: Settings = serde_json::from_str(&text).map_err(|e| {
            AutomationError::ConfigError(format!("{}: {e}", path.display()))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(AutomationError::ConfigError(format!(
                "threshold {} outside [0, 1]",
                self.threshold
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(AutomationError::ConfigError(
                "poll_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn move_profile(&self) -> MoveProfile {
        MoveProfile {
            duration: Duration::from_millis(self.move_duration_ms),
            steps: self.move_steps,
        }
    }
}
