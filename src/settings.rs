use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

use crate::timer::state::{BREAK_DEFAULT_MINUTES, FOCUS_DEFAULT_MINUTES};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerSettings {
    pub focus_minutes: u32,
    pub break_minutes: u32,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            focus_minutes: FOCUS_DEFAULT_MINUTES,
            break_minutes: BREAK_DEFAULT_MINUTES,
        }
    }
}

/// External capture command that writes one PNG frame to stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            command: "fswebcam".into(),
            args: vec!["--no-banner".into(), "--png".into(), "9".into(), "-".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorSettings {
    pub endpoint: String,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8787".into(),
        }
    }
}

/// The user sessions are recorded against. Absent means sessions are not
/// persisted (the timer still runs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachedUser {
    pub user_id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    timer: TimerSettings,
    capture: CaptureSettings,
    detector: DetectorSettings,
    user: Option<AttachedUser>,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn timer(&self) -> TimerSettings {
        self.data.read().unwrap().timer.clone()
    }

    pub fn capture(&self) -> CaptureSettings {
        self.data.read().unwrap().capture.clone()
    }

    pub fn detector(&self) -> DetectorSettings {
        self.data.read().unwrap().detector.clone()
    }

    pub fn user(&self) -> Option<AttachedUser> {
        self.data.read().unwrap().user.clone()
    }

    pub fn update_timer(&self, timer: TimerSettings) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            guard.timer = timer;
            self.persist(&guard)?;
        }
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.timer().focus_minutes, 25);
        assert_eq!(store.timer().break_minutes, 5);
        assert!(store.user().is_none());
    }

    #[test]
    fn timer_updates_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        store
            .update_timer(TimerSettings {
                focus_minutes: 50,
                break_minutes: 10,
            })
            .unwrap();

        let reloaded = SettingsStore::new(path).unwrap();
        assert_eq!(reloaded.timer().focus_minutes, 50);
        assert_eq!(reloaded.timer().break_minutes, 10);
    }

    #[test]
    fn corrupt_settings_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.timer().focus_minutes, 25);
    }
}
