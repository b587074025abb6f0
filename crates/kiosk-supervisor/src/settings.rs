//! Persisted supervisor settings.
//!
//! A small JSON file (`{ "printerName": .., "kioskId": .. }`) in the
//! per-user config directory. The kiosk identity is generated and written
//! on first load so it stays stable for the device.

use std::io;
use std::path::{Path, PathBuf};

use kiosk_core::KioskId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SupervisorError};

const SETTINGS_DIR: &str = "badge-kiosk";
const SETTINGS_FILE: &str = "settings.json";

/// Settings shared with the supervised children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorSettings {
    #[serde(default)]
    pub printer_name: String,
    pub kiosk_id: KioskId,
}

/// Partial update sent by `save-config`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsUpdate {
    pub printer_name: Option<String>,
    pub kiosk_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoredSettings {
    printer_name: String,
    kiosk_id: Option<String>,
}

/// Reads and writes the settings file.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/badge-kiosk/settings.json`, if the platform has one.
    pub fn default_location() -> Option<PathBuf> {
        directories::BaseDirs::new()
            .map(|base| base.config_dir().join(SETTINGS_DIR).join(SETTINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the settings, creating the file with a fresh kiosk identity if
    /// it is missing or has none.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::Settings` if the file is not valid JSON and
    /// `SupervisorError::Io` if it cannot be read or written.
    pub async fn load(&self) -> Result<SupervisorSettings> {
        let stored = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => serde_json::from_str::<StoredSettings>(&text).map_err(|e| {
                SupervisorError::settings(format!("{}: {e}", self.path.display()))
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No settings file yet");
                StoredSettings::default()
            }
            Err(e) => return Err(e.into()),
        };

        let kiosk_id = stored.kiosk_id.as_deref().and_then(|id| match KioskId::new(id) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Ignoring stored kiosk id: {}", e);
                None
            }
        });

        match kiosk_id {
            Some(kiosk_id) => Ok(SupervisorSettings {
                printer_name: stored.printer_name,
                kiosk_id,
            }),
            None => {
                let settings = SupervisorSettings {
                    printer_name: stored.printer_name,
                    kiosk_id: KioskId::generate(),
                };
                info!(kiosk_id = %settings.kiosk_id, "Generated kiosk identity");
                self.save(&settings).await?;
                Ok(settings)
            }
        }
    }

    /// Write `settings`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::Io` if the file cannot be written.
    pub async fn save(&self, settings: &SupervisorSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| SupervisorError::settings(e.to_string()))?;
        tokio::fs::write(&self.path, json).await?;
        debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }

    /// Apply `update` on top of the stored settings and save the result.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::Settings` if the new kiosk id is invalid.
    pub async fn update(&self, update: SettingsUpdate) -> Result<SupervisorSettings> {
        let mut settings = self.load().await?;
        if let Some(printer_name) = update.printer_name {
            settings.printer_name = printer_name.trim().to_string();
        }
        if let Some(kiosk_id) = update.kiosk_id {
            settings.kiosk_id =
                KioskId::new(&kiosk_id).map_err(|e| SupervisorError::settings(e.to_string()))?;
        }
        self.save(&settings).await?;
        info!(printer = %settings.printer_name, kiosk_id = %settings.kiosk_id, "Settings updated");
        Ok(settings)
    }
}
