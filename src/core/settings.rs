use crate::core::io::Storage;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub const SETTINGS_KEY: &str = "gemini_settings.json";

/// Number of candidates generated per scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum ImageCount {
    One,
    #[default]
    Two,
}

impl ImageCount {
    pub fn get(self) -> usize {
        match self {
            ImageCount::One => 1,
            ImageCount::Two => 2,
        }
    }
}

impl TryFrom<u8> for ImageCount {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ImageCount::One),
            2 => Ok(ImageCount::Two),
            other => Err(format!("image count must be 1 or 2, got {}", other)),
        }
    }
}

impl From<ImageCount> for u8 {
    fn from(value: ImageCount) -> Self {
        value.get() as u8
    }
}

impl fmt::Display for ImageCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageCount::One => f.write_str("1 image (saves API quota)"),
            ImageCount::Two => f.write_str("2 images (more choice)"),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub image_count: ImageCount,
}

// Keeps the key out of debug logs.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<set>"))
            .field("image_count", &self.image_count)
            .finish()
    }
}

impl Settings {
    /// Blank keys are stored as absent so the fallback credential applies.
    pub fn normalized(mut self) -> Self {
        self.api_key = self
            .api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        self
    }

    /// Storage key of the settings entry inside `data_folder`.
    pub fn storage_key(data_folder: &str) -> String {
        Path::new(data_folder)
            .join(SETTINGS_KEY)
            .to_string_lossy()
            .to_string()
    }

    pub async fn load(storage: &dyn Storage, key: &str) -> Self {
        match Self::try_load(storage, key).await {
            Ok(Some(settings)) => settings,
            Ok(None) => Self::default(),
            Err(e) => {
                log::warn!("Ignoring unreadable settings: {:#}", e);
                Self::default()
            }
        }
    }

    async fn try_load(storage: &dyn Storage, key: &str) -> Result<Option<Self>> {
        if !storage.exists(key).await? {
            return Ok(None);
        }
        let bytes = storage.read(key).await?;
        let settings: Settings =
            serde_json::from_slice(&bytes).context("Failed to parse settings")?;
        Ok(Some(settings.normalized()))
    }

    pub async fn save(&self, storage: &dyn Storage, key: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        storage
            .write(key, content.as_bytes())
            .await
            .context("Failed to save settings")
    }
}
