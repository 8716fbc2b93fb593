/// Global settings record
///
/// Single JSON file at a fixed per-user location, loaded on demand and
/// written wholesale. Defaults fill in when the file is absent,
/// unparseable, or written by an older build.
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::store::StoreError;

fn default_provider() -> String {
    "volcengine".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Provider identifier ("volcengine", "openai") or a custom
    /// OpenAI-compatible base URL.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    /// Chat-completion model id.
    #[serde(default)]
    pub text_model: String,
    /// Image-generation model id.
    #[serde(default)]
    pub image_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_model: Option<String>,
    /// UI language code; drives the response-language instruction.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: String::new(),
            text_model: String::new(),
            image_model: String::new(),
            video_model: None,
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Never fails for "not configured": a missing or malformed file
    /// yields the defaults.
    pub async fn load(&self) -> GlobalSettings {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("settings file not found, using defaults");
                return GlobalSettings::default();
            }
            Err(err) => {
                warn!(%err, "settings file unreadable, using defaults");
                return GlobalSettings::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(err) => {
                warn!(%err, "settings file malformed, using defaults");
                GlobalSettings::default()
            }
        }
    }

    /// Overwrite the record wholesale; no partial merge.
    pub async fn save(&self, settings: &GlobalSettings) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        let settings = store.load().await;
        assert_eq!(settings.api_key, "");
        assert_eq!(settings.provider, "volcengine");
        assert_eq!(settings.language, "en");
    }

    #[tokio::test]
    async fn test_malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json at all").unwrap();
        let settings = SettingsStore::new(&path).load().await;
        assert_eq!(settings.text_model, "");
    }

    #[tokio::test]
    async fn test_older_records_fill_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"apiKey":"sk-test","textModel":"skylark"}"#).unwrap();

        let settings = SettingsStore::new(&path).load().await;
        assert_eq!(settings.api_key, "sk-test");
        assert_eq!(settings.text_model, "skylark");
        assert_eq!(settings.image_model, "");
        assert!(settings.video_model.is_none());
        assert_eq!(settings.language, "en");
    }

    #[tokio::test]
    async fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("nested").join("settings.json"));
        let mut settings = GlobalSettings::default();
        settings.api_key = "sk-abc".to_string();
        settings.language = "zh".to_string();
        store.save(&settings).await.unwrap();

        let loaded = store.load().await;
        assert_eq!(loaded.api_key, "sk-abc");
        assert_eq!(loaded.language, "zh");
    }
}
