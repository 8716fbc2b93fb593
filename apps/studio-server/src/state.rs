use std::path::PathBuf;
use std::sync::Arc;

use assets::AssetResolver;
use generation::{GenerationRelay, RelayConfig, TemplateLibrary};
use project::{ProjectStore, SettingsStore};

pub type SharedState = Arc<AppState>;

/// Everything the handlers need; cheap to share behind an Arc.
pub struct AppState {
    pub store: ProjectStore,
    pub settings: SettingsStore,
    pub resolver: AssetResolver,
    pub relay: GenerationRelay,
}

impl AppState {
    pub fn new(projects_root: PathBuf, settings_path: PathBuf) -> Self {
        Self {
            store: ProjectStore::new(&projects_root),
            settings: SettingsStore::new(settings_path),
            resolver: AssetResolver::new(&projects_root),
            relay: GenerationRelay::new(TemplateLibrary::builtin()),
        }
    }

    /// Relay view of the current settings, reloaded per call so edits
    /// in the settings dialog take effect immediately.
    pub async fn relay_config(&self) -> RelayConfig {
        let settings = self.settings.load().await;
        RelayConfig {
            provider: settings.provider,
            api_key: settings.api_key,
            text_model: settings.text_model,
            image_model: settings.image_model,
            language: settings.language,
        }
    }
}
