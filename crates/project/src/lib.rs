/// Project persistence for StoryBuilder
///
/// Owns the directory-per-project JSON layout, the one-time migration
/// from the legacy flat-file layout, and the global settings record.
use std::path::PathBuf;

pub mod model;
pub mod settings;
pub mod store;

pub use model::{
    Chapter, Character, Position, Project, ProjectMetadata, Relationship, Scene, StoryboardShot,
    WordSettings,
};
pub use settings::{GlobalSettings, SettingsStore};
pub use store::{MigrationOutcome, ProjectStore, StoreError};

pub fn app_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| std::env::temp_dir());
    base.join("storybuilder")
}

/// Root directory holding one sub-directory per project.
pub fn projects_dir() -> PathBuf {
    app_data_dir().join("storyprojects")
}

/// Location of the single global settings record.
pub fn settings_file() -> PathBuf {
    app_data_dir().join("settings.json")
}
