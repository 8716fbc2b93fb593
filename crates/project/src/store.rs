/// File-system-backed project storage
///
/// Layout under the store root, one sub-directory per project:
///
///   <root>/<project-id>/project.json          project minus storyboards
///   <root>/<project-id>/scenes/<scene-id>.json  shot list for that scene
///   <root>/<project-id>/avatars/<file>          generated/uploaded images
///
/// The legacy layout was a flat `<root>/<project-id>.json` holding the
/// full project; `migrate_legacy` moves those into directory form once.
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

use crate::model::{Project, ProjectMetadata, StoryboardShot};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("project storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("project serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Per-file result of a legacy migration pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOutcome {
    /// Flat file name the entry came from, e.g. `abc123.json`.
    pub file: String,
    pub migrated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Durable storage for projects under a root directory.
///
/// Assumes a single active writer per project id; overlapping saves of
/// the same project are last-write-wins.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn project_file(&self, id: &str) -> PathBuf {
        self.project_dir(id).join("project.json")
    }

    fn scene_file(&self, project_id: &str, scene_id: &str) -> PathBuf {
        self.project_dir(project_id)
            .join("scenes")
            .join(format!("{scene_id}.json"))
    }

    pub async fn ensure_root(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Metadata for every readable project, newest first. Entries whose
    /// `project.json` is missing or malformed are skipped, not fatal.
    pub async fn list(&self) -> Result<Vec<ProjectMetadata>, StoreError> {
        self.ensure_root().await?;
        let mut projects = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let file = entry.path().join("project.json");
            let raw = match fs::read_to_string(&file).await {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(path = %file.display(), %err, "skipping project without readable project.json");
                    continue;
                }
            };
            match serde_json::from_str::<ProjectMetadata>(&raw) {
                Ok(meta) => projects.push(meta),
                Err(err) => {
                    warn!(path = %file.display(), %err, "skipping project with malformed project.json");
                }
            }
        }
        projects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(projects)
    }

    /// Allocate a new project with the initial chapter/scene tree and
    /// persist it.
    pub async fn create(&self, name: &str) -> Result<Project, StoreError> {
        self.ensure_root().await?;
        let project = Project::new(name);
        fs::create_dir_all(self.project_dir(&project.id).join("scenes")).await?;
        write_json(&self.project_file(&project.id), &project).await?;
        Ok(project)
    }

    /// `None` when the project is missing or its file is unparseable;
    /// callers branch on absence, not on errors.
    pub async fn load(&self, id: &str) -> Result<Option<Project>, StoreError> {
        let file = self.project_file(id);
        let raw = match fs::read_to_string(&file).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(project = id, "project.json not found");
                return Ok(None);
            }
            Err(err) => {
                warn!(project = id, %err, "project.json unreadable, treating as absent");
                return Ok(None);
            }
        };
        match serde_json::from_str(&raw) {
            Ok(project) => Ok(Some(project)),
            Err(err) => {
                warn!(project = id, %err, "project.json malformed, treating as absent");
                Ok(None)
            }
        }
    }

    /// Persist a project. Non-empty scene storyboards are split out to
    /// `scenes/<scene-id>.json` and the embedded field is written empty,
    /// keeping `project.json` small. A scene whose in-tree storyboard is
    /// empty leaves its scene file untouched, so a load/save cycle never
    /// drops paged-out shot lists.
    ///
    /// A failed scene-file write fails the whole save; scene files go
    /// first so `project.json` is only rewritten after they land.
    pub async fn save(&self, project: &Project) -> Result<(), StoreError> {
        let mut project = project.clone();
        project.last_modified = chrono::Utc::now().timestamp_millis();

        let scenes_dir = self.project_dir(&project.id).join("scenes");
        fs::create_dir_all(&scenes_dir).await?;

        for chapter in &mut project.chapters {
            for scene in &mut chapter.scenes {
                if scene.storyboard.is_empty() {
                    continue;
                }
                write_json(&self.scene_file(&project.id, &scene.id), &scene.storyboard).await?;
                scene.storyboard = Vec::new();
            }
        }

        write_json(&self.project_file(&project.id), &project).await?;
        Ok(())
    }

    /// Shot list for one scene; empty when the file is absent or
    /// malformed.
    pub async fn load_scene_storyboard(
        &self,
        project_id: &str,
        scene_id: &str,
    ) -> Result<Vec<StoryboardShot>, StoreError> {
        let file = self.scene_file(project_id, scene_id);
        let raw = match fs::read_to_string(&file).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(project = project_id, scene = scene_id, "no storyboard file");
                return Ok(Vec::new());
            }
            Err(err) => {
                warn!(project = project_id, scene = scene_id, %err, "storyboard file unreadable");
                return Ok(Vec::new());
            }
        };
        match serde_json::from_str(&raw) {
            Ok(shots) => Ok(shots),
            Err(err) => {
                warn!(project = project_id, scene = scene_id, %err, "storyboard file malformed");
                Ok(Vec::new())
            }
        }
    }

    /// Remove a project directory recursively. Absence counts as
    /// success.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        match fs::remove_dir_all(self.project_dir(id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// One-time migration from the flat legacy layout. Each
    /// `<root>/<id>.json` (except `settings.json`) becomes
    /// `<root>/<id>/project.json` with a `scenes` sub-directory.
    /// Idempotent: already-migrated projects have no flat file left, so
    /// a second pass is a no-op. Per-file failures are reported in the
    /// outcome list and do not abort the pass.
    pub async fn migrate_legacy(&self) -> Result<Vec<MigrationOutcome>, StoreError> {
        self.ensure_root().await?;
        let mut outcomes = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.ends_with(".json") || file_name == "settings.json" {
                continue;
            }
            let id = file_name.trim_end_matches(".json").to_string();
            match self.migrate_one(&entry.path(), &id).await {
                Ok(()) => {
                    debug!(project = %id, "migrated legacy project file");
                    outcomes.push(MigrationOutcome {
                        file: file_name,
                        migrated: true,
                        error: None,
                    });
                }
                Err(err) => {
                    warn!(project = %id, %err, "legacy migration failed for project file");
                    outcomes.push(MigrationOutcome {
                        file: file_name,
                        migrated: false,
                        error: Some(err.to_string()),
                    });
                }
            }
        }
        Ok(outcomes)
    }

    async fn migrate_one(&self, flat_file: &Path, id: &str) -> Result<(), StoreError> {
        fs::create_dir_all(self.project_dir(id).join("scenes")).await?;
        fs::rename(flat_file, self.project_file(id)).await?;
        Ok(())
    }
}

/// Pretty-printed (2-space) UTF-8 JSON, matching the legacy writer so
/// files stay human-diffable.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Scene, StoryboardShot};

    fn shot(id: &str, description: &str) -> StoryboardShot {
        StoryboardShot {
            id: id.to_string(),
            image: None,
            description: description.to_string(),
            dialogue: String::new(),
            duration: 3.5,
            camera: "wide".to_string(),
            sound: String::new(),
        }
    }

    fn store() -> (tempfile::TempDir, ProjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_create_makes_directory_layout() {
        let (_dir, store) = store();
        let project = store.create("Layout").await.unwrap();

        assert!(store.project_dir(&project.id).join("project.json").is_file());
        assert!(store.project_dir(&project.id).join("scenes").is_dir());
    }

    #[tokio::test]
    async fn test_save_load_round_trip_splits_storyboards() {
        let (_dir, store) = store();
        let mut project = store.create("Round Trip").await.unwrap();
        let scene_id = project.chapters[0].scenes[0].id.clone();
        project.chapters[0].scenes[0].storyboard = vec![shot("s1", "opening"), shot("s2", "chase")];

        store.save(&project).await.unwrap();

        let loaded = store.load(&project.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Round Trip");
        assert!(loaded.chapters[0].scenes[0].storyboard.is_empty());
        assert!(loaded.last_modified >= project.last_modified);

        let shots = store
            .load_scene_storyboard(&project.id, &scene_id)
            .await
            .unwrap();
        assert_eq!(shots.len(), 2);
        assert_eq!(shots[0].description, "opening");
        assert_eq!(shots[1].description, "chase");
    }

    #[tokio::test]
    async fn test_resave_with_empty_storyboard_keeps_scene_file() {
        let (_dir, store) = store();
        let mut project = store.create("Keep Shots").await.unwrap();
        let scene_id = project.chapters[0].scenes[0].id.clone();
        project.chapters[0].scenes[0].storyboard = vec![shot("s1", "kept")];
        store.save(&project).await.unwrap();

        // Typical editor cycle: load (embedded storyboard comes back
        // empty), tweak metadata, save again.
        let mut loaded = store.load(&project.id).await.unwrap().unwrap();
        loaded.name = "Renamed".to_string();
        store.save(&loaded).await.unwrap();

        let shots = store
            .load_scene_storyboard(&project.id, &scene_id)
            .await
            .unwrap();
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].description, "kept");
    }

    #[tokio::test]
    async fn test_load_missing_and_malformed_are_none() {
        let (dir, store) = store();
        assert!(store.load("missing").await.unwrap().is_none());

        std::fs::create_dir_all(dir.path().join("broken")).unwrap();
        std::fs::write(dir.path().join("broken/project.json"), "{not json").unwrap();
        assert!(store.load("broken").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listing_skips_corrupt_entries_and_sorts() {
        let (dir, store) = store();

        for (id, modified) in [("p-old", 100i64), ("p-new", 200)] {
            let dir_path = dir.path().join(id);
            std::fs::create_dir_all(dir_path.join("scenes")).unwrap();
            let mut project = Project::new(id);
            project.id = id.to_string();
            project.last_modified = modified;
            std::fs::write(
                dir_path.join("project.json"),
                serde_json::to_string_pretty(&project).unwrap(),
            )
            .unwrap();
        }
        // One directory without project.json, one with garbage.
        std::fs::create_dir_all(dir.path().join("empty-dir")).unwrap();
        std::fs::create_dir_all(dir.path().join("corrupt")).unwrap();
        std::fs::write(dir.path().join("corrupt/project.json"), "garbage").unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "p-new");
        assert_eq!(listed[1].id, "p-old");
    }

    #[tokio::test]
    async fn test_delete_is_recursive_and_absence_is_success() {
        let (_dir, store) = store();
        let mut project = store.create("Doomed").await.unwrap();
        project.chapters[0].scenes[0].storyboard = vec![shot("s1", "x")];
        store.save(&project).await.unwrap();

        store.delete(&project.id).await.unwrap();
        assert!(store.load(&project.id).await.unwrap().is_none());

        // Deleting again is still success.
        store.delete(&project.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_legacy_migration_is_idempotent() {
        let (dir, store) = store();

        for id in ["legacy-a", "legacy-b"] {
            let mut project = Project::new(id);
            project.id = id.to_string();
            std::fs::write(
                dir.path().join(format!("{id}.json")),
                serde_json::to_string_pretty(&project).unwrap(),
            )
            .unwrap();
        }
        // The settings record must be left alone.
        std::fs::write(dir.path().join("settings.json"), "{}").unwrap();

        let outcomes = store.migrate_legacy().await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.migrated));

        for id in ["legacy-a", "legacy-b"] {
            assert!(!dir.path().join(format!("{id}.json")).exists());
            assert!(dir.path().join(id).join("project.json").is_file());
            assert!(dir.path().join(id).join("scenes").is_dir());
            assert!(store.load(id).await.unwrap().is_some());
        }
        assert!(dir.path().join("settings.json").is_file());

        // Second pass finds nothing to do and changes nothing.
        let outcomes = store.migrate_legacy().await.unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(store.list().await.unwrap().len(), 2);
    }
}
