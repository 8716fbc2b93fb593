/// Storyboard project data model
///
/// Mirrors the JSON files on disk field for field. Every field carries a
/// serde default so records written by older builds still parse.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Projection returned by listing: enough to render a project picker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub last_modified: i64,
}

/// World-setting free-text fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordSettings {
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub art_style: String,
    #[serde(default)]
    pub summary: String,
}

/// Canvas coordinates for the character graph. Layout only, not
/// business-meaningful.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Asset reference relative to the projects root, if an avatar exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub appearance: String,
    #[serde(default)]
    pub position: Position,
}

/// Directed edge between two characters. Stored directed; a
/// bidirectional display is two edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub label: String,
}

/// One storyboard entry: image, description, dialogue and timing notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryboardShot {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dialogue: String,
    /// Shot duration in seconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub camera: String,
    #[serde(default)]
    pub sound: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub outline: String,
    #[serde(default)]
    pub conflict: String,
    /// Always written empty inside project.json; the shot list lives in
    /// scenes/<scene-id>.json and is paged in on demand.
    #[serde(default)]
    pub storyboard: Vec<StoryboardShot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

/// Root aggregate. One directory on disk per project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub last_modified: i64,
    #[serde(default)]
    pub word_settings: WordSettings,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

impl Project {
    /// Fresh project with the initial one-chapter/one-scene tree.
    pub fn new(name: impl Into<String>) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            created: timestamp,
            last_modified: timestamp,
            word_settings: WordSettings::default(),
            characters: Vec::new(),
            relationships: Vec::new(),
            chapters: vec![Chapter {
                id: format!("chap-{timestamp}"),
                title: "Chapter 1".to_string(),
                scenes: vec![Scene {
                    id: format!("scene-{timestamp}"),
                    title: "Scene 1".to_string(),
                    outline: String::new(),
                    conflict: String::new(),
                    storyboard: Vec::new(),
                }],
            }],
        }
    }

    /// Remove a character and prune every relationship that references
    /// it, keeping the source/target invariant intact.
    pub fn remove_character(&mut self, character_id: &str) -> bool {
        let before = self.characters.len();
        self.characters.retain(|c| c.id != character_id);
        if self.characters.len() == before {
            return false;
        }
        self.relationships
            .retain(|r| r.source != character_id && r.target != character_id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character(id: &str) -> Character {
        Character {
            id: id.to_string(),
            name: id.to_string(),
            avatar: None,
            background: String::new(),
            personality: String::new(),
            appearance: String::new(),
            position: Position::default(),
        }
    }

    #[test]
    fn test_new_project_shape() {
        let project = Project::new("My Story");
        assert_eq!(project.name, "My Story");
        assert_eq!(project.chapters.len(), 1);
        assert_eq!(project.chapters[0].title, "Chapter 1");
        assert_eq!(project.chapters[0].scenes.len(), 1);
        assert_eq!(project.chapters[0].scenes[0].title, "Scene 1");
        assert!(project.chapters[0].scenes[0].storyboard.is_empty());
        assert_eq!(project.created, project.last_modified);
    }

    #[test]
    fn test_remove_character_prunes_relationships() {
        let mut project = Project::new("p");
        project.characters = vec![character("a"), character("b"), character("c")];
        project.relationships = vec![
            Relationship {
                id: "r1".into(),
                source: "a".into(),
                target: "b".into(),
                label: "rivals".into(),
            },
            Relationship {
                id: "r2".into(),
                source: "b".into(),
                target: "c".into(),
                label: "siblings".into(),
            },
        ];

        assert!(project.remove_character("b"));
        assert_eq!(project.characters.len(), 2);
        assert!(project.relationships.is_empty());

        assert!(!project.remove_character("missing"));
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let project = Project::new("p");
        let json = serde_json::to_string(&project).unwrap();
        assert!(json.contains("\"lastModified\""));
        assert!(json.contains("\"wordSettings\""));
        assert!(json.contains("\"targetAudience\""));
    }

    #[test]
    fn test_older_records_fill_defaults() {
        let json = r#"{"id":"x","name":"old"}"#;
        let project: Project = serde_json::from_str(json).unwrap();
        assert_eq!(project.id, "x");
        assert!(project.chapters.is_empty());
        assert_eq!(project.word_settings.summary, "");
    }
}
