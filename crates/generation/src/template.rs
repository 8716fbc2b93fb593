/// Prompt templates
///
/// Templates are a closed set keyed by generation type. Each template
/// declares the parameters it needs; those are validated before
/// substitution. `{{key}}` tokens are replaced by the string form of
/// the supplied value; unmatched tokens are left verbatim.
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::error::GenerationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    CharacterGen,
    SceneOutline,
    SceneStoryboard,
    ShotDescription,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CharacterGen => "character-gen",
            Self::SceneOutline => "scene-outline",
            Self::SceneStoryboard => "scene-storyboard",
            Self::ShotDescription => "shot-description",
        }
    }

    pub fn parse(value: &str) -> Result<Self, GenerationError> {
        match value {
            "character-gen" => Ok(Self::CharacterGen),
            "scene-outline" => Ok(Self::SceneOutline),
            "scene-storyboard" => Ok(Self::SceneStoryboard),
            "shot-description" => Ok(Self::ShotDescription),
            other => Err(GenerationError::UnknownKind(other.to_string())),
        }
    }

    /// Parameters the template cannot render meaningfully without.
    /// Extra keys are substituted too but never required.
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            Self::CharacterGen => &["summary", "hint"],
            Self::SceneOutline => &["summary", "sceneTitle"],
            Self::SceneStoryboard => &["outline", "conflict"],
            Self::ShotDescription => &["outline", "shot"],
        }
    }

    fn builtin(&self) -> &'static str {
        match self {
            Self::CharacterGen => include_str!("../templates/character-gen.txt"),
            Self::SceneOutline => include_str!("../templates/scene-outline.txt"),
            Self::SceneStoryboard => include_str!("../templates/scene-storyboard.txt"),
            Self::ShotDescription => include_str!("../templates/shot-description.txt"),
        }
    }
}

/// Template source: files in an override directory when present,
/// otherwise the built-in copies compiled into the binary.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    dir: Option<PathBuf>,
}

impl TemplateLibrary {
    pub fn builtin() -> Self {
        Self { dir: None }
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    fn template_text(&self, kind: GenerationKind) -> Result<String, GenerationError> {
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{}.txt", kind.as_str()));
            if path.is_file() {
                return std::fs::read_to_string(&path).map_err(|err| {
                    GenerationError::Template(format!(
                        "failed to read template {}: {err}",
                        path.display()
                    ))
                });
            }
        }
        Ok(kind.builtin().to_string())
    }

    /// Validate parameters, substitute tokens, and append the fixed
    /// response-language instruction.
    pub fn build_prompt(
        &self,
        kind: GenerationKind,
        params: &Map<String, Value>,
        language: &str,
    ) -> Result<String, GenerationError> {
        for required in kind.required_params() {
            if !params.contains_key(*required) {
                return Err(GenerationError::MissingParam(format!(
                    "{} requires '{required}'",
                    kind.as_str()
                )));
            }
        }
        let mut prompt = substitute(&self.template_text(kind)?, params);
        prompt.push_str("\n\nPlease respond in ");
        prompt.push_str(response_language(language));
        prompt.push('.');
        Ok(prompt)
    }
}

/// Replace every `{{key}}` occurrence with the string form of the
/// value. Unknown tokens stay as-is.
pub fn substitute(template: &str, params: &Map<String, Value>) -> String {
    let mut out = template.to_string();
    for (key, value) in params {
        let token = format!("{{{{{key}}}}}");
        out = out.replace(&token, &value_to_string(value));
    }
    out
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn response_language(language: &str) -> &'static str {
    match language {
        "zh" | "zh-CN" => "Chinese",
        "en" => "English",
        _ => "English",
    }
}
