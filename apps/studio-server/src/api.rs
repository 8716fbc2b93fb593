/// REST handlers for projects, settings, generation and local assets
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing::warn;

use assets::AssetError;
use generation::{AvatarTarget, GenerationError, GenerationKind, GenerationOutput};
use project::{GlobalSettings, Project, ProjectMetadata, StoryboardShot};

use crate::state::SharedState;

pub enum ApiError {
    NotFound,
    Forbidden,
    BadRequest(String),
    Storage(String),
    Generation(GenerationError),
}

impl From<project::StoreError> for ApiError {
    fn from(err: project::StoreError) -> Self {
        ApiError::Storage(err.to_string())
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        ApiError::Generation(err)
    }
}

impl From<AssetError> for ApiError {
    fn from(err: AssetError) -> Self {
        match err {
            AssetError::Forbidden => ApiError::Forbidden,
            AssetError::NotFound => ApiError::NotFound,
            AssetError::Io(err) => ApiError::Storage(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Storage(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Storage error: {msg}"))
            }
            ApiError::Generation(err) => {
                let status = match &err {
                    GenerationError::NotConfigured(_)
                    | GenerationError::UnknownKind(_)
                    | GenerationError::MissingParam(_)
                    | GenerationError::Template(_) => StatusCode::BAD_REQUEST,
                    GenerationError::Transport(_) | GenerationError::InvalidResponse(_) => {
                        StatusCode::BAD_GATEWAY
                    }
                    GenerationError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// ---- Projects ----

/// GET /api/projects
pub async fn list_projects(
    State(state): State<SharedState>,
) -> Result<Json<Vec<ProjectMetadata>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

/// POST /api/projects
pub async fn create_project(
    State(state): State<SharedState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Name is required".to_string()));
    }
    Ok(Json(state.store.create(req.name.trim()).await?))
}

/// GET /api/projects/:id — 404 when the project is absent or its file
/// is unreadable, matching the `load -> null` contract.
pub async fn load_project(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Project>, ApiError> {
    state
        .store
        .load(&id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// PUT /api/projects/:id
pub async fn save_project(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(projectbody): Json<Project>,
) -> Result<Json<bool>, ApiError> {
    if projectbody.id != id {
        return Err(ApiError::BadRequest(
            "Project id does not match the URL".to_string(),
        ));
    }
    state.store.save(&projectbody).await?;
    Ok(Json(true))
}

/// DELETE /api/projects/:id
pub async fn delete_project(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Json<bool> {
    match state.store.delete(&id).await {
        Ok(()) => Json(true),
        Err(err) => {
            warn!(project = %id, %err, "project delete failed");
            Json(false)
        }
    }
}

/// GET /api/projects/:id/scenes/:scene_id/storyboard
pub async fn load_scene_storyboard(
    State(state): State<SharedState>,
    Path((id, scene_id)): Path<(String, String)>,
) -> Result<Json<Vec<StoryboardShot>>, ApiError> {
    Ok(Json(state.store.load_scene_storyboard(&id, &scene_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UploadImageRequest {
    /// Local file the user picked in the desktop shell.
    pub path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct AssetReferenceResponse {
    pub reference: String,
}

/// POST /api/projects/:id/images
pub async fn upload_image(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<UploadImageRequest>,
) -> Result<Json<AssetReferenceResponse>, ApiError> {
    let reference = assets::import_image(state.store.root(), &id, &req.path)
        .await
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;
    Ok(Json(AssetReferenceResponse { reference }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectsFolderResponse {
    pub path: String,
}

/// POST /api/projects-folder — ensures the folder exists and returns
/// its absolute path for the desktop shell to open.
pub async fn open_projects_folder(
    State(state): State<SharedState>,
) -> Result<Json<ProjectsFolderResponse>, ApiError> {
    state.store.ensure_root().await?;
    Ok(Json(ProjectsFolderResponse {
        path: state.store.root().display().to_string(),
    }))
}

// ---- Generation ----

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// POST /api/generate — single-shot; the body is either parsed JSON or
/// the raw model text, and the caller handles both shapes.
pub async fn generate(
    State(state): State<SharedState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerationOutput>, ApiError> {
    let kind = GenerationKind::parse(&req.kind)?;
    let config = state.relay_config().await;
    Ok(Json(state.relay.generate(&config, kind, &req.params).await?))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub found: bool,
}

/// POST /api/generate/:request_id/cancel — cancelling an unknown or
/// finished request reports `found: false`, never an error.
pub async fn cancel_generation(
    State(state): State<SharedState>,
    Path(request_id): Path<String>,
) -> Json<CancelResponse> {
    Json(CancelResponse {
        found: state.relay.cancel(&request_id),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageRequest {
    pub prompt: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub subject_id: Option<String>,
}

/// POST /api/generate/image — returns a project-relative reference when
/// the avatar could be persisted locally, otherwise the remote URL.
pub async fn generate_image(
    State(state): State<SharedState>,
    Json(req): Json<GenerateImageRequest>,
) -> Result<Json<AssetReferenceResponse>, ApiError> {
    let target = match (&req.project_id, &req.subject_id) {
        (Some(project_id), Some(subject_id)) => Some(AvatarTarget {
            dir: state.store.project_dir(project_id).join("avatars"),
            relative_prefix: format!("{project_id}/avatars"),
            subject_id: subject_id.clone(),
        }),
        _ => None,
    };
    let config = state.relay_config().await;
    let reference = state.relay.generate_image(&config, &req.prompt, target).await?;
    Ok(Json(AssetReferenceResponse { reference }))
}

// ---- Settings ----

/// GET /api/settings
pub async fn get_settings(State(state): State<SharedState>) -> Json<GlobalSettings> {
    Json(state.settings.load().await)
}

/// PUT /api/settings
pub async fn save_settings(
    State(state): State<SharedState>,
    Json(settings): Json<GlobalSettings>,
) -> Result<Json<bool>, ApiError> {
    state.settings.save(&settings).await?;
    Ok(Json(true))
}

// ---- Assets ----

/// GET /assets/*reference — the HTTP face of `story-asset://`.
pub async fn get_asset(
    State(state): State<SharedState>,
    Path(reference): Path<String>,
) -> Result<Response, ApiError> {
    let (bytes, content_type) = state.resolver.read(&reference).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}
