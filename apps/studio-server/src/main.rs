//! StoryBuilder Studio Server
//! Serves the project/settings/generation API and local assets to the
//! desktop front-end over HTTP + WebSocket.

mod api;
mod state;
mod stream;

use axum::{
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "studio_server=debug,project=debug,generation=debug,assets=debug".to_string()
        }))
        .init();

    let projects_root = std::env::var("STORYBUILDER_DATA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| project::projects_dir());
    let settings_path = std::env::var("STORYBUILDER_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| project::settings_file());

    info!("Projects root: {}", projects_root.display());
    let state = Arc::new(AppState::new(projects_root, settings_path));

    // Legacy flat-file projects must be moved into directory form
    // before any handler can observe them.
    let outcomes = state.store.migrate_legacy().await?;
    if !outcomes.is_empty() {
        let failed = outcomes.iter().filter(|o| !o.migrated).count();
        info!(
            "Legacy migration: {} project(s) moved, {} failed",
            outcomes.len() - failed,
            failed
        );
        for outcome in outcomes.iter().filter(|o| !o.migrated) {
            warn!(file = %outcome.file, error = ?outcome.error, "legacy project left in place");
        }
    }

    let app = Router::new()
        // Projects
        .route("/api/projects", get(api::list_projects).post(api::create_project))
        .route(
            "/api/projects/:id",
            get(api::load_project)
                .put(api::save_project)
                .delete(api::delete_project),
        )
        .route(
            "/api/projects/:id/scenes/:scene_id/storyboard",
            get(api::load_scene_storyboard),
        )
        .route("/api/projects/:id/images", post(api::upload_image))
        .route("/api/projects-folder", post(api::open_projects_folder))
        // Generation
        .route("/api/generate", post(api::generate))
        .route("/api/generate/stream", get(stream::ws_handler))
        .route("/api/generate/:request_id/cancel", post(api::cancel_generation))
        .route("/api/generate/image", post(api::generate_image))
        // Settings
        .route("/api/settings", get(api::get_settings).put(api::save_settings))
        // Local asset scheme (story-asset://)
        .route("/assets/*reference", get(api::get_asset))
        // CORS for the dev renderer
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = std::env::var("STORYBUILDER_ADDR").unwrap_or_else(|_| "127.0.0.1:4170".to_string());
    info!("Studio server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
