use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use project::{ProjectStore, SettingsStore};

#[derive(Parser)]
#[command(name = "storybuilder-cli")]
#[command(about = "StoryBuilder CLI - Headless project store operations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Projects directory (defaults to the app data directory)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List projects, newest first
    List,

    /// Create a new project
    New {
        /// Project name
        name: String,
    },

    /// Print a project as JSON
    Show {
        /// Project id
        id: String,
    },

    /// Print the shot list for one scene as JSON
    Storyboard {
        /// Project id
        id: String,

        /// Scene id
        scene: String,
    },

    /// Delete a project and all its scene and avatar files
    Delete {
        /// Project id
        id: String,
    },

    /// Move legacy flat-file projects into the directory layout
    Migrate,

    /// Print the projects directory, creating it if needed
    Folder,

    /// Print the global settings (API key redacted)
    Settings,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    let root = cli.data_dir.unwrap_or_else(project::projects_dir);
    let store = ProjectStore::new(&root);

    match cli.command {
        Commands::List => list_command(&store).await,
        Commands::New { name } => new_command(&store, &name).await,
        Commands::Show { id } => show_command(&store, &id).await,
        Commands::Storyboard { id, scene } => storyboard_command(&store, &id, &scene).await,
        Commands::Delete { id } => delete_command(&store, &id).await,
        Commands::Migrate => migrate_command(&store).await,
        Commands::Folder => folder_command(&store).await,
        Commands::Settings => settings_command().await,
    }
}

async fn list_command(store: &ProjectStore) -> Result<()> {
    let projects = store.list().await?;
    info!("Found {} project(s)", projects.len());
    println!("{}", serde_json::to_string_pretty(&projects)?);
    Ok(())
}

async fn new_command(store: &ProjectStore, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(anyhow::anyhow!("project name must not be empty"));
    }
    let created = store.create(name.trim()).await?;
    info!("Created project '{}'", created.name);
    println!("{}", created.id);
    Ok(())
}

async fn show_command(store: &ProjectStore, id: &str) -> Result<()> {
    match store.load(id).await? {
        Some(loaded) => {
            println!("{}", serde_json::to_string_pretty(&loaded)?);
            Ok(())
        }
        None => Err(anyhow::anyhow!("no project with id '{}'", id)),
    }
}

async fn storyboard_command(store: &ProjectStore, id: &str, scene: &str) -> Result<()> {
    let shots = store.load_scene_storyboard(id, scene).await?;
    if shots.is_empty() {
        warn!("No storyboard recorded for scene '{}'", scene);
    }
    println!("{}", serde_json::to_string_pretty(&shots)?);
    Ok(())
}

async fn delete_command(store: &ProjectStore, id: &str) -> Result<()> {
    store.delete(id).await?;
    info!("Deleted project '{}'", id);
    Ok(())
}

async fn migrate_command(store: &ProjectStore) -> Result<()> {
    let outcomes = store.migrate_legacy().await?;
    if outcomes.is_empty() {
        info!("No legacy project files found");
        return Ok(());
    }

    for outcome in &outcomes {
        if outcome.migrated {
            info!("Migrated: {}", outcome.file);
        } else {
            warn!(
                "Failed to migrate {}: {}",
                outcome.file,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    println!("{}", serde_json::to_string_pretty(&outcomes)?);
    Ok(())
}

async fn folder_command(store: &ProjectStore) -> Result<()> {
    store.ensure_root().await?;
    println!("{}", store.root().display());
    Ok(())
}

async fn settings_command() -> Result<()> {
    let store = SettingsStore::new(project::settings_file());
    let mut settings = store.load().await;
    if !settings.api_key.is_empty() {
        settings.api_key = "***".to_string();
    }
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
