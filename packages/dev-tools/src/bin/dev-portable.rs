//! Development CLI for portable documents and workspace versions
//!
//! Drives a [`DeskflowEngine`] against a local database file so export,
//! import and version history can be exercised without the desktop app.
//!
//! # Usage
//!
//! ```bash
//! # Create a workspace with its root desktop
//! cargo run --bin dev-portable -- init --name "Home" --owner dev-user
//!
//! # Export a desktop subtree and import it elsewhere
//! cargo run --bin dev-portable -- export <desktop-id> --out board.json
//! cargo run --bin dev-portable -- import board.json --workspace <workspace-id>
//!
//! # Version history
//! cargo run --bin dev-portable -- snapshot <workspace-id> --summary "before cleanup"
//! cargo run --bin dev-portable -- versions <workspace-id>
//! cargo run --bin dev-portable -- diff <from-version-id> <to-version-id>
//! cargo run --bin dev-portable -- restore <version-id>
//! ```
//!
//! # Configuration
//!
//! The database path comes from `--db`, then `DESKFLOW_DB_PATH`, then
//! `~/.deskflow/database/deskflow.db`. Log verbosity follows `RUST_LOG`.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use deskflow_core::{DeskflowEngine, EngineConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dev-portable")]
#[command(version, about = "DeskFlow portable document and version tool")]
struct Cli {
    /// Database file (overrides DESKFLOW_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a workspace with its root desktop
    Init {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "local-user")]
        owner: String,
    },

    /// List workspaces and their desktop trees
    List,

    /// Export a desktop subtree as a portable document
    Export {
        desktop_id: String,
        /// Output file (stdout when omitted)
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Import a portable document into a workspace
    Import {
        file: PathBuf,
        #[arg(long)]
        workspace: String,
        /// Desktop to graft under (workspace root when omitted)
        #[arg(long)]
        parent: Option<String>,
    },

    /// Capture a version of a workspace
    Snapshot {
        workspace_id: String,
        #[arg(long)]
        summary: Option<String>,
    },

    /// List versions, newest first
    Versions {
        workspace_id: String,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Replace local content with a version
    Restore { version_id: String },

    /// Compare two versions by entity id
    Diff { from: String, to: String },

    /// Entity counts for a workspace
    Stats { workspace_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dev_portable=info,deskflow_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::from_env()
        .map_err(|e| anyhow::anyhow!("invalid environment configuration: {}", e))?;
    if let Some(db) = cli.db {
        config.database_path = Some(db);
    }

    let engine = DeskflowEngine::open(config, None).await?;
    run(&engine, cli.command).await
}

async fn run(engine: &DeskflowEngine, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init { name, owner } => {
            let (workspace, root) = engine.workspaces().create_workspace(&owner, &name).await?;
            println!("workspace    {}", workspace.id);
            println!("root desktop {}", root.id);
        }

        Commands::List => {
            let state = engine.store().state().await;
            if state.workspaces.is_empty() {
                println!("(no workspaces)");
            }
            for workspace in state.workspaces.values() {
                println!("{}  {}", workspace.id, workspace.name);
                for level in engine
                    .workspaces()
                    .desktop_hierarchy(&workspace.id, None)
                    .await?
                {
                    println!(
                        "  {}{}  {}",
                        "  ".repeat(level.level),
                        level.desktop.id,
                        level.desktop.name
                    );
                }
            }
        }

        Commands::Export { desktop_id, out } => {
            let text = engine.portable().export_to_string(&desktop_id).await?;
            match out {
                Some(path) => {
                    std::fs::write(&path, text)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("wrote {}", path.display());
                }
                None => println!("{}", text),
            }
        }

        Commands::Import {
            file,
            workspace,
            parent,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let result = engine
                .portable()
                .import_str(&text, &workspace, parent.as_deref())
                .await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                bail!(result.error.unwrap_or_else(|| "import failed".to_string()));
            }
        }

        Commands::Snapshot {
            workspace_id,
            summary,
        } => {
            let version = engine
                .versions()
                .create_snapshot(&workspace_id, summary.as_deref())
                .await?;
            println!(
                "version {} ({}): {}",
                version.version_number, version.id, version.change_summary
            );
        }

        Commands::Versions {
            workspace_id,
            limit,
        } => {
            for version in engine.versions().list_versions(&workspace_id, limit).await {
                println!(
                    "{:>4}  {}  {}  {}",
                    version.version_number,
                    version.created_at.format("%Y-%m-%d %H:%M:%S"),
                    version.id,
                    version.change_summary
                );
            }
        }

        Commands::Restore { version_id } => {
            let result = engine.versions().restore(&version_id).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                bail!(result.errors.join("; "));
            }
        }

        Commands::Diff { from, to } => {
            let diff = engine.versions().diff(&from, &to).await?;
            println!("{}", serde_json::to_string_pretty(&diff)?);
        }

        Commands::Stats { workspace_id } => {
            let counts = engine.workspaces().workspace_stats(&workspace_id).await?;
            println!("{}", counts);
        }
    }
    Ok(())
}
