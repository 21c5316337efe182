//! docflow CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use docflow::{
    blob::FsBlobStore,
    commands::{
        cmd_init, cmd_list_batches, cmd_list_files, cmd_remove_file, cmd_reset_stuck, cmd_retry,
        cmd_run, cmd_show_file, cmd_status, print_batches, print_file_details, print_files,
        print_status, print_summary, RunRequest,
    },
    config::Config,
    error::{Error, Result},
    pipeline::{build_coordinator, BatchOptions},
    progress::LogWriterFactory,
    store::QdrantStore,
    tracking::{FileStatus, TrackingStore},
};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docflow")]
#[command(version, about = "Resumable document ingestion into a vector index", long_about = None)]
struct Cli {
    /// Path to config file (or its directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize docflow configuration and tracking database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Process a directory of documents as one batch
    Run {
        /// Directory to process (defaults to source.root)
        path: Option<PathBuf>,

        /// File extensions to include (e.g., pdf,png)
        #[arg(long, value_delimiter = ',')]
        ext: Option<Vec<String>>,

        /// Drive already-tracked content forward instead of skipping it
        #[arg(long)]
        no_skip_duplicates: bool,

        /// Retry failed files before new input
        #[arg(long)]
        resume_failed: bool,

        /// Continue files left in pending, uploaded or processing
        #[arg(long)]
        resume: bool,

        /// Retry ceiling for failed files
        #[arg(long)]
        max_retries: Option<i32>,

        /// Outcomes per progress commit
        #[arg(long)]
        batch_size: Option<usize>,

        /// Files processed at once
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Retry failed files
    Retry {
        /// Retry ceiling for failed files
        #[arg(long)]
        max_retries: Option<i32>,
    },

    /// Show system status
    Status,

    /// List tracked files
    Files {
        /// Only files in this status (pending, uploaded, processing, embedded, failed)
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of files
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show one tracked file by file id or content hash
    Show {
        /// File id or content hash
        key: String,
    },

    /// List recent batches
    Batches {
        /// Maximum number of batches
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Remove a file's record, vectors and blob
    Remove {
        /// File id to remove (use 'docflow files' to list)
        file_id: String,

        /// Leave the stored blob in place
        #[arg(long)]
        keep_blob: bool,
    },

    /// Revert files stuck in processing
    ResetStuck,

    /// Manage Qdrant vector database
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Database management actions
#[derive(Subcommand)]
enum DbAction {
    /// Initialize/create the Qdrant collection
    Init,

    /// Show Qdrant collection status
    Status,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    if let Commands::Init { force } = cli.command {
        return handle_init(cli.config, force, cli.json).await;
    }

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "docflow", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let store = TrackingStore::connect(&config).await?;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Run {
            path,
            ext,
            no_skip_duplicates,
            resume_failed,
            resume,
            max_retries,
            batch_size,
            concurrency,
        } => {
            let root = path
                .or_else(|| config.source.root.clone())
                .ok_or_else(|| {
                    Error::Config(
                        "No directory to process: pass PATH or set source.root".to_string(),
                    )
                })?;

            let mut options = BatchOptions::from_config(&config);
            options.skip_duplicates = !no_skip_duplicates;
            options.resume_failed |= resume_failed;
            options.resume_incomplete = resume;
            if let Some(n) = max_retries {
                options.max_retries = n;
            }
            if let Some(n) = batch_size {
                options.batch_size = n;
            }
            if let Some(n) = concurrency {
                options.concurrency = n;
            }

            let extensions = match ext {
                Some(list) => list
                    .iter()
                    .map(|e| format!(".{}", e.trim().trim_start_matches('.')))
                    .collect(),
                None => config.source.extensions.clone(),
            };

            let coordinator = build_coordinator(&config, store, &root)
                .await?
                .with_cancellation(cancel_on_ctrl_c())
                .with_progress(!cli.json);

            let summary = cmd_run(
                &coordinator,
                RunRequest {
                    path: String::new(),
                    extensions,
                    options,
                },
            )
            .await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }

        Commands::Retry { max_retries } => {
            let mut options = BatchOptions::from_config(&config);
            if let Some(n) = max_retries {
                options.max_retries = n;
            }

            let root = config
                .source
                .root
                .clone()
                .unwrap_or_else(|| config.paths.base_dir.clone());
            let coordinator = build_coordinator(&config, store, &root)
                .await?
                .with_cancellation(cancel_on_ctrl_c())
                .with_progress(!cli.json);

            let summary = cmd_retry(&coordinator, &options).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }

        Commands::Status => {
            let status = cmd_status(&config, &store).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Files { status, limit } => {
            let status = status.map(|s| s.parse::<FileStatus>()).transpose()?;
            let files = cmd_list_files(&store, status, limit).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                print_files(&files);
            }
        }

        Commands::Show { key } => {
            let vectors = QdrantStore::connect(&config).await.ok();
            let details = cmd_show_file(&store, vectors.as_ref(), &key).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&details)?);
            } else {
                print_file_details(&details);
            }
        }

        Commands::Batches { limit } => {
            let batches = cmd_list_batches(&store, limit).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&batches)?);
            } else {
                print_batches(&batches);
            }
        }

        Commands::Remove { file_id, keep_blob } => {
            let blobs = FsBlobStore::new(config.blob_root());
            let vectors = QdrantStore::connect(&config).await?;
            let report = cmd_remove_file(&store, &blobs, &vectors, &file_id, keep_blob).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("✓ Removed {} ({})", report.file_name, report.file_id);
                println!("  Embeddings removed: {}", report.embeddings_removed);
                println!(
                    "  Blob: {}",
                    if report.blob_deleted { "deleted" } else { "kept" }
                );
            }
        }

        Commands::ResetStuck => {
            let reset = cmd_reset_stuck(&store).await?;

            if cli.json {
                println!(r#"{{"reset": {}}}"#, reset);
            } else {
                println!("✓ Reset {} stuck file(s)", reset);
            }
        }

        Commands::Db { action } => {
            handle_db_action(&config, action, cli.json).await?;
        }
    }

    Ok(())
}

/// Cancel the returned token on the first Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted: finishing files in flight, starting no new ones");
            child.cancel();
        }
    });
    token
}

async fn handle_init(config: Option<PathBuf>, force: bool, json: bool) -> Result<()> {
    // A .toml path names the file itself; anything else is a directory
    let base_dir = config.map(|path| {
        if path.extension().is_some_and(|e| e == "toml") {
            path.parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir)
        } else {
            path
        }
    });

    let report = cmd_init(base_dir, force).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("✓ docflow initialized successfully");
    println!("  Config: {}", report.config_path);
    println!("  Tracking database: {}", report.db_path);
    println!("  Blob root: {}", report.blob_root);
    println!("\nNext steps:");
    println!("  1. Edit the config file to customize settings");
    println!("  2. Start Qdrant: docker run -p 6333:6333 -p 6334:6334 qdrant/qdrant");
    println!("  3. Process documents: docflow run /path/to/docs");

    Ok(())
}

async fn handle_db_action(config: &Config, action: DbAction, json: bool) -> Result<()> {
    let store = QdrantStore::connect(config).await?;

    match action {
        DbAction::Init => {
            store.ensure_collection().await?;
            if json {
                println!(r#"{{"status": "ok", "message": "Collection initialized"}}"#);
            } else {
                println!("✓ Qdrant collection '{}' initialized", store.collection());
            }
        }
        DbAction::Status => match store.get_collection_info().await? {
            Some(info) => {
                if json {
                    println!(
                        r#"{{"exists": true, "points_count": {}, "indexed_vectors_count": {}, "status": "{}"}}"#,
                        info.points_count, info.indexed_vectors_count, info.status
                    );
                } else {
                    println!("Qdrant Collection Status:");
                    println!("  Collection: {}", store.collection());
                    println!("  Dimension: {}", store.dimension());
                    println!("  Status: {}", info.status);
                    println!("  Points: {}", info.points_count);
                    println!("  Indexed Vectors: {}", info.indexed_vectors_count);
                }
            }
            None => {
                if json {
                    println!(r#"{{"exists": false}}"#);
                } else {
                    println!("Collection does not exist. Run 'docflow db init' to create it.");
                }
            }
        },
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = match path {
        Some(p) if p.is_dir() => p.join("config.toml"),
        Some(p) => p.to_path_buf(),
        None => Config::default_config_path(),
    };

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'docflow init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
