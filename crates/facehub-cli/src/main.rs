use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facehub_core::{Embedding, FeatureStore, PrimaryKeyMode, SqliteBackend};
use facehub_session::{DatabaseConfiguration, SessionConfig};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facehub", about = "Inspect and edit a persisted face feature gallery")]
struct Cli {
    /// Session config file (TOML). FACEHUB_* variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Gallery database file or directory. Overrides the configured db_path.
    #[arg(long)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Operate on the feature gallery
    #[command(subcommand)]
    Gallery(GalleryCommand),
}

#[derive(Subcommand)]
enum GalleryCommand {
    /// List stored records in insertion order
    List,
    /// Add a record and print the id it is stored under
    Insert {
        /// Required unless the gallery allocates ids itself
        #[arg(long)]
        id: Option<i32>,
        #[arg(long, default_value = "")]
        tag: String,
        /// JSON array of floats, or @FILE containing one
        #[arg(long)]
        embedding: String,
    },
    /// Replace the embedding and tag of an existing record
    Update {
        #[arg(long)]
        id: i32,
        #[arg(long, default_value = "")]
        tag: String,
        /// JSON array of floats, or @FILE containing one
        #[arg(long)]
        embedding: String,
    },
    /// Remove a record
    Remove {
        #[arg(long)]
        id: i32,
    },
    /// Print one record
    Get {
        #[arg(long)]
        id: i32,
    },
    /// Find the closest record to an embedding
    Search {
        /// JSON array of floats, or @FILE containing one
        #[arg(long)]
        embedding: String,
        /// Match threshold; defaults to the configured search threshold
        #[arg(long)]
        threshold: Option<f32>,
        /// Report the best candidate even below the threshold
        #[arg(long)]
        most_similar: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = SessionConfig::load(cli.config.as_deref()).context("loading session config")?;
    let db_path = cli.db.clone().unwrap_or_else(|| config.database.db_path.clone());
    if db_path.as_os_str().is_empty() {
        bail!("no gallery database given; pass --db or set FACEHUB_DB_PATH");
    }

    let mut store = open_gallery(&db_path, &config)?;
    match cli.command {
        Commands::Gallery(cmd) => run_gallery(&mut store, cmd, &config),
    }
}

fn open_gallery(db_path: &Path, config: &SessionConfig) -> Result<FeatureStore> {
    let file = DatabaseConfiguration::persistent(db_path).database_file();
    let backend = SqliteBackend::open(&file)
        .with_context(|| format!("opening gallery database {}", file.display()))?;

    let mut store = FeatureStore::new();
    store.set_primary_key_mode(config.feature_hub.primary_key_mode)?;
    store.set_search_mode(config.feature_hub.search_mode);
    store.attach_backend(Box::new(backend));
    let loaded = store.load_from_backend().context("loading gallery")?;
    tracing::debug!(path = %file.display(), loaded, "gallery opened");
    Ok(store)
}

fn run_gallery(store: &mut FeatureStore, cmd: GalleryCommand, config: &SessionConfig) -> Result<()> {
    match cmd {
        GalleryCommand::List => {
            let rows: Vec<_> = store
                .records()
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "custom_id": r.custom_id,
                        "tag": r.tag,
                        "dimension": r.embedding.len(),
                    })
                })
                .collect();
            print_json(&rows)
        }
        GalleryCommand::Insert { id, tag, embedding } => {
            let embedding = parse_embedding(&embedding)?;
            let requested = match (id, store.primary_key_mode()) {
                (Some(id), _) => id,
                (None, PrimaryKeyMode::AutoIncrement) => 0,
                (None, PrimaryKeyMode::Manual) => bail!("--id is required unless primary_key_mode is auto_increment"),
            };
            let custom_id = store
                .insert(&embedding, &tag, requested)
                .with_context(|| format!("inserting custom id {requested}"))?;
            tracing::info!(custom_id, "record inserted");
            print_json(&serde_json::json!({ "custom_id": custom_id }))
        }
        GalleryCommand::Update { id, tag, embedding } => {
            let embedding = parse_embedding(&embedding)?;
            store
                .update(&embedding, &tag, id)
                .with_context(|| format!("updating custom id {id}"))?;
            tracing::info!(custom_id = id, "record updated");
            Ok(())
        }
        GalleryCommand::Remove { id } => {
            store
                .delete(id)
                .with_context(|| format!("removing custom id {id}"))?;
            tracing::info!(custom_id = id, "record removed");
            Ok(())
        }
        GalleryCommand::Get { id } => match store.get(id) {
            Some(record) => print_json(record),
            None => bail!("custom id {id} is not in the gallery"),
        },
        GalleryCommand::Search {
            embedding,
            threshold,
            most_similar,
        } => {
            let query = parse_embedding(&embedding)?;
            let hub = &config.feature_hub;
            let threshold = threshold.unwrap_or(hub.search_threshold);
            let result = store
                .search(&query, threshold, most_similar || hub.search_most_similar)
                .context("searching gallery")?;
            print_json(&result)
        }
    }
}

/// Parse an embedding given inline as a JSON array or as `@path` to a file holding one.
fn parse_embedding(arg: &str) -> Result<Embedding> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading embedding file {path}"))?,
        None => arg.to_owned(),
    };
    let values: Vec<f32> = serde_json::from_str(&text).context("embedding must be a JSON array of numbers")?;
    if values.is_empty() {
        bail!("embedding is empty");
    }
    Ok(Embedding::new(values))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
