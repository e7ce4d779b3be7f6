use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};

use selfquery_core::config::{expand_path, Config};
use selfquery_core::logging::init_tracing;
use selfquery_core::{Context, Document, IndexConfig, SearchOptions};
use selfquery_oracle::{build_embedder, build_model, EmbedderSettings, ModelSettings};
use selfquery_retriever::{Retriever, RetrieverConfig};
use selfquery_vector::{open_store, BackendSettings, LanceBackend, StoreHandles, StoreSettings};

#[derive(Parser)]
#[command(name = "selfquery", about = "Self-query retrieval over a vector index")]
struct Args {
    /// Directory holding config.toml
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// Namespace inside the index (defaults to the configured one)
    #[arg(long, short)]
    namespace: Option<String>,

    /// Per-request timeout in seconds (0 = none)
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage the configured index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
    /// Add documents from a JSON-lines file
    Ingest {
        file: PathBuf,
        /// Documents per add call
        #[arg(long, default_value_t = 256)]
        batch: usize,
    },
    /// Plain similarity search
    Search {
        query: String,
        #[arg(short, default_value_t = 4)]
        k: usize,
        /// Drop hits scoring below this value
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Translate the query with the language model, then search
    Retrieve {
        query: String,
        /// Number of documents (overrides the model's limit)
        #[arg(short)]
        k: Option<usize>,
        /// Print the structured query instead of searching
        #[arg(long)]
        explain: bool,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    Create,
    Delete,
    Exists,
    /// Build the IVF-HNSW index (LanceDB backend only)
    Build,
}

struct App {
    config: Config,
    index: IndexConfig,
    search: SearchOptions,
}

impl App {
    fn load(args: &Args) -> Result<Self> {
        let config = Config::load_from(&args.config_dir)?;
        let mut index: IndexConfig = config.get_or("index", IndexConfig::default())?;
        let retriever: Option<RetrieverConfig> = config.get_or("retriever", None)?;
        if index.filterable_fields.is_empty() {
            if let Some(r) = &retriever {
                index.filterable_fields = r.metadata_field_info.clone();
            }
        }
        index.validate()?;

        let mut search = retriever.map(|r| r.search).unwrap_or_default();
        if let Some(ns) = &args.namespace {
            search.namespace = Some(ns.clone());
        }
        Ok(Self { config, index, search })
    }

    fn backend(&self) -> Result<BackendSettings> {
        let mut backend: BackendSettings = self.config.get_or("backend", BackendSettings::default())?;
        if let BackendSettings::Lance(cfg) = &mut backend {
            cfg.uri = expand_path(&cfg.uri).to_string_lossy().into_owned();
        }
        Ok(backend)
    }

    fn ephemeral(&self) -> Result<bool> {
        Ok(matches!(self.backend()?, BackendSettings::Memory))
    }

    /// The memory backend lives only as long as this process, so its index
    /// is created on open.
    async fn open(&self, ctx: &Context) -> Result<StoreHandles> {
        let embedder_settings: EmbedderSettings = self.config.get_or("embedder", EmbedderSettings::default())?;
        let embedder = build_embedder(embedder_settings)?;
        let settings: StoreSettings = self.config.get_or("store", StoreSettings::default())?;
        let handles = open_store(self.backend()?, embedder, self.index.clone(), settings).await?;
        if self.ephemeral()? {
            handles.indexes.create_index(ctx, &self.index).await?;
        }
        Ok(handles)
    }

    fn retriever_config(&self) -> Result<RetrieverConfig> {
        let mut cfg: RetrieverConfig =
            self.config.get("retriever").context("retrieve needs a [retriever] section")?;
        cfg.search = self.search.clone();
        Ok(cfg)
    }
}

fn read_documents(path: &PathBuf) -> Result<Vec<Document>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut docs = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: Document =
            serde_json::from_str(&line).with_context(|| format!("{}:{}: invalid document", path.display(), n + 1))?;
        docs.push(doc);
    }
    Ok(docs)
}

async fn run(args: Args) -> Result<()> {
    let app = App::load(&args)?;
    let ctx = if args.timeout == 0 { Context::new() } else { Context::new().with_timeout(Duration::from_secs(args.timeout)) };

    match args.command {
        Command::Index { action: IndexAction::Create } => {
            let handles = app.open(&ctx).await?;
            if !app.ephemeral()? {
                handles.indexes.create_index(&ctx, &app.index).await?;
            }
            println!(
                "Created index '{}' ({} dims, {})",
                app.index.name,
                app.index.vector_dimension,
                app.index.distance_metric.as_str()
            );
        }
        Command::Index { action: IndexAction::Delete } => {
            app.open(&ctx).await?.indexes.delete_index(&ctx, &app.index.name).await?;
            println!("Deleted index '{}'", app.index.name);
        }
        Command::Index { action: IndexAction::Exists } => {
            let exists = app.open(&ctx).await?.indexes.index_exists(&ctx, &app.index.name).await?;
            println!("{exists}");
        }
        Command::Index { action: IndexAction::Build } => {
            let BackendSettings::Lance(cfg) = app.backend()? else {
                bail!("index build is only supported by the lance backend");
            };
            let lance = LanceBackend::connect(cfg).await?;
            if lance.build_ann_index(&ctx, &app.index).await? {
                println!("Built ANN index for '{}'", app.index.name);
            } else {
                println!("Too few rows in '{}' for an ANN index; searches stay exact", app.index.name);
            }
        }
        Command::Ingest { file, batch } => {
            if batch == 0 {
                bail!("--batch must be positive");
            }
            let docs = read_documents(&file)?;
            let store = app.open(&ctx).await?.store;
            let total = docs.len();
            let mut added = 0;
            for chunk in docs.chunks(batch) {
                let ids = store.add_documents(&ctx, chunk.to_vec(), &app.search).await?;
                added += ids.len();
                tracing::info!(added, total, "ingested batch");
            }
            println!("Added {added} documents to '{}'", app.index.name);
        }
        Command::Search { query, k, threshold } => {
            let mut opts = app.search.clone();
            if threshold.is_some() {
                opts.score_threshold = threshold;
            }
            let hits = app.open(&ctx).await?.store.similarity_search(&ctx, &query, k, &opts).await?;
            for (i, hit) in hits.iter().enumerate() {
                println!("{}. [{:.4}] {}", i + 1, hit.score, hit.document.content);
            }
        }
        Command::Retrieve { query, k, explain } => {
            let model_settings: ModelSettings = app.config.get("model").context("retrieve needs a [model] section")?;
            let model = build_model(model_settings);
            let retriever = Retriever::new(model, app.open(&ctx).await?.store, app.retriever_config()?)?;
            if explain {
                let sq = retriever.structured_query(&ctx, &query).await?;
                println!("query:  {}", sq.semantic_query);
                println!("filter: {}", sq.filter.map_or_else(|| "NO_FILTER".to_string(), |f| f.to_string()));
                println!("limit:  {}", sq.limit.map_or_else(|| "-".to_string(), |l| l.to_string()));
                return Ok(());
            }
            let docs = retriever.retrieve(&ctx, &query, k).await?;
            for (i, doc) in docs.iter().enumerate() {
                println!("{}. {} {}", i + 1, doc.content, serde_json::to_string(&doc.metadata)?);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("selfquery=info,selfquery_vector=info,warn");
    run(Args::parse()).await
}
