mod index;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use limbguard_ai::{Embedder, TextEmbedder};
use limbguard_core::{GradeLabel, Settings, config};
use limbguard_service::{Assessor, LanceIndex, http};
use limbguard_store::PassageStore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "limbguard", version, about = "Diabetic foot gangrene assessment")]
struct Cli {
    #[command(flatten)]
    artifacts: ArtifactArgs,

    #[command(subcommand)]
    command: Command,
}

/// Artifact locations shared by every subcommand.
#[derive(Args)]
struct ArtifactArgs {
    /// ONNX classifier checkpoint; demo mode when absent
    #[arg(long, global = true, env = "LIMBGUARD_CHECKPOINT", default_value = config::DEFAULT_CHECKPOINT)]
    checkpoint: PathBuf,

    /// Directory with the embedding `model.onnx` and `tokenizer.json`
    #[arg(long, global = true, env = "LIMBGUARD_EMBEDDING_MODEL", default_value = config::DEFAULT_EMBEDDING_MODEL_DIR)]
    embedding_model: PathBuf,

    /// Reference corpus of `.txt` documents
    #[arg(long, global = true, env = "LIMBGUARD_KNOWLEDGE_BASE", default_value = config::DEFAULT_KNOWLEDGE_BASE_DIR)]
    knowledge_base: PathBuf,

    /// LanceDB passage index; retrieval disabled when absent
    #[arg(long, global = true, env = "LIMBGUARD_INDEX_DIR", default_value = config::DEFAULT_INDEX_DIR)]
    index_dir: PathBuf,

    /// Passages retrieved per abnormal assessment
    #[arg(long, global = true, env = "LIMBGUARD_TOP_K", default_value_t = config::DEFAULT_TOP_K)]
    top_k: usize,

    /// Demo-mode label for filenames without a grade keyword
    #[arg(long, global = true, env = "LIMBGUARD_DEMO_FALLBACK", default_value = "normal")]
    demo_fallback: GradeLabel,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "LIMBGUARD_BIND", default_value = config::DEFAULT_BIND)]
        bind: String,

        /// Largest accepted request body, in bytes
        #[arg(long, env = "LIMBGUARD_MAX_UPLOAD_BYTES", default_value_t = config::DEFAULT_MAX_UPLOAD_BYTES)]
        max_upload_bytes: usize,
    },
    /// Chunk and embed the knowledge base into the passage index
    Index {
        #[arg(long, env = "LIMBGUARD_CHUNK_SIZE", default_value_t = config::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        #[arg(long, env = "LIMBGUARD_CHUNK_OVERLAP", default_value_t = config::DEFAULT_CHUNK_OVERLAP)]
        chunk_overlap: usize,
    },
    /// Assess one image file and print the response as JSON
    Assess {
        image: PathBuf,

        /// Filename to report instead of the file's own name
        #[arg(long)]
        name: Option<String>,
    },
    /// Search the passage index with a free-text query
    Search {
        query: String,

        #[arg(long, short = 'k')]
        limit: Option<usize>,
    },
    /// Show which artifacts are present and the resulting modes
    Status,
}

impl ArtifactArgs {
    fn settings(&self) -> Settings {
        Settings {
            checkpoint_path: self.checkpoint.clone(),
            embedding_model_dir: self.embedding_model.clone(),
            knowledge_base_dir: self.knowledge_base.clone(),
            index_dir: self.index_dir.clone(),
            top_k: self.top_k,
            demo_fallback: self.demo_fallback,
            ..Settings::default()
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = cli.artifacts.settings();
    info!("limbguard v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve {
            bind,
            max_upload_bytes,
        } => {
            settings.bind = bind;
            settings.max_upload_bytes = max_upload_bytes;
            let assessor = Assessor::startup(&settings)
                .await
                .context("starting assessment pipeline")?;
            http::serve(Arc::new(assessor), &settings).await
        }
        Command::Index {
            chunk_size,
            chunk_overlap,
        } => {
            settings.chunk_size = chunk_size;
            settings.chunk_overlap = chunk_overlap;
            cmd_index(&settings).await
        }
        Command::Assess { image, name } => cmd_assess(&settings, image, name).await,
        Command::Search { query, limit } => {
            cmd_search(&settings, &query, limit.unwrap_or(settings.top_k)).await
        }
        Command::Status => cmd_status(&settings).await,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_index(settings: &Settings) -> anyhow::Result<()> {
    settings.validate()?;
    let embedder = Embedder::load(&settings.embedding_model_dir)
        .context("loading embedding model")?;
    let store = PassageStore::open(&settings.index_dir)
        .await
        .context("opening passage index")?;

    eprintln!(
        "Indexing {} into {}",
        settings.knowledge_base_dir.display(),
        settings.index_dir.display()
    );
    let stats = index::run_index_pipeline(
        &store,
        &embedder,
        &settings.knowledge_base_dir,
        settings.chunk_size,
        settings.chunk_overlap,
    )
    .await?;

    eprintln!(
        "Indexed {} passages from {} documents in {:.1}s",
        stats.passages, stats.documents, stats.elapsed_secs
    );
    Ok(())
}

async fn cmd_assess(
    settings: &Settings,
    image: PathBuf,
    name: Option<String>,
) -> anyhow::Result<()> {
    let bytes = std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
    let filename = name.unwrap_or_else(|| {
        image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let assessor = Assessor::startup(settings)
        .await
        .context("starting assessment pipeline")?;
    let response = assessor.assess(bytes, &filename).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn cmd_search(settings: &Settings, query: &str, limit: usize) -> anyhow::Result<()> {
    let embedder = Embedder::load(&settings.embedding_model_dir)
        .context("loading embedding model")?;
    let store = PassageStore::open_existing(&settings.index_dir).await?;
    let index = LanceIndex::new(store.reader().await?);

    let vector = embedder.embed(query)?;
    let passages = limbguard_ai::PassageIndex::search(&index, &vector, limit).await?;

    if passages.is_empty() {
        println!("No passages found.");
        return Ok(());
    }
    for (rank, p) in passages.iter().enumerate() {
        println!("{:>2}. [{:.3}] {}", rank + 1, p.score, p.source);
        println!("    {}", p.text.replace('\n', " "));
    }
    Ok(())
}

async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    fn present(p: &Path) -> &'static str {
        if p.exists() { "present" } else { "missing" }
    }

    println!("Artifacts");
    println!(
        "  checkpoint       {} ({})",
        settings.checkpoint_path.display(),
        present(settings.checkpoint_path.as_path())
    );
    println!(
        "  embedding model  {} ({})",
        settings.embedding_model_dir.display(),
        present(settings.embedding_model_dir.join("model.onnx").as_path())
    );
    println!(
        "  knowledge base   {} ({})",
        settings.knowledge_base_dir.display(),
        present(settings.knowledge_base_dir.as_path())
    );

    match PassageStore::open_existing(&settings.index_dir).await {
        Ok(store) => {
            let count = store.passage_count().await?;
            let dim = store.embedding_dim().await?;
            let model = store.embedding_model().await?;
            println!(
                "  index            {} ({count} passages, dim {dim}, model {})",
                settings.index_dir.display(),
                model.as_deref().unwrap_or("unknown")
            );
        }
        Err(e) => println!("  index            {} ({e})", settings.index_dir.display()),
    }

    let assessor = Assessor::startup(settings).await?;
    let caps = assessor.capabilities();
    println!();
    println!("Modes  {caps}");
    Ok(())
}
