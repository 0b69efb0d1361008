use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use groundline_core::config::Config;
use groundline_core::{AskRequest, AskResponse, RagEngine, Server};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "groundline")]
#[command(about = "Grounded, citation-bearing answers over a private knowledge base", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Serve the ask operation over a Unix socket")]
    Serve {
        #[arg(short, long, help = "Socket path (overrides server.socket_path)")]
        socket: Option<String>,
    },

    #[command(about = "Chunk, embed and index a directory of .md/.txt files")]
    Ingest {
        #[arg(help = "Root directory of the knowledge base")]
        dir: PathBuf,

        #[arg(long, help = "Target collection (overrides storage.collection_name)")]
        collection: Option<String>,

        #[arg(long, value_delimiter = ',', help = "Comma-separated extensions, e.g. md,txt")]
        exts: Option<Vec<String>>,

        #[arg(long, help = "Points per upsert batch")]
        batch_size: Option<usize>,
    },

    #[command(about = "Ask a question against the indexed knowledge base")]
    Ask {
        query: String,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        score_threshold: Option<f32>,

        #[arg(long)]
        exact: bool,

        #[arg(long)]
        max_per_doc: Option<usize>,

        #[arg(long, help = "Print the raw JSON response")]
        json: bool,
    },

    #[command(about = "Show collection statistics")]
    Stats,

    #[command(about = "Check that Qdrant, the LLM and the embedding model respond")]
    Ping,

    #[command(about = "Configuration commands")]
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    #[command(about = "Show current configuration")]
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;

    match cli.command {
        Commands::Serve { socket } => {
            if let Some(socket) = socket {
                config.server.socket_path = socket;
            }
            serve(config).await
        }
        Commands::Ingest {
            dir,
            collection,
            exts,
            batch_size,
        } => {
            if let Some(collection) = collection {
                config.storage.collection_name = collection;
            }
            if let Some(exts) = exts {
                config.ingest.extensions = exts;
            }
            if let Some(batch_size) = batch_size {
                config.ingest.batch_size = batch_size;
            }
            config.validate().context("Invalid ingest options")?;
            ingest(&config, &dir).await
        }
        Commands::Ask {
            query,
            top_k,
            score_threshold,
            exact,
            max_per_doc,
            json,
        } => {
            let retrieval = &config.retrieval;
            let request = AskRequest::new(query)
                .with_top_k(top_k.unwrap_or(retrieval.top_k))
                .with_score_threshold(score_threshold.unwrap_or(retrieval.score_threshold))
                .with_exact_search(exact || retrieval.exact_search)
                .with_max_per_doc(max_per_doc.unwrap_or(retrieval.max_per_doc));
            ask(&config, &request, json).await
        }
        Commands::Stats => show_stats(&config).await,
        Commands::Ping => ping(&config).await,
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                show_config(&config);
                Ok(())
            }
        },
    }
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))
    } else {
        tracing::debug!("No config at {}, using defaults", path.display());
        Ok(Config::default())
    }
}

fn engine(config: &Config) -> Result<RagEngine> {
    RagEngine::from_config(config).context("Failed to set up the answer engine")
}

async fn serve(config: Config) -> Result<()> {
    let server = Server::new(config).context("Failed to create server")?;
    server.start().await.context("Server stopped with an error")?;
    Ok(())
}

async fn ingest(config: &Config, dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }

    println!(
        "{} Ingesting {} into {}...",
        "→".blue(),
        dir.display(),
        config.storage.collection_name.cyan()
    );

    let ingestor = engine(config)?.ingestor(config.ingest.clone());
    let report = ingestor.ingest_directory(dir).await.context("Ingestion failed")?;

    println!(
        "{} Indexed {} chunks from {} files",
        "✓".green().bold(),
        report.chunks.to_string().bold(),
        report.files.to_string().bold()
    );
    Ok(())
}

async fn ask(config: &Config, request: &AskRequest, json: bool) -> Result<()> {
    let response = engine(config)?.answer(request).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let result = match &response {
        AskResponse::Answered { result, .. } => result,
        AskResponse::Failed { error, .. } => anyhow::bail!("{}", error),
    };

    println!("{}", result.answer);
    println!();

    if result.citations.is_empty() {
        println!("{}", "No passage passed curation.".yellow());
    } else {
        println!("{}", "Sources:".bold().green());
        for citation in &result.citations {
            println!(
                "  {} [{}#{}] ({:.4})",
                "•".cyan(),
                citation.doc_id.bold(),
                citation.chunk_id,
                citation.score
            );
        }
    }

    let timings = &result.metrics.timings_ms;
    println!();
    println!(
        "{}",
        format!(
            "avg score {:.4} · retrieval {:.2} ms · generation {:.2} ms · total {:.2} ms",
            result.metrics.retrieval_avg_score,
            timings.retrieval_ms,
            timings.generation_ms,
            timings.server_total_ms
        )
        .dimmed()
    );
    Ok(())
}

async fn show_stats(config: &Config) -> Result<()> {
    let stats = engine(config)?.stats().await.context("Failed to read collection stats")?;

    println!("{}", "Collection:".bold().green());
    println!("  Name:        {}", stats.collection.cyan());
    println!("  Points:      {}", stats.points);
    println!("  Vector Size: {}", stats.vector_size);
    println!("  Distance:    {}", stats.distance);
    Ok(())
}

async fn ping(config: &Config) -> Result<()> {
    let engine = engine(config)?;
    let mut healthy = true;

    match engine.list_collections().await {
        Ok(collections) => println!(
            "{} Qdrant     {} ({} collections)",
            "✓".green().bold(),
            config.storage.url,
            collections.len()
        ),
        Err(e) => {
            healthy = false;
            println!("{} Qdrant     {}", "✗".red().bold(), e);
        }
    }

    match engine.list_models().await {
        Ok(models) => {
            let present = models.iter().any(|m| m == &config.llm.model);
            let note = if present { "available".green() } else { "not pulled".yellow() };
            println!("{} LLM        {} ({})", "✓".green().bold(), config.llm.model.cyan(), note);
        }
        Err(e) => {
            healthy = false;
            println!("{} LLM        {}", "✗".red().bold(), e);
        }
    }

    match engine.probe_embeddings().await {
        Ok(dim) => println!(
            "{} Embeddings {} (dim {})",
            "✓".green().bold(),
            config.embedding.model.cyan(),
            dim
        ),
        Err(e) => {
            healthy = false;
            println!("{} Embeddings {}", "✗".red().bold(), e);
        }
    }

    if !healthy {
        anyhow::bail!("One or more services are unreachable");
    }
    Ok(())
}

fn show_config(config: &Config) {
    println!("{}", "Current Configuration:".bold().green());
    println!();
    println!("{}", "LLM:".bold());
    println!("  Model:          {}", config.llm.model.cyan());
    println!("  Base URL:       {}", config.llm.base_url);
    println!("  Temperature:    {}", config.llm.temperature);
    println!("  Context Length: {}", config.llm.context_length);
    println!();
    println!("{}", "Embedding:".bold());
    println!("  Model:          {}", config.embedding.model.cyan());
    println!("  Base URL:       {}", config.embedding.base_url);
    println!("  Dimension:      {}", config.embedding.dimension);
    println!();
    println!("{}", "Storage:".bold());
    println!("  Qdrant:         {}", config.storage.url);
    println!("  Collection:     {}", config.storage.collection_name.cyan());
    println!();
    println!("{}", "Retrieval:".bold());
    println!("  Top K:          {}", config.retrieval.top_k);
    println!("  Threshold:      {}", config.retrieval.score_threshold);
    println!("  Max Per Doc:    {}", config.retrieval.max_per_doc);
    println!("  Exact Search:   {}", config.retrieval.exact_search);
    println!();
    println!("{}", "Ingest:".bold());
    println!("  Chunk Size:     {}", config.ingest.chunk_size);
    println!("  Chunk Overlap:  {}", config.ingest.chunk_overlap);
    println!("  Batch Size:     {}", config.ingest.batch_size);
    println!("  Extensions:     {}", config.ingest.extensions.join(", "));
    println!();
    println!("{}", "Server:".bold());
    println!("  Socket:         {}", config.server.socket_path);
}
