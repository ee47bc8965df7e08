use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use forca_rag::config::load_config;
use forca_rag::handler::RagHandler;

#[derive(Parser)]
#[command(name = "forca")]
#[command(about = "Assistente educacional RAG para os materiais do DNA da Força")]
#[command(version)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "./config/forca.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config file and data directories.
    Init,
    /// Ingest and index the course materials.
    Ingest {
        /// Rebuild the collection from scratch.
        #[arg(long)]
        force: bool,
        /// Ingest a single file instead of the whole materials directory.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Ask a question about the course materials.
    Ask {
        question: String,
        /// Student level used by the educational ranking (iniciante,
        /// intermediario, avancado).
        #[arg(long)]
        level: Option<String>,
    },
    /// Show index statistics.
    Stats,
    /// Show provider availability in fallback order.
    Providers,
}

const EXAMPLE_CONFIG: &str = include_str!("../config/forca.example.toml");

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        return init(&cli.config);
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Ingest { force, file } => {
            let mut handler = RagHandler::new(config).await?;
            let report = match file {
                Some(path) => handler.ingest_file(&path, force).await?,
                None => handler.process_documents(force).await?,
            };

            println!("Ingestion complete:");
            println!("  Files processed: {}", report.files_ok);
            println!("  Files skipped:   {}", report.files_failed);
            println!("  Documents:       {}", report.documents);
            println!("  Chunks indexed:  {}", report.chunks_indexed);
            println!("  Chunks unchanged: {}", report.chunks_skipped);
            for message in &report.messages {
                println!("  ! {}", message);
            }
        }
        Commands::Ask { question, level } => {
            let mut handler = RagHandler::new(config).await?;
            let response = handler.generate_response(&question, level.as_deref()).await?;
            println!("{}", response.answer);
        }
        Commands::Stats => {
            let handler = RagHandler::new(config).await?;
            let stats = handler.stats().await?;

            println!("Active collection: {}", stats.active_collection);
            println!("Embedding model:   {}", stats.embedding_identity);
            println!("Chat model:        {}", stats.chat_model);
            println!("Collections:");
            for info in stats.collections {
                println!(
                    "  {} — {} chunks from {} sources ({})",
                    info.name,
                    info.chunks,
                    info.sources,
                    info.embedding_identity.as_deref().unwrap_or("no model bound")
                );
            }
        }
        Commands::Providers => {
            let handler = RagHandler::new(config).await?;
            println!("Providers in fallback order:");
            for status in handler.provider_status().await {
                let mark = if status.available { "ok" } else { "unavailable" };
                println!("  {:<8} {} ({})", status.kind, mark, status.detail);
            }
        }
    }

    Ok(())
}

fn init(config_path: &std::path::Path) -> Result<()> {
    if config_path.exists() {
        println!("Config already exists: {}", config_path.display());
    } else {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(config_path, EXAMPLE_CONFIG)?;
        println!("Wrote {}", config_path.display());
    }

    for dir in ["./materials", "./data"] {
        std::fs::create_dir_all(dir)?;
    }
    println!("Created ./materials and ./data");
    println!("Next: drop course files into ./materials and run `forca ingest`.");
    Ok(())
}
