use clap::{Parser, Subcommand};
use lodestone_retriever::{
    config::EngineConfig,
    engine::DocumentEngine,
    store::ChunkFilter,
};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

/// A CLI tool for the lodestone document retrieval engine.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base directory holding the lodestone.db database file
    #[arg(short, long, default_value = ".")]
    base_dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest files once, without watching
    Ingest {
        /// Files to process
        paths: Vec<PathBuf>,
    },
    /// Watch document roots and keep the store in sync until interrupted
    Watch {
        /// Directories to watch
        roots: Vec<PathBuf>,
    },
    /// Search stored documents
    Search {
        /// The query text
        query: String,
        /// Query intent category, e.g. factual_retrieval or
        /// conceptual_exploration
        #[arg(short, long, default_value = "factual_retrieval")]
        intent: String,
        /// Restrict to these file types
        #[arg(long, value_delimiter = ',')]
        file_types: Vec<String>,
        /// Restrict to this language
        #[arg(long)]
        language: Option<String>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// List stored documents
    List {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show store statistics and readiness information
    Status {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    match args.command {
        Commands::Ingest { paths } => {
            let engine = engine_without_watching(&args.base_dir);
            engine.initialize().await?;
            for path in paths {
                match engine.process_document(&path).await {
                    Ok(chunks) => println!("{}: {} chunks", path.display(), chunks),
                    Err(e) => eprintln!("{}: {e}", path.display()),
                }
            }
            engine.shutdown().await;
            Ok(())
        }
        Commands::Watch { roots } => {
            if roots.is_empty() {
                return Err(anyhow::anyhow!("at least one root directory is required"));
            }
            let mut config = EngineConfig::new(&args.base_dir);
            for root in roots {
                config = config.with_document_root(root);
            }
            let engine = DocumentEngine::new(config);
            engine.initialize().await?;
            engine.wait_for_ready(Duration::from_secs(300)).await?;
            println!("Watching. Press Ctrl-C to stop.");
            tokio::signal::ctrl_c().await?;
            engine.shutdown().await;
            Ok(())
        }
        Commands::Search {
            query,
            intent,
            file_types,
            language,
            format,
        } => {
            let engine = engine_without_watching(&args.base_dir);
            engine.initialize().await?;

            let mut filter = ChunkFilter::default().with_file_types(file_types);
            if let Some(language) = language {
                filter = filter.with_language(language);
            }

            let results = engine.search_with_intent(&query, &intent, &filter).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
                OutputFormat::Summary => {
                    println!("Found {} results:", results.len());
                    for result in results {
                        println!(
                            "  {:.3} | {} (page {}) | {}",
                            result.score,
                            result.chunk.filename,
                            result.chunk.page_number,
                            preview(&result.chunk.content),
                        );
                    }
                }
            }
            engine.shutdown().await;
            Ok(())
        }
        Commands::List { format } => {
            let engine = engine_without_watching(&args.base_dir);
            engine.initialize().await?;
            let documents = engine.documents_metadata().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&documents)?),
                OutputFormat::Summary => {
                    println!("{} documents:", documents.len());
                    for doc in documents {
                        println!(
                            "  {} | {} | {} chunks | {} bytes",
                            doc.document_id, doc.filename, doc.chunk_count, doc.file_size
                        );
                    }
                }
            }
            engine.shutdown().await;
            Ok(())
        }
        Commands::Status { format } => {
            let engine = engine_without_watching(&args.base_dir);
            let init_result = engine.initialize().await;
            let statuses = engine.service_statuses();

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
                OutputFormat::Summary => {
                    println!("State: {:?}", engine.state());
                    for status in &statuses {
                        match &status.message {
                            Some(message) => {
                                println!("  {}: {:?} ({message})", status.name, status.status)
                            }
                            None => println!("  {}: {:?}", status.name, status.status),
                        }
                    }
                    if init_result.is_ok() {
                        let stats = engine.stats().await?;
                        println!(
                            "Store: {} chunks across {} documents, dimension {}",
                            stats.chunk_count, stats.document_count, stats.embedding_dimension
                        );
                    }
                }
            }
            engine.shutdown().await;
            Ok(())
        }
    }
}

fn engine_without_watching(base_dir: &std::path::Path) -> DocumentEngine {
    DocumentEngine::new(EngineConfig::new(base_dir).with_watch_enabled(false))
}

fn preview(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut end = flat.len().min(80);
    while !flat.is_char_boundary(end) {
        end -= 1;
    }
    flat[..end].to_string()
}
