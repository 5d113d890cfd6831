//! # docket CLI
//!
//! Command-line interface for docket, an embedded vector store that answers
//! questions over a local document collection.
//!
//! ## Commands
//!
//! - `docket ingest --text-dir <DIR>` - Chunk, embed and store text files
//! - `docket ingest --raw-docs <DIR>` - Same, from JSON raw documents
//! - `docket search <QUESTION>` - Ranked, filtered contexts
//! - `docket ask <QUESTION>` - Generated or extractive answer with citations
//! - `docket serve` - HTTP API over the same operations
//! - `docket status` - Stored collections
//!
//! ## Examples
//!
//! ```bash
//! docket ingest --text-dir ~/cases --collection court-files
//! docket search "demand letter path:15_Letters_and_Emails from:2025-01-01"
//! docket ask "what did opposing counsel propose?" --mode detailed --format json
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use docket_answer::{AnswerService, AskRequest, Assembler, GenerationSettings, OpenAiGenerator};
#[cfg(feature = "candle")]
use docket_embed::CandleEmbedder;
use docket_core::{AnswerMode, Embedder, EmbeddingConfig, EmbeddingStore, Filter, Generator};
use docket_embed::{EmbedderPool, NoopEmbedder, OpenAiEmbedder};
use docket_ingest::{IngestService, ParagraphChunker, RawDocDir, TextFileSource};
use docket_query::{MtimeResolver, QueryParser, Retriever};
use docket_store::{FlatFileStore, MemoryStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod server;

use config::{Config, EmbeddingProvider, StoreBackend};

const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Parser)]
#[command(name = "docket")]
#[command(about = "Embedded vector store with filtered retrieval and cited answers")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/docket/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum ModeArg {
    #[default]
    Compact,
    Detailed,
}

impl From<ModeArg> for AnswerMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Compact => Self::Compact,
            ModeArg::Detailed => Self::Detailed,
        }
    }
}

/// Arguments shared by `search` and `ask`.
#[derive(Args)]
struct QueryArgs {
    /// Question; may contain path:, ext:, from:, to: and limit: tokens
    question: String,

    /// Collection to query (default from config)
    #[arg(long)]
    collection: Option<String>,

    /// Maximum contexts
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Keep only paths containing this substring
    #[arg(long)]
    path: Option<String>,

    /// Keep only paths ending with this extension, e.g. .pdf
    #[arg(long)]
    ext: Option<String>,

    /// Keep only documents modified on or after this date
    #[arg(long)]
    from: Option<String>,

    /// Keep only documents modified on or before this date
    #[arg(long)]
    to: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest documents into a collection
    Ingest {
        /// Target collection (default from config)
        #[arg(long)]
        collection: Option<String>,

        /// Directory of JSON raw documents. Date filters read side files
        /// from `query.raw_docs_dir`, so point that setting here as well.
        #[arg(long, conflicts_with = "text_dir", required_unless_present = "text_dir")]
        raw_docs: Option<PathBuf>,

        /// Directory tree of .txt/.md/.pdf files
        #[arg(long)]
        text_dir: Option<PathBuf>,
    },

    /// Retrieve ranked contexts
    Search {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Answer a question
    Ask {
        #[command(flatten)]
        query: QueryArgs,

        /// Answer layout
        #[arg(short, long, default_value = "compact")]
        mode: ModeArg,
    },

    /// Serve the HTTP API
    Serve {
        /// Address to bind (default from config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Show stored collections
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print sample configuration file
    Init,
    /// Show config file path
    Path,
}

/// Output structure for search results.
#[derive(Serialize)]
struct SearchOutput {
    query: String,
    collection: String,
    results: Vec<ResultItem>,
}

#[derive(Serialize)]
struct ResultItem {
    rank: usize,
    id: String,
    source: String,
    chunk: String,
    score: f32,
    content: String,
}

/// Output structure for status.
#[derive(Serialize)]
struct StatusOutput {
    backend: String,
    embedding_model: String,
    collections: Vec<docket_core::CollectionInfo>,
}

fn create_store(config: &Config) -> Result<Arc<dyn EmbeddingStore>> {
    match config.store.backend {
        StoreBackend::Flat => {
            let root = config
                .store
                .root_dir()
                .context("Failed to determine store directory")?;
            Ok(Arc::new(FlatFileStore::new(root)))
        }
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

fn api_key() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
}

/// Create the embedder pool described by the config.
async fn create_embedder(config: &Config) -> Result<Arc<EmbedderPool>> {
    let section = &config.embedding;
    let embedder: Arc<dyn Embedder> = match section.provider {
        EmbeddingProvider::Noop => {
            warn!("Using the noop embedder; search results will be meaningless");
            Arc::new(NoopEmbedder::with_dimension(section.dimension))
        }
        EmbeddingProvider::OpenAi => {
            let key = api_key();
            if key.is_none() {
                warn!("{} is not set; embedding requests are unauthenticated", API_KEY_ENV);
            }
            Arc::new(
                OpenAiEmbedder::new(&section.base_url, key, &section.model, section.dimension)
                    .context("Failed to create embedding client")?,
            )
        }
        #[cfg(feature = "candle")]
        EmbeddingProvider::Candle => {
            let cache_dir = config::cache_dir()
                .context("Failed to get cache directory")?
                .join("models");
            let embedder = CandleEmbedder::new(cache_dir);
            info!("Initializing embedder (this may download the model on first run)...");
            embedder
                .init()
                .await
                .context("Failed to initialize embedder")?;
            Arc::new(embedder)
        }
        #[cfg(not(feature = "candle"))]
        EmbeddingProvider::Candle => {
            anyhow::bail!("The candle embedding provider requires building with --features candle")
        }
    };

    let embed_config = EmbeddingConfig {
        normalize: section.normalize,
        batch_size: section.batch_size.max(1),
    };
    Ok(Arc::new(EmbedderPool::with_config(
        embedder,
        section.max_concurrent,
        embed_config,
    )))
}

fn create_generator(config: &Config) -> Result<Option<(Arc<dyn Generator>, GenerationSettings)>> {
    let section = &config.generation;
    if !section.enabled {
        return Ok(None);
    }
    let Some(key) = api_key() else {
        info!("{} is not set; answers will be extractive", API_KEY_ENV);
        return Ok(None);
    };

    let timeout = Duration::from_secs(section.timeout_secs.max(1));
    let generator = OpenAiGenerator::new(&section.base_url, Some(key), &section.model, timeout)
        .context("Failed to create generation client")?;
    let settings = GenerationSettings {
        max_tokens: section.max_tokens,
        temperature: section.temperature,
        timeout,
    };
    Ok(Some((Arc::new(generator), settings)))
}

/// Create the retrieval and answering stack.
async fn create_service(config: &Config) -> Result<AnswerService> {
    let store = create_store(config)?;
    let embedder = create_embedder(config).await?;
    let resolver = MtimeResolver::new(config.raw_docs_dir());
    let retriever = Arc::new(Retriever::new(
        store,
        embedder,
        resolver,
        config.query.candidate_multiplier,
    ));

    let service = AnswerService::new(retriever, Assembler::default());
    Ok(match create_generator(config)? {
        Some((generator, settings)) => service.with_generator(generator, settings),
        None => service,
    })
}

/// Turn CLI query arguments into an [`AskRequest`].
fn build_request(config: &Config, args: QueryArgs, mode: AnswerMode) -> Result<AskRequest> {
    let overrides = Filter::from_parts(
        args.path,
        args.ext,
        args.from.as_deref(),
        args.to.as_deref(),
    )
    .context("Invalid filter")?;

    let parsed = QueryParser::new(config.query.default_top_k)
        .parse(&args.question)
        .with_overrides(overrides);

    let top_k = args.top_k.unwrap_or(parsed.limit);
    if top_k == 0 {
        anyhow::bail!("--top-k must be positive");
    }

    Ok(AskRequest {
        question: parsed.text,
        collection: args
            .collection
            .unwrap_or_else(|| config.query.default_collection.clone()),
        top_k,
        mode,
        filter: parsed.filter,
    })
}

fn log_level(cli: &Cli, config: &Config) -> Level {
    if cli.verbose {
        return Level::DEBUG;
    }
    config.logging.level.parse().unwrap_or(Level::INFO)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config from file or CLI-specified path
    let config = if let Some(ref path) = cli.config {
        Config::load_from(Some(path.clone()))
            .context(format!("Failed to load config from {}", path.display()))?
    } else {
        Config::load().context("Failed to load config")?
    };

    // Setup logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(&cli, &config))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Ingest {
            collection,
            raw_docs,
            text_dir,
        } => {
            let collection = collection.unwrap_or_else(|| config.query.default_collection.clone());
            let store = create_store(&config)?;
            let embedder = create_embedder(&config).await?;
            let chunker = ParagraphChunker::new(config.ingest.chunk_size);

            let result = if let Some(dir) = raw_docs {
                if !dir.is_dir() {
                    anyhow::bail!("Raw docs directory does not exist: {}", dir.display());
                }
                let configured = config.raw_docs_dir();
                if raw_docs_differ(&dir, configured.as_deref()) {
                    let resolver_dir = configured
                        .as_deref()
                        .map_or_else(|| "nowhere".to_string(), |p| p.display().to_string());
                    warn!(
                        "Ingesting from {} but date filters read raw docs from {}; \
                         set query.raw_docs_dir to keep dates resolvable",
                        dir.display(),
                        resolver_dir
                    );
                }
                IngestService::new(store, embedder, chunker)
                    .ingest(&collection, &RawDocDir::new(dir))
                    .await
            } else if let Some(dir) = text_dir {
                if !dir.is_dir() {
                    anyhow::bail!("Directory does not exist: {}", dir.display());
                }
                let mut service = IngestService::new(store, embedder, chunker);
                if let Some(mirror) = config.raw_docs_dir() {
                    service = service.with_raw_docs_mirror(mirror);
                }
                service
                    .ingest(&collection, &TextFileSource::new(dir.canonicalize()?))
                    .await
            } else {
                anyhow::bail!("Either --raw-docs or --text-dir is required");
            };
            let report = result.context("Ingest failed")?;

            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => {
                    println!("Ingested into '{collection}'");
                    println!("  Documents: {}", report.documents_seen);
                    println!("  Ingested:  {}", report.ingested);
                    println!("  Skipped:   {}", report.skipped);
                    println!("  Empty:     {}", report.empty);
                    println!("  Failed:    {}", report.failed);
                    println!("  Chunks:    {}", report.chunks);
                }
            }
        }

        Commands::Search { query } => {
            let service = create_service(&config).await?;
            let request = build_request(&config, query, AnswerMode::Compact)?;

            let retrieval = service
                .retriever()
                .retrieve(
                    &request.collection,
                    &request.question,
                    request.top_k,
                    &request.filter,
                )
                .await
                .context("Search failed")?;

            match cli.format {
                OutputFormat::Json => {
                    let output = SearchOutput {
                        query: request.question.clone(),
                        collection: request.collection.clone(),
                        results: retrieval
                            .contexts
                            .iter()
                            .map(|c| ResultItem {
                                rank: c.rank,
                                id: c.id.clone(),
                                source: c.source_label(),
                                chunk: c.chunk_label(),
                                score: c.score,
                                content: truncate(&c.document, 200),
                            })
                            .collect(),
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    println!("Query: {}\n", request.question);
                    if retrieval.contexts.is_empty() {
                        println!("No results found.");
                    } else {
                        for (i, ctx) in retrieval.contexts.iter().enumerate() {
                            println!(
                                "{}. {} (chunk {}, score: {:.3})",
                                i + 1,
                                ctx.source_label(),
                                ctx.chunk_label(),
                                ctx.score
                            );
                            println!("   {}", truncate(&ctx.document, 100));
                            println!();
                        }
                    }
                }
            }
        }

        Commands::Ask { query, mode } => {
            let service = create_service(&config).await?;
            let request = build_request(&config, query, mode.into())?;
            let answer = service.ask(&request).await.context("Ask failed")?;

            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&answer)?),
                OutputFormat::Text => println!("{}", answer.text),
            }
        }

        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let state = Arc::new(server::AppState {
                service: create_service(&config).await?,
                parser: QueryParser::new(config.query.default_top_k),
                default_collection: config.query.default_collection.clone(),
            });
            server::serve(state, &bind).await?;
        }

        Commands::Status => {
            let store = create_store(&config)?;
            let collections = store
                .collections()
                .await
                .context("Failed to list collections")?;

            match cli.format {
                OutputFormat::Json => {
                    let output = StatusOutput {
                        backend: store.backend().to_string(),
                        embedding_model: config.embedding.model.clone(),
                        collections,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    println!("Store: {}", store.backend());
                    if let Some(root) = config.store.root_dir() {
                        println!("  Root: {}", root.display());
                    }
                    if collections.is_empty() {
                        println!("No collections yet. Run 'docket ingest' to create one.");
                    }
                    for info in collections {
                        println!(
                            "  {}: {} records, dimension {}, generation {}",
                            info.name, info.records, info.dimension, info.generation
                        );
                    }
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&config)
                            .context("Failed to serialize config")?
                    );
                }
                OutputFormat::Text => {
                    println!(
                        "{}",
                        toml::to_string_pretty(&config).context("Failed to serialize config")?
                    );
                }
            },
            ConfigAction::Init => {
                println!("{}", Config::sample_toml());
            }
            ConfigAction::Path => {
                if let Some(path) = Config::config_path() {
                    println!("{}", path.display());
                } else {
                    println!("Could not determine config directory");
                }
            }
        },
    }

    Ok(())
}

/// Truncate a string to `max_chars` characters, adding ellipsis if needed.
fn truncate(s: &str, max_chars: usize) -> String {
    let s = s.replace('\n', " ").replace('\r', "");
    if s.chars().count() <= max_chars {
        s
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// True when `dir` is not the raw-docs directory the date resolver reads.
fn raw_docs_differ(dir: &Path, configured: Option<&Path>) -> bool {
    let Some(configured) = configured else {
        return true;
    };
    let canonical = |p: &Path| p.canonicalize().unwrap_or_else(|_| p.to_path_buf());
    canonical(dir) != canonical(configured)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(question: &str) -> QueryArgs {
        QueryArgs {
            question: question.to_string(),
            collection: None,
            top_k: None,
            path: None,
            ext: None,
            from: None,
            to: None,
        }
    }

    #[test]
    fn test_raw_docs_differ() {
        let temp_dir = tempfile::tempdir().unwrap();
        let raw = temp_dir.path().join("raw_docs");
        std::fs::create_dir_all(&raw).unwrap();

        assert!(!raw_docs_differ(&raw, Some(&raw)));
        assert!(!raw_docs_differ(&raw.join("."), Some(&raw)));
        assert!(raw_docs_differ(&raw, Some(&temp_dir.path().join("elsewhere"))));
        assert!(raw_docs_differ(&raw, None));
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_request_uses_config_defaults() {
        let config = Config::default();
        let request = build_request(&config, args("demand letter"), AnswerMode::Compact).unwrap();
        assert_eq!(request.collection, "documents");
        assert_eq!(request.top_k, 5);
        assert!(request.filter.is_empty());
    }

    #[test]
    fn test_build_request_merges_dsl_and_flags() {
        let config = Config::default();
        let mut a = args("demand letter path:15_Letters_and_Emails limit:2");
        a.ext = Some(".pdf".into());
        a.top_k = Some(7);
        let request = build_request(&config, a, AnswerMode::Detailed).unwrap();

        assert_eq!(request.question, "demand letter");
        assert_eq!(request.top_k, 7);
        assert_eq!(request.filter.path_contains.as_deref(), Some("15_Letters_and_Emails"));
        assert_eq!(request.filter.file_extension.as_deref(), Some(".pdf"));
        assert_eq!(request.mode, AnswerMode::Detailed);
    }

    #[test]
    fn test_build_request_rejects_bad_date() {
        let mut a = args("letters");
        a.from = Some("someday".into());
        assert!(build_request(&Config::default(), a, AnswerMode::Compact).is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line one\nline two", 100), "line one line two");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
        assert_eq!(truncate("ééééé", 4), "é...");
    }
}
