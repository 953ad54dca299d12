use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use coderag_answer::answer::synthesize;
use coderag_answer::llm::LlmClient;
use coderag_core::{CoderagConfig, OutputFormat};
use coderag_index::embedding::EmbeddingClient;
use coderag_index::ingest::ingest;
use coderag_index::search::{self, SearchHit};
use coderag_index::store::CodeIndex;
use coderag_index::symbols;
use coderag_index::walker::repo_key;

#[derive(Parser)]
#[command(
    name = "coderag",
    version,
    about = "Incremental code indexing and hybrid retrieval",
    long_about = "coderag indexes a source tree into content-hashed chunks and answers\n\
                   questions with lexical, vector, or hybrid retrieval.\n\n\
                   Examples:\n  \
                     coderag ingest --path .                 Index (or re-index) a repository\n  \
                     coderag askh 'where are tokens checked' Hybrid search\n  \
                     coderag defs validate_token             Find a definition\n  \
                     coderag answer 'how does login work'    Grounded answer with citations"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .coderag.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Index a repository, re-embedding only changed files
    #[command(long_about = "Index a repository, re-embedding only changed files.\n\n\
        Files whose chunk hashes are unchanged are skipped; removed files are\n\
        dropped from the index. Requires an embedding provider.\n\n\
        Examples:\n  coderag ingest\n  coderag ingest --path ../service")]
    Ingest {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
    /// Lexical search (no embedding provider needed)
    Ask {
        /// Question or keywords
        question: String,
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
        /// Number of hits (default: retrieval.k)
        #[arg(long)]
        k: Option<usize>,
    },
    /// Vector search
    Askv {
        /// Question
        question: String,
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
        /// Number of hits (default: retrieval.k)
        #[arg(long)]
        k: Option<usize>,
    },
    /// Hybrid search: vector recall, lexical rerank
    Askh {
        /// Question
        question: String,
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
        /// Number of hits (default: retrieval.k)
        #[arg(long)]
        k: Option<usize>,
        /// Vector-recall candidates (default: retrieval.candidates)
        #[arg(long)]
        cand: Option<usize>,
    },
    /// Find definitions of a symbol by exact name
    Defs {
        /// Symbol name
        name: String,
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
        /// Maximum entries (default: retrieval.definitions_limit)
        #[arg(long)]
        k: Option<usize>,
    },
    /// Find lines mentioning a symbol
    #[command(long_about = "Find lines mentioning a symbol.\n\n\
        A plain substring scan: matches inside longer identifiers are reported,\n\
        and lines containing `def ` or `class ` are skipped.")]
    Refs {
        /// Symbol name
        name: String,
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
        /// Maximum lines (default: retrieval.references_limit)
        #[arg(long)]
        k: Option<usize>,
    },
    /// Answer a question from hybrid hits with a generative model
    #[command(long_about = "Answer a question from hybrid hits with a generative model.\n\n\
        The model sees only the retrieved chunks and cites them as [chunk:<id>].\n\
        Requires both an embedding provider and an LLM provider.")]
    Answer {
        /// Question
        question: String,
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
        /// Number of context chunks (default: retrieval.k)
        #[arg(long)]
        k: Option<usize>,
        /// Vector-recall candidates (default: retrieval.candidates)
        #[arg(long)]
        cand: Option<usize>,
    },
    /// Show index statistics for a repository
    Stats {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
    /// Create a default .coderag.toml configuration file
    #[command(long_about = "Create a default .coderag.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .coderag.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

const DEFAULT_CONFIG: &str = r#"# coderag configuration

[index]
# db_path = ".coderag/index.db"   # relative paths resolve against the repository
# extra_ignores = ["fixtures/", "*.snap"]
# max_file_bytes = 1048576

[chunking]
# max_lines = 120
# overlap = 20
# small_file_lines = 250
# header_lines = 60
# min_node_lines = 3

[retrieval]
# k = 6
# candidates = 30
# definitions_limit = 10
# references_limit = 20

[embedding]
# provider = "openai"              # openai | voyage | ollama
# model = "text-embedding-3-small"
# batch_size = 64

[llm]
# provider = "openai"
# model = "gpt-4o"
# temperature = 0.1
"#;

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1mcoderag\x1b[0m v{version}\n");
        println!("Quick start:");
        println!("  \x1b[36mcoderag init\x1b[0m                  Create a .coderag.toml config file");
        println!("  \x1b[36mcoderag ingest\x1b[0m                Index the current repository");
        println!("  \x1b[36mcoderag askh '<question>'\x1b[0m     Hybrid search");
        println!("  \x1b[36mcoderag answer '<question>'\x1b[0m   Grounded answer with citations");
    } else {
        println!("coderag v{version}\n");
        println!("Quick start:");
        println!("  coderag init                  Create a .coderag.toml config file");
        println!("  coderag ingest                Index the current repository");
        println!("  coderag askh '<question>'     Hybrid search");
        println!("  coderag answer '<question>'   Grounded answer with citations");
    }
    println!("\nRun 'coderag --help' for all commands.");
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(explicit: Option<&Path>) -> Result<CoderagConfig> {
    let config = match explicit {
        Some(path) => CoderagConfig::from_file(path)?,
        None => {
            let default_path = Path::new(".coderag.toml");
            if default_path.exists() {
                CoderagConfig::from_file(default_path)?
            } else {
                CoderagConfig::default()
            }
        }
    };
    Ok(config)
}

fn db_path(repo: &Path, config: &CoderagConfig) -> PathBuf {
    if config.index.db_path.is_absolute() {
        config.index.db_path.clone()
    } else {
        repo.join(&config.index.db_path)
    }
}

/// Open an existing index for querying.
fn open_existing(repo: &Path, config: &CoderagConfig) -> Result<(CodeIndex, String)> {
    let db = db_path(repo, config);
    if !db.exists() {
        miette::bail!(miette::miette!(
            help = format!("Run `coderag ingest --path {}` first", repo.display()),
            "No index found at {}",
            db.display()
        ));
    }
    Ok((CodeIndex::open(&db)?, repo_key(repo)?))
}

fn spinner(message: &'static str) -> Result<Option<indicatif::ProgressBar>> {
    if !std::io::stderr().is_terminal() {
        return Ok(None);
    }
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_style(
        indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
            .into_diagnostic()?,
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Ok(Some(pb))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn print_hits(hits: &[SearchHit], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(&hits);
    }
    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. {}:{}-{} (score: {:.4}) [chunk:{}]",
            i + 1,
            hit.path,
            hit.start_line,
            hit.end_line,
            hit.score,
            hit.chunk_id,
        );
        if let Some(why) = &hit.why {
            println!("   {why}");
        }
        // Show a snippet preview (first 3 lines)
        let preview: String = hit
            .preview
            .lines()
            .take(3)
            .map(|l| format!("   {l}"))
            .collect::<Vec<_>>()
            .join("\n");
        println!("{preview}\n");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => {
            print_welcome(use_color);
        }
        Some(Command::Ingest { ref path }) => {
            let embedder = EmbeddingClient::with_config(&config.embedding)?;
            let mut index = CodeIndex::open(&db_path(path, &config))?;

            let pb = spinner("Indexing repository...")?;
            let report = ingest(&mut index, &embedder, path, &config)
                .await
                .inspect_err(|_e| {
                    if let Some(pb) = &pb {
                        pb.finish_with_message("Failed");
                    }
                })?;
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }

            match cli.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Text => {
                    println!(
                        "Indexed {}: {} files seen, {} changed, {} skipped, {} removed ({} chunks embedded, {} symbols)",
                        report.repo_root,
                        report.files_seen,
                        report.changed,
                        report.skipped,
                        report.removed,
                        report.chunks_embedded,
                        report.symbols,
                    );
                }
            }
        }
        Some(Command::Ask {
            ref question,
            ref path,
            k,
        }) => {
            let (index, repo) = open_existing(path, &config)?;
            let k = k.unwrap_or(config.retrieval.k);
            let hits = search::search_lexical(&index, &repo, question, k)?;
            print_hits(&hits, cli.format)?;
        }
        Some(Command::Askv {
            ref question,
            ref path,
            k,
        }) => {
            let (index, repo) = open_existing(path, &config)?;
            let embedder = EmbeddingClient::with_config(&config.embedding)?;
            let k = k.unwrap_or(config.retrieval.k);
            let hits = search::search_vector(&index, &embedder, &repo, question, k).await?;
            print_hits(&hits, cli.format)?;
        }
        Some(Command::Askh {
            ref question,
            ref path,
            k,
            cand,
        }) => {
            let (index, repo) = open_existing(path, &config)?;
            let embedder = EmbeddingClient::with_config(&config.embedding)?;
            let k = k.unwrap_or(config.retrieval.k);
            let cand = cand.unwrap_or(config.retrieval.candidates);
            let hits = search::search_hybrid(&index, &embedder, &repo, question, k, cand).await?;
            print_hits(&hits, cli.format)?;
        }
        Some(Command::Defs {
            ref name,
            ref path,
            k,
        }) => {
            let (index, repo) = open_existing(path, &config)?;
            let k = k.unwrap_or(config.retrieval.definitions_limit);
            let defs = symbols::find_definitions(&index, &repo, name, k)?;
            match cli.format {
                OutputFormat::Json => print_json(&defs)?,
                OutputFormat::Text if defs.is_empty() => println!("No definitions found."),
                OutputFormat::Text => {
                    for d in &defs {
                        println!(
                            "{} {} {}:{}-{} [chunk:{}]",
                            d.kind, d.name, d.path, d.start_line, d.end_line, d.chunk_id
                        );
                    }
                }
            }
        }
        Some(Command::Refs {
            ref name,
            ref path,
            k,
        }) => {
            let (index, repo) = open_existing(path, &config)?;
            let k = k.unwrap_or(config.retrieval.references_limit);
            let refs = symbols::find_references(&index, &repo, name, k)?;
            match cli.format {
                OutputFormat::Json => print_json(&refs)?,
                OutputFormat::Text if refs.is_empty() => println!("No references found."),
                OutputFormat::Text => {
                    for r in &refs {
                        println!("{}:{}: {}", r.path, r.line, r.text);
                    }
                }
            }
        }
        Some(Command::Answer {
            ref question,
            ref path,
            k,
            cand,
        }) => {
            let (index, repo) = open_existing(path, &config)?;
            let llm = LlmClient::new(&config.llm)?;
            let embedder = EmbeddingClient::with_config(&config.embedding)?;

            let mut retrieval = config.retrieval.clone();
            retrieval.k = k.unwrap_or(retrieval.k);
            retrieval.candidates = cand.unwrap_or(retrieval.candidates);

            let pb = spinner("Generating answer...")?;
            let answer = synthesize(&index, &embedder, &llm, &repo, question, &retrieval, &config.llm)
                .await
                .inspect_err(|_e| {
                    if let Some(pb) = &pb {
                        pb.finish_with_message("Failed");
                    }
                })?;
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }

            match cli.format {
                OutputFormat::Json => print_json(&answer)?,
                OutputFormat::Text => {
                    println!("{}\n", answer.text);
                    let cited = index.chunks_by_ids(&answer.citations)?;
                    if !cited.is_empty() {
                        println!("Sources:");
                        for c in &cited {
                            println!(
                                "  [chunk:{}] {}:{}-{}",
                                c.id, c.chunk.path, c.chunk.start_line, c.chunk.end_line
                            );
                        }
                    }
                    let unsupported = answer.unsupported_citations();
                    if !unsupported.is_empty() {
                        tracing::warn!(?unsupported, "answer cites chunks outside the retrieved context");
                    }
                }
            }
        }
        Some(Command::Stats { ref path }) => {
            let (index, repo) = open_existing(path, &config)?;
            let stats = index.stats(&repo)?;
            match cli.format {
                OutputFormat::Json => print_json(&stats)?,
                OutputFormat::Text => {
                    println!("Repository: {repo}");
                    println!("Files:      {}", stats.total_files);
                    println!(
                        "Chunks:     {} ({} embedded)",
                        stats.total_chunks, stats.embedded_chunks
                    );
                    println!("Symbols:    {}", stats.total_symbols);
                    if let Some(dims) = stats.embedding_dimensions {
                        println!("Dimensions: {dims}");
                    }
                    println!("Index size: {} bytes", stats.index_size_bytes);
                }
            }
        }
        Some(Command::Init) => {
            let path = Path::new(".coderag.toml");
            if path.exists() {
                miette::bail!(".coderag.toml already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created .coderag.toml with default configuration");
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "coderag", &mut std::io::stdout());
        }
    }

    Ok(())
}
