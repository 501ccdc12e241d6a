mod commands;
#[cfg(feature = "mcp")]
mod mcp;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::export::ExportFormat;
use commands::ScopeArgs;
use second_brain::{Brain, Config, NoteId, StorePaths};

#[derive(Parser)]
#[command(name = "brain")]
#[command(about = "Personal knowledge store with hybrid keyword + semantic search", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, global = true, help = "Store directory (default: $SECOND_BRAIN_HOME or ~/.second-brain)")]
    home: Option<PathBuf>,
    #[arg(long, global = true, help = "JSON output")]
    json: bool,
    #[arg(short, long, global = true, help = "Debug logging on stderr")]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    // ===== Notes =====
    /// Save a note (reads stdin when no text is given)
    Add {
        text: Vec<String>,
        #[arg(short, long, default_value = "", help = "Comma-separated tags")]
        tags: String,
    },
    /// Show one note
    Get { id: NoteId },
    /// Replace a note's text (and optionally its tags)
    Update {
        id: NoteId,
        text: Vec<String>,
        #[arg(short, long, help = "Replace tags (comma-separated)")]
        tags: Option<String>,
    },
    /// Delete one note
    Delete { id: NoteId },
    /// Toggle the favorite flag
    Favorite { id: NoteId },

    // ===== Browsing =====
    /// List notes, newest first
    List {
        #[arg(long, help = "Case-insensitive body substring")]
        text: Option<String>,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, short, help = "Limit results")]
        limit: Option<usize>,
    },
    /// Most recent notes
    Recent {
        #[arg(default_value_t = 10)]
        limit: usize,
    },
    /// Favorite notes
    Favorites,

    // ===== Retrieval =====
    /// Hybrid keyword + semantic search
    #[command(alias = "s")]
    Search {
        query: Vec<String>,
        #[arg(short, help = "Number of results (default: search.default_k)")]
        k: Option<usize>,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Answer a question from your notes
    Ask {
        question: Vec<String>,
        #[command(flatten)]
        scope: ScopeArgs,
    },

    // ===== Maintenance =====
    /// Export notes as JSON or copy the database
    Export {
        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,
        #[arg(short, long, help = "Destination file (JSON defaults to stdout)")]
        output: Option<PathBuf>,
    },
    /// Store and index status
    Status,
    /// Rebuild the full-text index, and optionally the vector index
    Reindex {
        #[arg(long, help = "Also rebuild the vector index from stored embeddings")]
        vectors: bool,
        #[arg(long, help = "Embed notes that were saved without a vector")]
        embed_missing: bool,
    },

    // ===== MCP Server =====
    /// Start MCP server on stdio
    #[cfg(feature = "mcp")]
    Mcp {
        #[arg(long, help = "Show MCP client configuration instructions")]
        install: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    #[cfg(feature = "mcp")]
    if let Commands::Mcp { install: true } = cli.command {
        print_mcp_install_instructions(cli.home.as_deref());
        return Ok(());
    }

    let paths = StorePaths::resolve(cli.home.as_deref());
    let config = Config::load(&paths.config)?;
    let default_k = config.search.default_k;
    let brain = Brain::open(&paths, config)?;

    #[cfg(feature = "mcp")]
    if let Commands::Mcp { .. } = cli.command {
        return run_mcp_server(brain);
    }

    let session = brain.session()?;
    let json = cli.json;

    match cli.command {
        Commands::Add { text, tags } => {
            let body = commands::text_arg(&text)?;
            commands::add::run(&session, &body, &tags, json)
        }
        Commands::Get { id } => commands::note::get(&session, id, json),
        Commands::Update { id, text, tags } => {
            let body = commands::text_arg(&text)?;
            commands::note::update(&session, id, &body, tags.as_deref(), json)
        }
        Commands::Delete { id } => commands::note::delete(&session, id, json),
        Commands::Favorite { id } => commands::note::favorite(&session, id, json),

        Commands::List { text, scope, limit } => commands::list::run(&session, text, &scope, limit, json),
        Commands::Recent { limit } => commands::list::recent(&session, limit, json),
        Commands::Favorites => commands::list::favorites(&session, json),

        Commands::Search { query, k, scope } => {
            commands::search::run(&session, &query.join(" "), k.unwrap_or(default_k), &scope, json)
        }
        Commands::Ask { question, scope } => {
            let question = commands::text_arg(&question)?;
            commands::ask::run(&session, &question, &scope, json)
        }

        Commands::Export { format, output } => {
            commands::export::run(&session, format, output.as_deref(), json)
        }
        Commands::Status => commands::status::run(&session, json),
        Commands::Reindex { vectors, embed_missing } => {
            commands::reindex::run(&session, vectors, embed_missing, json)
        }

        #[cfg(feature = "mcp")]
        Commands::Mcp { .. } => Ok(()),
    }
}

/// Logs go to stderr so stdout stays clean for JSON and MCP traffic.
fn init_tracing(verbose: bool) {
    let default = if verbose { "second_brain=debug,brain=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(feature = "mcp")]
fn run_mcp_server(brain: Brain) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(mcp::run_mcp_server(brain))
}

#[cfg(feature = "mcp")]
fn print_mcp_install_instructions(home: Option<&std::path::Path>) {
    use colored::Colorize;

    let binary_path = std::env::current_exe()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "brain".to_string());

    let args = match home {
        Some(h) => format!(r#"["--home", "{}", "mcp"]"#, h.display()),
        None => r#"["mcp"]"#.to_string(),
    };

    println!("{}", "MCP Server Installation Guide".bold().cyan());
    println!();
    println!("Add the following to your MCP client configuration:");
    println!();
    println!(r#"{{
  "mcpServers": {{
    "second-brain": {{
      "command": "{}",
      "args": {}
    }}
  }}
}}"#, binary_path, args);
    println!();
    println!("{}", "Available tools:".bold());
    println!("  • {} - Hybrid keyword + semantic search", "brain_search".green());
    println!("  • {} - Save a note", "brain_add".green());
    println!("  • {} - Get one note by id", "brain_get_note".green());
    println!("  • {} - List notes with filters", "brain_list_notes".green());
    println!("  • {} - Store status", "brain_status".green());
}
