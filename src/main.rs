use clap::{Parser, Subcommand};
use strata::config::find_store_path;
use strata::TieredMemoryStore;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;

#[derive(Parser)]
#[command(name = "strata")]
#[command(version)]
#[command(about = "Tiered session and long-term memory with semantic search")]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Initialize a .strata directory
    Init {
        /// Directory to initialize .strata in
        #[arg(short, long, default_value = ".")]
        path: String,
    },

    /// Remember something
    Remember {
        /// Content to remember
        content: String,

        /// Metadata entry as key=value (repeatable; JSON values allowed)
        #[arg(short, long = "meta")]
        meta: Vec<String>,

        /// Keep it in an active session's short-term tier
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Show one memory
    Get {
        /// Memory ID
        id: String,
    },

    /// Recall memories by semantic search
    Recall {
        /// Search query
        query: String,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,

        /// Also search this session's short-term memories
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Update a memory
    Update {
        /// Memory ID
        id: String,

        /// New content (re-embedded)
        #[arg(short, long)]
        text: Option<String>,

        /// Metadata entry to merge as key=value (repeatable)
        #[arg(short, long = "meta")]
        meta: Vec<String>,
    },

    /// Forget a memory
    Forget {
        /// Memory ID to forget
        id: String,

        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// List memories
    List {
        /// Only memories of this session, in either tier
        #[arg(short, long)]
        session: Option<String>,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Manage sessions
    #[command(subcommand)]
    Session(SessionCommands),

    /// Show statistics
    Stats,

    /// Drop expired short-term memories
    Purge,

    /// View or set configuration
    Config {
        /// Config key
        key: Option<String>,

        /// Config value
        value: Option<String>,

        /// List available embedding models
        #[arg(long)]
        list_models: bool,
    },

    /// Run commands interactively against one open store
    Shell,
}

#[derive(Subcommand)]
pub(crate) enum SessionCommands {
    /// Start a new session
    Start {
        /// Metadata entry as key=value (repeatable)
        #[arg(short, long = "meta")]
        meta: Vec<String>,
    },

    /// End a session, moving its memories to long-term storage
    End {
        /// Session ID
        id: String,

        /// Summary to record on the session
        #[arg(long)]
        summary: Option<String>,
    },

    /// Retry moving memories left behind by a failed end
    Retry {
        /// Session ID
        id: String,
    },

    /// Show one session
    Show {
        /// Session ID
        id: String,
    },

    /// List sessions
    List,
}

/// Open the store found from the current directory
pub(crate) fn open_store() -> Result<TieredMemoryStore, String> {
    let path = find_store_path().ok_or("No .strata directory found. Run 'strata init' first.")?;
    TieredMemoryStore::open_at(&path).map_err(|e| format!("Failed to open store: {}", e))
}

/// Run a command that needs an open store
pub(crate) fn dispatch(store: &TieredMemoryStore, command: Commands) -> Result<(), String> {
    match command {
        Commands::Remember {
            content,
            meta,
            session,
        } => cli::memory::run_remember(store, &content, &meta, session.as_deref()),
        Commands::Get { id } => cli::memory::run_get(store, &id),
        Commands::Recall {
            query,
            limit,
            session,
        } => cli::memory::run_recall(store, &query, limit, session.as_deref()),
        Commands::Update { id, text, meta } => {
            cli::memory::run_update(store, &id, text.as_deref(), &meta)
        }
        Commands::Forget { id, force } => cli::memory::run_forget(store, &id, force),
        Commands::List { session, limit } => {
            cli::memory::run_list(store, session.as_deref(), limit)
        }
        Commands::Session(cmd) => match cmd {
            SessionCommands::Start { meta } => cli::session::run_start(store, &meta),
            SessionCommands::End { id, summary } => cli::session::run_end(store, &id, summary),
            SessionCommands::Retry { id } => cli::session::run_retry(store, &id),
            SessionCommands::Show { id } => cli::session::run_show(store, &id),
            SessionCommands::List => cli::session::run_list(store),
        },
        Commands::Stats => cli::memory::run_stats(store),
        Commands::Purge => cli::memory::run_purge(store),
        Commands::Init { .. } | Commands::Config { .. } | Commands::Shell => {
            Err("Not available here".to_string())
        }
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strata=warn")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { path } => cli::memory::run_init(&path),
        Commands::Config {
            key,
            value,
            list_models,
        } => cli::config::run_config(key.as_deref(), value.as_deref(), list_models),
        Commands::Shell => open_store().and_then(|store| cli::shell::run_shell(&store)),
        command => open_store().and_then(|store| dispatch(&store, command)),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
