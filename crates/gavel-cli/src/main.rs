mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_FAILURE, EXIT_REQUEST_ERROR, EXIT_STORE_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "gavel",
    version,
    about = "Rule enforcement engine for design, component, and test registries"
)]
struct Cli {
    /// Path to the Gavel store directory.
    #[arg(long, default_value = "~/.local/share/gavel")]
    store: String,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Initialize a new store.
    Init,
    /// Evaluate a request without committing anything (dry run).
    Check {
        /// Path to a request TOML file.
        request: PathBuf,
    },
    /// Evaluate a request and commit it if every rule passes.
    Submit {
        /// Path to a request TOML file.
        request: PathBuf,
    },
    /// Show one resource record.
    Get {
        /// Resource id.
        id: String,
        /// Also match soft-deleted records.
        #[arg(long, default_value_t = false)]
        include_deleted: bool,
    },
    /// List resource records.
    List {
        /// Only records of this kind (design, component, or test).
        #[arg(long)]
        kind: Option<String>,
        /// Only components and tests referencing this design.
        #[arg(long)]
        design: Option<String>,
        /// Include soft-deleted records.
        #[arg(long, default_value_t = false)]
        include_deleted: bool,
    },
    /// Show the audit trail, oldest first.
    Audit {
        /// Only the most recent N entries.
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("GAVEL_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    let store_path = expand_tilde(&cli.store);
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Init => commands::init::run(&store_path, json_output),
        Commands::Check { request } => commands::check::run(&store_path, &request, json_output),
        Commands::Submit { request } => commands::submit::run(&store_path, &request, json_output),
        Commands::Get {
            id,
            include_deleted,
        } => commands::get::run(&store_path, &id, include_deleted, json_output),
        Commands::List {
            kind,
            design,
            include_deleted,
        } => commands::list::run(
            &store_path,
            kind.as_deref(),
            design.as_deref(),
            include_deleted,
            json_output,
        ),
        Commands::Audit { limit } => commands::audit::run(&store_path, limit, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("request error:") {
                EXIT_REQUEST_ERROR
            } else if msg.starts_with("store error:") || msg.starts_with("store lock:") {
                EXIT_STORE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
