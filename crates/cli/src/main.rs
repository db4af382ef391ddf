mod app;
mod commands;
mod config;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::app::App;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Foursight check-and-action runner.
#[derive(Parser)]
#[command(name = "foursight", version, about = "Foursight check-and-action runner")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Path to a foursight.toml config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding one subdirectory per bucket (overrides [storage] root)
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Environment to serve (overrides [foursight] env)
    #[arg(long, global = true)]
    env: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered checks and actions
    List,

    /// Show the latest stored result of a check or action
    Latest {
        /// Check or action name
        name: String,
        /// Show the latest primary result instead
        #[arg(long)]
        primary: bool,
    },

    /// Show stored results of a check or action, newest first
    History {
        /// Check or action name
        name: String,
        /// Maximum number of results to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Run a check now, along with any action it queues
    Run {
        /// Check name
        check: String,
        /// Parameters as a JSON object, e.g. '{"primary": true}'
        #[arg(long)]
        kwargs: Option<String>,
    },

    /// Run a worker pool that schedules and executes checks
    Worker {
        /// Number of workers (overrides [worker] workers)
        #[arg(long)]
        workers: Option<usize>,
        /// Submit the scheduled checks once, drain the queues, and exit
        #[arg(long)]
        once: bool,
    },

    /// List environments with a manifest in the envs bucket
    Envs,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("foursight=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub(crate) fn report_error(msg: &str, output: OutputFormat) {
    match output {
        OutputFormat::Text => eprintln!("error: {}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

async fn dispatch(cli: Cli) -> Result<(), String> {
    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(root) = cli.store_dir {
        config.storage.root = root;
    }
    if let Some(env) = cli.env {
        config.foursight.env = env;
    }
    let app = App::new(config)?;
    let output = cli.output;

    match cli.command {
        Commands::List => commands::list::cmd_list(&app, output),
        Commands::Latest { name, primary } => {
            commands::results::cmd_latest(&app, &name, primary, output).await
        }
        Commands::History { name, limit } => {
            commands::results::cmd_history(&app, &name, limit, output).await
        }
        Commands::Run { check, kwargs } => {
            commands::run::cmd_run(&app, &check, kwargs.as_deref(), output).await
        }
        Commands::Worker { workers, once } => {
            commands::run::cmd_worker(&app, workers, once, output).await
        }
        Commands::Envs => commands::envs::cmd_envs(&app, output).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let output = cli.output;
    if let Err(e) = dispatch(cli).await {
        report_error(&e, output);
        process::exit(1);
    }
}
