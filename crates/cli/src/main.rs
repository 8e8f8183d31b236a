mod config_commands;
mod plugins_commands;
mod project;
mod run_commands;
mod term;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
    trellis_common::Command,
};

use crate::project::Project;

#[derive(Parser)]
#[command(name = "trellis", about = "trellis: plugin-driven build runner", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Application root. Generated files go under `node_modules/.trellis`.
    #[arg(long, global = true, env = "TRELLIS_APP_DIR", default_value = ".")]
    app_dir: PathBuf,

    /// Config file to use instead of searching the app and user config dirs.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build once, then rebuild on every source change until interrupted.
    Dev,
    /// Produce a production build.
    Build,
    /// Print the resolved plugin order and the hooks each plugin taps.
    Plugins {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "trellis starting");

    match cli.command {
        Commands::Dev => {
            let project = Project::load(&cli.app_dir, cli.config.as_deref())?;
            run_commands::handle_run(project, Command::Dev).await
        },
        Commands::Build => {
            let project = Project::load(&cli.app_dir, cli.config.as_deref())?;
            run_commands::handle_run(project, Command::Build).await
        },
        Commands::Plugins { json } => {
            let project = Project::load(&cli.app_dir, cli.config.as_deref())?;
            plugins_commands::handle_plugins(&project, json)
        },
        Commands::Config { action } => {
            config_commands::handle_config(action, &cli.app_dir, cli.config.as_deref())
        },
    }
}
