//! pbench-tools CLI
//!
//! Single binary for tool-group orchestration:
//! - Actions (start, stop, postprocess, kill) applied to every tool of a group
//! - Registry management (register, unregister, label, list)
//! - Configuration inspection

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pb_core::config::{self, ToolsConfig};
use pb_core::types::Action;
use pbench_tools::commands;

#[derive(Parser)]
#[command(name = "pbench-tools")]
#[command(author, version, about = "Benchmark tool-group orchestration")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ActionArgs {
    /// Benchmark run directory that receives tool output
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Tool group (defaults to the configured default group)
    #[arg(short, long)]
    group: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every tool of a group as a detached session
    Start(ActionArgs),

    /// Stop every tool of a group
    Stop(ActionArgs),

    /// Postprocess tool data and collect it from all hosts
    Postprocess(ActionArgs),

    /// Kill every running tool session of a group
    Kill(ActionArgs),

    /// Register a tool in a group
    Register {
        /// Tool name (must match a script in the tools directory)
        tool: String,
        /// Tool group
        #[arg(short, long)]
        group: Option<String>,
        /// Run the tool on this remote host
        #[arg(long)]
        remote: Option<String>,
        /// Label for the remote host's results
        #[arg(long, requires = "remote")]
        label: Option<String>,
        /// Options passed to the tool (after `--`)
        #[arg(last = true)]
        options: Vec<String>,
    },

    /// Remove a tool, or a whole group, from the registry
    Unregister {
        /// Tool name
        #[arg(required_unless_present = "all")]
        tool: Option<String>,
        /// Tool group
        #[arg(short, long)]
        group: Option<String>,
        /// Only remove the registration for this remote host
        #[arg(long, conflicts_with = "all")]
        remote: Option<String>,
        /// Remove every tool and the group itself
        #[arg(long, conflicts_with = "tool")]
        all: bool,
    },

    /// Set the label of the local host's results
    Label {
        /// New label
        #[arg(required_unless_present = "clear")]
        label: Option<String>,
        /// Tool group
        #[arg(short, long)]
        group: Option<String>,
        /// Remove the label
        #[arg(long, conflicts_with = "label")]
        clear: bool,
    },

    /// List tool groups and their tools
    #[command(alias = "ls")]
    List {
        /// Only show this group
        #[arg(short, long)]
        group: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = load_tools_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Start(args) => run_action(config, Action::Start, args).await,
        Commands::Stop(args) => run_action(config, Action::Stop, args).await,
        Commands::Postprocess(args) => run_action(config, Action::Postprocess, args).await,
        Commands::Kill(args) => run_action(config, Action::Kill, args).await,

        Commands::Register {
            tool,
            group,
            remote,
            label,
            options,
        } => commands::register_command(
            &config,
            group.as_deref(),
            &tool,
            remote.as_deref(),
            label.as_deref(),
            options,
        ),

        Commands::Unregister {
            tool,
            group,
            remote,
            all,
        } => commands::unregister_command(
            &config,
            group.as_deref(),
            tool.as_deref(),
            remote.as_deref(),
            all,
        ),

        Commands::Label {
            label,
            group,
            clear,
        } => {
            let label = if clear { None } else { label.as_deref() };
            commands::label_command(&config, group.as_deref(), label)
        }

        Commands::List { group, json } => commands::list_command(&config, group.as_deref(), json),

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(&config, cli.config.as_ref()),
            ConfigAction::Path => commands::config_path(cli.config.as_ref()),
        },
    }
}

/// Run an orchestration action and exit with the number of failed sub-tasks
async fn run_action(config: ToolsConfig, action: Action, args: ActionArgs) -> Result<()> {
    let errors =
        commands::action_command(config, action, args.group.as_deref(), args.dir.as_deref())
            .await?;
    std::process::exit(commands::exit_code(errors));
}

/// Load configuration from `--config`, the default path, or built-in defaults
fn load_tools_config(config_path: Option<&PathBuf>) -> Result<ToolsConfig> {
    if let Some(path) = config_path {
        return config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        Ok(config::load_config(&default_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
            ToolsConfig::default()
        }))
    } else {
        tracing::debug!("Using default configuration");
        Ok(ToolsConfig::default())
    }
}
