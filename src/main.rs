use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use keel::commands;
use keel::config::{
    self, BaselineArgs, BehaviorInput, Config, ConfigInput, DatabaseArgs, LocationArgs,
    MigrateArgs, PlaceholdersInput, ValidateArgs, placeholder_args,
};
use keel::constants::CONFIG_FILENAME;
use keel::output::OutputFormat;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(long, default_value = CONFIG_FILENAME, global = true)]
    config_file: String,

    /// Enable verbose output (info level)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress all non-essential output (error level only)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Enable debug output (debug level)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Connection and location options shared by every command
#[derive(Args, Debug, Clone)]
struct TargetArgs {
    #[command(flatten)]
    database_args: DatabaseArgs,

    #[command(flatten)]
    location_args: LocationArgs,

    /// Output format
    #[arg(long, value_enum, default_value = "human")]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations
    Migrate {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        migrate_args: MigrateArgs,
    },

    /// Check applied migrations against the local ones (for CI)
    Validate {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        validate_args: ValidateArgs,
    },

    /// Show the state of every migration
    Info {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Remove failed entries and realign checksums in the schema history
    Repair {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Mark an existing schema as migrated up to a version
    Baseline {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        baseline_args: BaselineArgs,
    },

    /// Drop all objects in the managed schemas
    Clean {
        #[command(flatten)]
        target: TargetArgs,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    initialize_logging(&cli);
    tokio::select! {
        result = run_main(cli) => result,
        _ = wait_for_shutdown_signal() => {
            info!("Received shutdown signal, stopping");
            Ok(())
        }
    }
}

async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn initialize_logging(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level)
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// File config overlaid with whatever the command line set.
fn resolve_config(
    file_config: ConfigInput,
    target: &TargetArgs,
    behavior: Option<BehaviorInput>,
    placeholders: Option<PlaceholdersInput>,
) -> Result<Config> {
    let mut cli_config = ConfigInput {
        database: Some(target.database_args.clone().into()),
        behavior,
        placeholders,
        ..Default::default()
    };
    target.location_args.clone().apply_to(&mut cli_config);

    config::ConfigBuilder::new()
        .with_file(file_config)
        .with_cli_args(cli_config)
        .resolve()
}

async fn run_main(cli: Cli) -> Result<()> {
    let (file_config, root_dir): (ConfigInput, PathBuf) = config::load_config(&cli.config_file)?;

    match &cli.command {
        Commands::Migrate {
            target,
            migrate_args,
        } => {
            let placeholders = placeholder_args(&migrate_args.placeholders)?;
            let config = resolve_config(
                file_config,
                target,
                Some(migrate_args.clone().into()),
                placeholders,
            )?;
            commands::cmd_migrate(&config, &root_dir, target.format, cli.verbose).await
        }
        Commands::Validate {
            target,
            validate_args,
        } => {
            let config = resolve_config(
                file_config,
                target,
                Some(validate_args.clone().into()),
                None,
            )?;
            commands::cmd_validate(&config, &root_dir, target.format).await
        }
        Commands::Info { target } => {
            let config = resolve_config(file_config, target, None, None)?;
            commands::cmd_info(&config, &root_dir, target.format).await
        }
        Commands::Repair { target } => {
            let config = resolve_config(file_config, target, None, None)?;
            commands::cmd_repair(&config, &root_dir, target.format).await
        }
        Commands::Baseline {
            target,
            baseline_args,
        } => {
            let config = resolve_config(
                file_config,
                target,
                Some(baseline_args.clone().into()),
                None,
            )?;
            commands::cmd_baseline(&config, &root_dir, target.format).await
        }
        Commands::Clean { target, force } => {
            let config = resolve_config(file_config, target, None, None)?;
            commands::cmd_clean(&config, &root_dir, *force, target.format).await
        }
    }
}
