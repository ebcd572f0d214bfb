use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use openclaw_backup::cli::{
    handle_backup_command, handle_config_command, BackupCommands, ConfigCommands,
};
use openclaw_backup::config::host::{resolve_host_identity, Ec2Metadata};
use openclaw_backup::config::{BackupConfig, BackupPaths};

#[derive(Parser)]
#[command(
    name = "openclaw-backup",
    author = "Kaylee Beyene",
    version,
    about = "Backup and restore OpenClaw data to S3",
    long_about = "openclaw-backup archives the OpenClaw configuration and agent \
                  workspace, uploads it to S3 (optionally encrypted) and keeps a \
                  rolling window of backups. Restores replace live data atomically."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Backup(BackupCommands),

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let paths = BackupPaths::new()?;

    match cli.command {
        Commands::Config(cmd) => {
            handle_config_command(&paths, cmd)?;
        }
        Commands::Backup(cmd) => {
            let mut config = BackupConfig::load(&paths)?;
            resolve_host_identity(&mut config, &Ec2Metadata::new());
            handle_backup_command(&paths, &config, cmd)?;
        }
    }

    Ok(())
}
