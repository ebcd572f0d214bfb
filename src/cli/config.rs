//! Configuration CLI commands
//!
//! `config init` writes the configuration record from flags; `config show`
//! prints the effective configuration and state paths.

use std::path::PathBuf;

use clap::Subcommand;

use crate::config::host::{resolve_instance_id, resolve_region, Ec2Metadata, HostMetadata};
use crate::config::{BackupConfig, BackupPaths, EncryptionMethod, StoreBackend};
use crate::error::{BackupError, BackupResult};

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a new configuration record
    Init {
        /// Bucket name (not needed with --local-path)
        #[arg(short, long)]
        bucket: Option<String>,

        /// Key prefix (default: openclaw-aws-backups/instance-<id>)
        #[arg(short, long)]
        prefix: Option<String>,

        /// Instance id (default: from instance metadata)
        #[arg(long)]
        instance_id: Option<String>,

        /// Region (default: environment, then instance metadata)
        #[arg(long)]
        region: Option<String>,

        /// Encryption method: none, managed-key or client-key
        #[arg(short, long, default_value = "none", value_parser = parse_encryption_method)]
        encryption: EncryptionMethod,

        /// Key alias for managed-key encryption
        #[arg(long)]
        kms_key_alias: Option<String>,

        /// Passphrase source for client-key encryption (env:VAR, file:/path, prompt)
        #[arg(long)]
        key_ref: Option<String>,

        /// Number of backups to keep
        #[arg(short, long, default_value_t = 30)]
        keep: u32,

        /// Do not prune after each backup
        #[arg(long)]
        no_auto_clean: bool,

        /// Use a local directory instead of S3
        #[arg(long)]
        local_path: Option<PathBuf>,

        /// Custom S3-compatible endpoint
        #[arg(long)]
        endpoint: Option<String>,

        /// OpenClaw data directory (default: ~/.openclaw)
        #[arg(long)]
        data_root: Option<PathBuf>,

        /// Workspace directory (default: <data-root>/workspace)
        #[arg(long)]
        workspace_dir: Option<PathBuf>,

        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show the current configuration
    Show,
}

fn parse_encryption_method(value: &str) -> Result<EncryptionMethod, String> {
    match value.to_lowercase().as_str() {
        "none" => Ok(EncryptionMethod::None),
        "managed-key" | "kms" => Ok(EncryptionMethod::ManagedKey),
        "client-key" => Ok(EncryptionMethod::ClientKey),
        other => Err(format!(
            "unknown encryption method '{}' (expected none, managed-key or client-key)",
            other
        )),
    }
}

/// Handle a config command
pub fn handle_config_command(paths: &BackupPaths, cmd: ConfigCommands) -> BackupResult<()> {
    match cmd {
        ConfigCommands::Init {
            bucket,
            prefix,
            instance_id,
            region,
            encryption,
            kms_key_alias,
            key_ref,
            keep,
            no_auto_clean,
            local_path,
            endpoint,
            data_root,
            workspace_dir,
            force,
        } => {
            if paths.config_file().exists() && !force {
                println!(
                    "A configuration already exists at {}",
                    paths.config_file().display()
                );
                println!("To replace it, run again with --force flag.");
                return Ok(());
            }

            let host = Ec2Metadata::new();
            let mut config = build_config(
                InitOptions {
                    bucket,
                    prefix,
                    instance_id,
                    region,
                    encryption,
                    kms_key_alias,
                    key_ref,
                    keep,
                    auto_clean: !no_auto_clean,
                    local_path,
                    endpoint,
                    data_root,
                    workspace_dir,
                },
                &host,
            )?;
            for warning in config.normalize_and_validate()? {
                println!("Warning: {}", warning);
            }
            config.save(paths)?;

            println!("Configuration written to {}", paths.config_file().display());
            println!();
            print_config(paths, &config)?;
            println!();
            println!("Run 'openclaw-backup test' to check access.");
            Ok(())
        }
        ConfigCommands::Show => {
            let config = BackupConfig::load(paths)?;
            print_config(paths, &config)
        }
    }
}

/// Flag values collected by `config init`
struct InitOptions {
    bucket: Option<String>,
    prefix: Option<String>,
    instance_id: Option<String>,
    region: Option<String>,
    encryption: EncryptionMethod,
    kms_key_alias: Option<String>,
    key_ref: Option<String>,
    keep: u32,
    auto_clean: bool,
    local_path: Option<PathBuf>,
    endpoint: Option<String>,
    data_root: Option<PathBuf>,
    workspace_dir: Option<PathBuf>,
}

fn build_config(opts: InitOptions, host: &dyn HostMetadata) -> BackupResult<BackupConfig> {
    let instance_id = resolve_instance_id(opts.instance_id.as_deref().unwrap_or(""), host);
    let region = resolve_region(
        opts.region.as_deref().unwrap_or(""),
        |k| std::env::var(k).ok(),
        host,
    );

    let bucket = match (&opts.bucket, &opts.local_path) {
        (Some(bucket), _) => bucket.clone(),
        (None, Some(_)) => String::new(),
        (None, None) => {
            return Err(BackupError::Validation(
                "either --bucket or --local-path is required".into(),
            ))
        }
    };

    let mut config = BackupConfig::new(bucket, instance_id.clone());
    config.region = region;
    if let Some(prefix) = opts.prefix {
        config.s3.prefix = prefix;
    }
    if let Some(local_path) = opts.local_path {
        config.s3.backend = StoreBackend::Local;
        config.s3.local_path = Some(local_path);
    }
    config.s3.endpoint = opts.endpoint;
    config.data_root = opts.data_root;
    config.workspace_dir = opts.workspace_dir;
    config.retention.keep = opts.keep;
    config.retention.auto_clean = opts.auto_clean;

    config.encryption.enabled = opts.encryption != EncryptionMethod::None;
    config.encryption.method = Some(opts.encryption);
    match opts.encryption {
        EncryptionMethod::ManagedKey => {
            config.encryption.kms_key_alias = Some(
                opts.kms_key_alias
                    .unwrap_or_else(|| format!("alias/openclaw-aws-backup-{}", instance_id)),
            );
        }
        EncryptionMethod::ClientKey => config.encryption.key_ref = opts.key_ref,
        EncryptionMethod::None => {}
    }

    Ok(config)
}

fn print_config(paths: &BackupPaths, config: &BackupConfig) -> BackupResult<()> {
    let live = config.live_data()?;

    println!("openclaw-backup Configuration");
    println!("=============================");
    println!("State directory:  {}", paths.base_dir().display());
    println!("Config file:      {}", paths.config_file().display());
    println!();
    println!("Instance:         {}", config.instance_id);
    println!("Region:           {}", config.region);
    println!("Destination:      {}", config.s3.location());
    if let Some(endpoint) = &config.s3.endpoint {
        println!("Endpoint:         {}", endpoint);
    }
    println!("Data root:        {}", live.config_dir.display());
    println!("Workspace:        {}", live.workspace_dir.display());
    println!();
    println!("Encryption:       {}", config.encryption_policy().method());
    if let Some(alias) = &config.encryption.kms_key_alias {
        println!("  Key alias:      {}", alias);
    }
    if let Some(key_ref) = &config.encryption.key_ref {
        println!("  Key source:     {}", key_ref);
    }
    println!(
        "Retention:        keep {}{}",
        config.retention.keep,
        if config.retention.auto_clean {
            ", prune after each backup"
        } else {
            ""
        }
    );
    println!(
        "Pre-restore copy: {}",
        if config.restore.keep_pre_restore_copy {
            "yes"
        } else {
            "no"
        }
    );
    Ok(())
}
