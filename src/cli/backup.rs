//! Backup CLI commands
//!
//! Implements the create, list, restore, prune, show and test commands.
//! Commands that change remote or live state run under the single-instance
//! lock.

use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};

use chrono::Utc;
use clap::Subcommand;
use fd_lock::RwLock;

use crate::backup::scratch::ScratchSpace;
use crate::backup::{
    retention::excess_entries, BackupManager, MetadataStore, RemoteArchiveEntry, RestoreManager,
};
use crate::config::{BackupConfig, BackupPaths};
use crate::crypto::LocalKeyResolver;
use crate::display::{
    format_archive_list, format_metadata_details, format_prune_report, format_restore_result,
    format_selftest_report, format_size,
};
use crate::error::{BackupError, BackupResult};
use crate::selftest::SelfTest;
use crate::store::{open_store, ObjectStore};

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a backup and upload it
    Create,

    /// List remote backups
    List,

    /// Restore a backup over the live data
    Restore {
        /// Backup name (use 'latest' for most recent); omit to choose from a list
        backup: Option<String>,

        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Delete backups beyond the retention window
    Prune {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Show the local record of a backup
    Show {
        /// Backup name
        backup: String,
    },

    /// Check configuration, storage access and encryption keys
    Test,
}

/// Handle a backup command
pub fn handle_backup_command(
    paths: &BackupPaths,
    config: &BackupConfig,
    cmd: BackupCommands,
) -> BackupResult<()> {
    match cmd {
        BackupCommands::Create => {
            let store = open_store(config)?;
            with_lock(paths, || create(paths, config, store.as_ref()))
        }
        BackupCommands::List => {
            let store = open_store(config)?;
            list(paths, config, store.as_ref())
        }
        BackupCommands::Restore { backup, force } => {
            let store = open_store(config)?;
            with_lock(paths, || restore(paths, config, store.as_ref(), backup, force))
        }
        BackupCommands::Prune { force } => {
            let store = open_store(config)?;
            with_lock(paths, || prune(paths, config, store.as_ref(), force))
        }
        BackupCommands::Show { backup } => {
            let meta = MetadataStore::new(paths.metadata_dir()).load(&backup)?;
            print!("{}", format_metadata_details(&meta));
            Ok(())
        }
        BackupCommands::Test => {
            let store = open_store(config)?;
            let report = SelfTest::new(config, store.as_ref(), &LocalKeyResolver).run();
            println!("Backup Self-Test");
            println!("================");
            print!("{}", format_selftest_report(&report));
            println!();
            if report.all_passed() {
                println!("All checks passed.");
                Ok(())
            } else {
                let failed: Vec<&str> = report.failed().map(|c| c.name).collect();
                Err(BackupError::Validation(format!(
                    "self-test failed: {}",
                    failed.join(", ")
                )))
            }
        }
    }
}

/// Run `f` while holding the single-instance lock
fn with_lock<T>(paths: &BackupPaths, f: impl FnOnce() -> BackupResult<T>) -> BackupResult<T> {
    paths.ensure_directories()?;
    let lock_path = paths.lock_file();
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| BackupError::Io(format!("Failed to open {}: {}", lock_path.display(), e)))?;

    let mut locker = RwLock::new(lock_file);
    let _guard = locker
        .try_write()
        .map_err(|_| BackupError::Locked(lock_path.display().to_string()))?;

    ScratchSpace::new(paths.scratch_dir()).sweep_orphans();
    f()
}

fn create(paths: &BackupPaths, config: &BackupConfig, store: &dyn ObjectStore) -> BackupResult<()> {
    println!("Creating backup...");
    let outcome = BackupManager::new(config, paths, store, &LocalKeyResolver).create_backup()?;

    println!("Backup created: {}", outcome.name);
    println!("Location: {}", outcome.remote_location);
    println!("Size: {}", format_size(outcome.size_bytes));
    if let Some(report) = &outcome.pruned {
        if report.deleted_count() > 0 {
            print!("{}", format_prune_report(report));
        }
    }
    for warning in &outcome.warnings {
        println!("Warning: {}", warning);
    }
    Ok(())
}

fn list(paths: &BackupPaths, config: &BackupConfig, store: &dyn ObjectStore) -> BackupResult<()> {
    let entries = BackupManager::new(config, paths, store, &LocalKeyResolver).list_backups()?;
    if entries.is_empty() {
        println!("No backups found in {}", config.s3.location());
        println!("Create one with: openclaw-backup create");
        return Ok(());
    }

    println!("Backups in {}", config.s3.location());
    println!();
    print!("{}", format_archive_list(&entries, Utc::now()));
    Ok(())
}

fn restore(
    paths: &BackupPaths,
    config: &BackupConfig,
    store: &dyn ObjectStore,
    backup: Option<String>,
    force: bool,
) -> BackupResult<()> {
    let manager = RestoreManager::new(config, paths, store, &LocalKeyResolver);
    let entries = manager.list_backups()?;

    let entry = match backup {
        Some(selector) => crate::backup::catalog::select(&entries, &selector)?.clone(),
        None => {
            print!("{}", format_archive_list(&entries, Utc::now()));
            println!();
            let stdin = io::stdin();
            choose_entry(&entries, &mut stdin.lock())?
        }
    };

    println!("Backup Information");
    println!("==================");
    println!("Name: {}", entry.name);
    println!("Created: {}", entry.name.timestamp().format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Size: {}", format_size(entry.size_bytes));
    println!("Location: {}", store.location(&entry.storage_key));
    println!();

    if !force {
        if manager.would_overwrite()? {
            let live = config.live_data()?;
            println!("WARNING: This will overwrite the current OpenClaw data in:");
            println!("  {}", live.config_dir.display());
            if !live.workspace_nested() {
                println!("  {}", live.workspace_dir.display());
            }
        }
        println!("To proceed, run again with --force flag:");
        println!("  openclaw-backup restore {} --force", entry.name);
        return Ok(());
    }

    println!("Restoring from backup...");
    let result = manager.restore_backup(&entry.storage_key)?;
    println!("Restore complete!");
    print!("{}", format_restore_result(&result));
    Ok(())
}

/// Read a 1-based choice for `entries` from `input`
fn choose_entry(entries: &[RemoteArchiveEntry], input: &mut dyn BufRead) -> BackupResult<RemoteArchiveEntry> {
    print!("Select a backup [1-{}]: ", entries.len());
    io::stdout().flush().ok();

    let mut line = String::new();
    input
        .read_line(&mut line)
        .map_err(|e| BackupError::Io(format!("Failed to read selection: {}", e)))?;
    parse_choice(line.trim(), entries).cloned()
}

fn parse_choice<'a>(input: &str, entries: &'a [RemoteArchiveEntry]) -> BackupResult<&'a RemoteArchiveEntry> {
    let index: usize = input
        .parse()
        .map_err(|_| BackupError::Validation(format!("Invalid selection: '{}'", input)))?;
    if index == 0 || index > entries.len() {
        return Err(BackupError::Validation(format!(
            "Selection out of range: {} (1-{})",
            index,
            entries.len()
        )));
    }
    Ok(&entries[index - 1])
}

fn prune(
    paths: &BackupPaths,
    config: &BackupConfig,
    store: &dyn ObjectStore,
    force: bool,
) -> BackupResult<()> {
    let manager = BackupManager::new(config, paths, store, &LocalKeyResolver);
    let keep = config.retention.keep;
    let entries = manager.list_backups()?;
    let excess = excess_entries(&entries, keep);

    if excess.is_empty() {
        println!("No backups to prune.");
        println!("Retention policy: keep {}", keep);
        println!("You have {} backup(s).", entries.len());
        return Ok(());
    }

    println!("Prune Summary");
    println!("=============");
    println!("Retention policy: keep {}", keep);
    println!("Current backups: {}", entries.len());
    println!("To delete: {}", excess.len());
    for entry in &excess {
        println!("  - {}", entry.name);
    }
    println!();

    if !force {
        println!("To proceed, run again with --force flag:");
        println!("  openclaw-backup prune --force");
        return Ok(());
    }

    let report = manager.prune_old_backups()?;
    print!("{}", format_prune_report(&report));
    if report.is_clean() {
        Ok(())
    } else {
        Err(BackupError::Delete(format!(
            "{} backup(s) could not be deleted",
            report.errors.len()
        )))
    }
}
