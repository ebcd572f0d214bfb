//! openclaw-backup - Backup and restore of OpenClaw data to object storage
//!
//! This library packs the OpenClaw configuration tree and agent workspace
//! into a compressed archive, optionally encrypts it, uploads it under a
//! per-instance prefix and prunes old archives. Restores replace the live
//! data atomically and roll back on failure.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration record, state paths and host identity
//! - `error`: Custom error types
//! - `storage`: Local file and directory-tree helpers
//! - `archive`: Archive naming and the tar+gzip codec
//! - `crypto`: Encryption filter, key derivation and key resolution
//! - `store`: Object store contract with S3 and local backends
//! - `backup`: Backup, restore and retention orchestration
//! - `selftest`: Pre-flight checks
//! - `cli` / `display`: Command handlers and terminal formatting
//!
//! # Example
//!
//! ```rust,ignore
//! use openclaw_backup::backup::BackupManager;
//! use openclaw_backup::config::{BackupConfig, BackupPaths};
//! use openclaw_backup::crypto::LocalKeyResolver;
//! use openclaw_backup::store::open_store;
//!
//! let paths = BackupPaths::new()?;
//! let config = BackupConfig::load(&paths)?;
//! let store = open_store(&config)?;
//! let outcome = BackupManager::new(&config, &paths, store.as_ref(), &LocalKeyResolver)
//!     .create_backup()?;
//! ```

pub mod archive;
pub mod backup;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod display;
pub mod error;
pub mod selftest;
pub mod storage;
pub mod store;

pub use error::{BackupError, BackupResult};
