//! Backup and restore lifecycle
//!
//! # Architecture
//!
//! - `BackupManager`: snapshot → package → encrypt → upload → cleanup →
//!   retention → metadata record
//! - `RestoreManager`: download → decrypt → extract → validate → atomic
//!   replace → cleanup, with rollback of the configuration tree
//! - `RetentionPruner`: deletes archives beyond the retention window
//!
//! Both orchestrators take the configuration, the state paths, an object
//! store and a key resolver by reference at construction. They never prompt;
//! selection and confirmation belong to the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use openclaw_backup::backup::{BackupManager, RestoreManager};
//! use openclaw_backup::config::{BackupConfig, BackupPaths};
//! use openclaw_backup::crypto::LocalKeyResolver;
//! use openclaw_backup::store::open_store;
//!
//! let paths = BackupPaths::new()?;
//! let config = BackupConfig::load(&paths)?;
//! let store = open_store(&config)?;
//!
//! let outcome = BackupManager::new(&config, &paths, store.as_ref(), &LocalKeyResolver)
//!     .create_backup()?;
//!
//! let restore = RestoreManager::new(&config, &paths, store.as_ref(), &LocalKeyResolver);
//! let entry = restore.select("latest")?;
//! println!("{}", restore.restore_backup(&entry.storage_key)?.summary());
//! ```

pub mod catalog;
mod manager;
pub mod metadata;
mod restore;
pub mod retention;
pub mod scratch;
pub mod swap;

pub use catalog::{list_archives, RemoteArchiveEntry, LATEST};
pub use manager::{BackupManager, BackupOutcome};
pub use metadata::{BackupMetadata, MetadataStore};
pub use restore::{would_overwrite, RestoreManager, RestoreResult};
pub use retention::{PruneReport, RetentionPruner};
