//! Configuration module for openclaw-backup
//!
//! This module provides configuration management including:
//! - State directory resolution
//! - The persisted backup configuration record
//! - Host identity fallback chains

pub mod host;
pub mod paths;
pub mod settings;

pub use paths::BackupPaths;
pub use settings::{BackupConfig, EncryptionMethod, LiveDataRoot, StoreBackend};
