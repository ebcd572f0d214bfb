//! Archive codec and naming
//!
//! An archive is a gzip-compressed tar file with up to two top-level
//! entries: `openclaw-config/` and `workspace/`.

pub mod codec;
pub mod naming;

pub use codec::{pack, unpack};
pub use naming::{parse_object_key, ArchiveName, ARCHIVE_PREFIX, ENCRYPTED_EXT, PLAIN_EXT};

/// Top-level archive entry holding the configuration tree
pub const CONFIG_ENTRY: &str = "openclaw-config";

/// Top-level archive entry holding the workspace tree
pub const WORKSPACE_ENTRY: &str = "workspace";
