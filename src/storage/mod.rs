//! Local storage helpers
//!
//! Atomic JSON records and directory tree operations on the local
//! filesystem. Remote blobs live in [`crate::store`].

pub mod file_io;
pub mod tree;

pub use file_io::{read_json_required, write_json_atomic};
pub use tree::{copy_tree, remove_tree, safe_delete};
