//! Display formatting for terminal output
//!
//! Provides utilities for formatting archives, metadata records and reports
//! as plain-text tables and detail views.

pub mod archive;

pub use archive::{
    format_age, format_archive_list, format_metadata_details, format_prune_report,
    format_restore_result, format_selftest_report, format_size,
};
