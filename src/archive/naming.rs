//! Archive naming convention
//!
//! Names look like `openclaw-aws-backup-2025-01-02T03-04-05`, with an
//! optional `-N` suffix when two backups land in the same second. The
//! timestamp is fixed width, so for names sharing a sequence number lexical
//! order equals chronological order. Ordering here is always done on the
//! parsed values, never on the raw string alone.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};

pub const ARCHIVE_PREFIX: &str = "openclaw-aws-backup";

/// Extension of plaintext and server-side encrypted archives
pub const PLAIN_EXT: &str = "tar.gz";

/// Extension of client-side encrypted archives
pub const ENCRYPTED_EXT: &str = "tar.gz.enc";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";
const TIMESTAMP_LEN: usize = 19;

/// A parsed archive name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    name: String,
    timestamp: DateTime<Utc>,
    sequence: u32,
}

impl ArchiveName {
    /// The name for a backup taken at `at`, truncated to whole seconds
    pub fn at(at: DateTime<Utc>) -> Self {
        let timestamp = at.with_nanosecond(0).unwrap_or(at);
        Self {
            name: format!("{}-{}", ARCHIVE_PREFIX, timestamp.format(TIMESTAMP_FORMAT)),
            timestamp,
            sequence: 0,
        }
    }

    /// The same instant with a disambiguating suffix
    pub fn with_sequence(&self, sequence: u32) -> Self {
        let base = Self::at(self.timestamp);
        if sequence == 0 {
            return base;
        }
        Self {
            name: format!("{}-{}", base.name, sequence),
            sequence,
            ..base
        }
    }

    /// Parse a name; anything not following the convention yields `None`
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(ARCHIVE_PREFIX)?.strip_prefix('-')?;
        if rest.len() < TIMESTAMP_LEN || !rest.is_char_boundary(TIMESTAMP_LEN) {
            return None;
        }
        let (stamp, suffix) = rest.split_at(TIMESTAMP_LEN);
        let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;

        let sequence = match suffix {
            "" => 0,
            s => {
                let digits = s.strip_prefix('-')?;
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                let n: u32 = digits.parse().ok()?;
                if n == 0 || digits.starts_with('0') {
                    return None;
                }
                n
            }
        };

        Some(Self {
            name: name.to_string(),
            timestamp: DateTime::from_naive_utc_and_offset(naive, Utc),
            sequence,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Remote key: `<prefix>/<name>.<ext>`
    pub fn object_key(&self, prefix: &str, encrypted: bool) -> String {
        let ext = if encrypted { ENCRYPTED_EXT } else { PLAIN_EXT };
        format!("{}/{}.{}", prefix.trim_end_matches('/'), self.name, ext)
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Ord for ArchiveName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.sequence.cmp(&other.sequence))
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for ArchiveName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Split a remote key into archive name and encryption flag
///
/// Keys outside `prefix`, in nested "directories", or not following the
/// naming convention are not archives.
pub fn parse_object_key(key: &str, prefix: &str) -> Option<(ArchiveName, bool)> {
    let file = key
        .strip_prefix(prefix.trim_end_matches('/'))?
        .strip_prefix('/')?;
    if file.contains('/') {
        return None;
    }

    let (stem, encrypted) = if let Some(stem) = file.strip_suffix(&format!(".{}", ENCRYPTED_EXT)) {
        (stem, true)
    } else {
        (file.strip_suffix(&format!(".{}", PLAIN_EXT))?, false)
    };

    ArchiveName::parse(stem).map(|name| (name, encrypted))
}
