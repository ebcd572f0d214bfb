//! Archive display formatting
//!
//! Formats remote archives, metadata records and check reports for terminal
//! output in table and detail views.

use chrono::{DateTime, Utc};

use crate::backup::{BackupMetadata, PruneReport, RemoteArchiveEntry, RestoreResult};
use crate::selftest::SelfTestReport;

/// Format a byte count for humans
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

/// Format an elapsed time like "3d 4h" or "12m"
pub fn format_age(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(since);
    if age.num_days() > 0 {
        format!("{}d {}h", age.num_days(), age.num_hours() % 24)
    } else if age.num_hours() > 0 {
        format!("{}h {}m", age.num_hours(), age.num_minutes() % 60)
    } else {
        format!("{}m", age.num_minutes().max(0))
    }
}

/// Format remote archives as a numbered table
pub fn format_archive_list(entries: &[RemoteArchiveEntry], now: DateTime<Utc>) -> String {
    if entries.is_empty() {
        return "No backups found.".to_string();
    }

    let name_width = entries
        .iter()
        .map(|e| e.name.as_str().len())
        .max()
        .unwrap_or(4)
        .max(4);
    let index_width = entries.len().to_string().len();

    let mut output = String::new();
    output.push_str(&format!(
        "{:>index_width$}  {:<name_width$}  {:>10}  {:<20}  {:>8}  {}\n",
        "#",
        "Name",
        "Size",
        "Uploaded",
        "Age",
        "Encrypted",
        index_width = index_width,
        name_width = name_width,
    ));
    output.push_str(&format!(
        "{:->index_width$}  {:-<name_width$}  {:->10}  {:-<20}  {:->8}  {:-<9}\n",
        "",
        "",
        "",
        "",
        "",
        "",
        index_width = index_width,
        name_width = name_width,
    ));

    for (i, entry) in entries.iter().enumerate() {
        output.push_str(&format!(
            "{:>index_width$}  {:<name_width$}  {:>10}  {:<20}  {:>8}  {}\n",
            i + 1,
            entry.name.as_str(),
            format_size(entry.size_bytes),
            entry.last_modified.format("%Y-%m-%d %H:%M:%S"),
            format_age(entry.last_modified, now),
            if entry.encrypted { "client-key" } else { "" },
            index_width = index_width,
            name_width = name_width,
        ));
    }

    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    output.push_str(&format!(
        "\nTotal: {} backup(s), {}\n",
        entries.len(),
        format_size(total)
    ));
    output
}

/// Format a metadata record as a detail view
pub fn format_metadata_details(meta: &BackupMetadata) -> String {
    let mut output = String::new();
    output.push_str(&format!("Backup: {}\n", meta.name));
    output.push_str(&format!("{}\n", "=".repeat(meta.name.len() + 8)));
    output.push_str(&format!(
        "Created:    {}\n",
        meta.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!("Instance:   {}\n", meta.instance_id));
    output.push_str(&format!("Region:     {}\n", meta.region));
    output.push_str(&format!("Size:       {}\n", format_size(meta.size_bytes)));
    output.push_str(&format!("Location:   {}\n", meta.remote_location));
    output.push_str(&format!(
        "Encryption: {}\n",
        if meta.encrypted {
            meta.encryption_method.to_string()
        } else {
            "none".to_string()
        }
    ));
    if let Some(alias) = &meta.kms_key_alias {
        output.push_str(&format!("Key alias:  {}\n", alias));
    }
    output
}

/// Format a pruning outcome
pub fn format_prune_report(report: &PruneReport) -> String {
    let mut output = format!("Deleted {} backup(s)\n", report.deleted_count());
    for name in &report.deleted {
        output.push_str(&format!("  - {}\n", name));
    }
    if !report.errors.is_empty() {
        output.push_str(&format!("{} deletion(s) failed:\n", report.errors.len()));
        for error in &report.errors {
            output.push_str(&format!("  ! {}\n", error));
        }
    }
    output
}

/// Format a restore outcome
pub fn format_restore_result(result: &RestoreResult) -> String {
    let mut output = format!("{}\n", result.summary());
    if result.decrypted {
        output.push_str("  Decrypted with client key\n");
    }
    if result.preserved_primary_config {
        output.push_str("  Kept the existing openclaw.json\n");
    }
    if let Some(copy) = &result.pre_restore_copy {
        output.push_str(&format!("  Previous configuration saved to {}\n", copy.display()));
    }
    for warning in &result.warnings {
        output.push_str(&format!("  Warning: {}\n", warning));
    }
    output
}

/// Format a self-test report as a checklist
pub fn format_selftest_report(report: &SelfTestReport) -> String {
    let width = report
        .checks
        .iter()
        .map(|c| c.name.len())
        .max()
        .unwrap_or(0);

    let mut output = String::new();
    for check in &report.checks {
        output.push_str(&format!(
            "[{}] {:<width$}  {}\n",
            if check.passed { "PASS" } else { "FAIL" },
            check.name,
            check.message,
            width = width,
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveName;
    use crate::config::EncryptionMethod;
    use crate::selftest::CheckResult;
    use chrono::{Duration, TimeZone};

    fn entry(name: &str, size: u64, encrypted: bool) -> RemoteArchiveEntry {
        RemoteArchiveEntry {
            name: ArchiveName::parse(name).unwrap(),
            storage_key: format!("pfx/{}.tar.gz", name),
            last_modified: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            size_bytes: size,
            encrypted,
        }
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_age() {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_age(base, base + Duration::minutes(12)), "12m");
        assert_eq!(format_age(base, base + Duration::minutes(125)), "2h 5m");
        assert_eq!(format_age(base, base + Duration::hours(76)), "3d 4h");
    }

    #[test]
    fn test_format_archive_list() {
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let entries = vec![
            entry("openclaw-aws-backup-2025-01-01T00-00-00", 2048, true),
            entry("openclaw-aws-backup-2024-12-31T00-00-00", 1024, false),
        ];
        let table = format_archive_list(&entries, now);
        assert!(table.contains("openclaw-aws-backup-2025-01-01T00-00-00"));
        assert!(table.contains("client-key"));
        assert!(table.contains("Total: 2 backup(s), 3.0 KB"));
        assert_eq!(format_archive_list(&[], now), "No backups found.");
    }

    #[test]
    fn test_format_metadata_details() {
        let meta = BackupMetadata {
            name: "openclaw-aws-backup-2025-01-01T00-00-00".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            instance_id: "i-1".into(),
            region: "eu-west-1".into(),
            size_bytes: 10,
            remote_location: "s3://b/p/x.tar.gz".into(),
            encrypted: true,
            encryption_method: EncryptionMethod::ManagedKey,
            kms_key_alias: Some("alias/k".into()),
        };
        let details = format_metadata_details(&meta);
        assert!(details.contains("Encryption: managed-key"));
        assert!(details.contains("Key alias:  alias/k"));
    }

    #[test]
    fn test_format_selftest_report() {
        let report = SelfTestReport {
            checks: vec![
                CheckResult {
                    name: "configuration",
                    passed: true,
                    message: "ok".into(),
                },
                CheckResult {
                    name: "list access",
                    passed: false,
                    message: "denied".into(),
                },
            ],
        };
        let text = format_selftest_report(&report);
        assert!(text.contains("[PASS] configuration"));
        assert!(text.contains("[FAIL] list access"));
    }
}
