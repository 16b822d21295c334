//! Backup display formatting
//!
//! Formats catalog records, chains and restore results for terminal output.

use chrono::Utc;

use crate::backup::{BackupManifest, RestoreSummary};
use crate::models::BackupRecord;

/// Format catalog records as a table, newest first
pub fn format_backup_list(records: &[BackupRecord]) -> String {
    if records.is_empty() {
        return "No backups found.".to_string();
    }

    let id_width = records
        .iter()
        .map(|r| r.backup_id.as_str().len())
        .max()
        .unwrap_or(9)
        .max(9);

    let mut output = String::new();
    output.push_str(&format!(
        "{:<id_width$}  {:<11}  {:>8}  {:<25}  {:>10}  {:>6}  {}\n",
        "Backup ID",
        "Type",
        "Timeline",
        "WAL Range",
        "Size",
        "Age",
        "Parent",
        id_width = id_width,
    ));
    output.push_str(&format!(
        "{:-<id_width$}  {:-<11}  {:->8}  {:-<25}  {:->10}  {:->6}  {:-<9}\n",
        "",
        "",
        "",
        "",
        "",
        "",
        "",
        id_width = id_width,
    ));

    for record in records {
        let age = Utc::now().signed_duration_since(record.created_at);
        output.push_str(&format!(
            "{:<id_width$}  {:<11}  {:>8}  {:<25}  {:>10}  {:>6}  {}\n",
            record.backup_id.as_str(),
            record.backup_type.to_string(),
            record.timeline_id.value(),
            record.wal_range.to_string(),
            format_size(record.total_size_bytes),
            format_duration(age),
            record
                .parent_backup_id
                .as_ref()
                .map(|p| p.as_str())
                .unwrap_or("-"),
            id_width = id_width,
        ));
    }

    let total: u64 = records.iter().map(|r| r.total_size_bytes).sum();
    output.push_str(&format!(
        "\nTotal: {} backup(s), {}\n",
        records.len(),
        format_size(total)
    ));
    output
}

/// Format one record with its manifest
pub fn format_backup_details(record: &BackupRecord, manifest: Option<&BackupManifest>) -> String {
    let mut output = String::new();

    output.push_str(&format!("Backup: {}\n", record.backup_id));
    output.push_str(&format!("{}\n", "=".repeat(8 + record.backup_id.as_str().len())));
    output.push_str(&format!("Type:      {}\n", record.backup_type));
    output.push_str(&format!("Timeline:  {}\n", record.timeline_id));
    if let Some(parent) = &record.parent_backup_id {
        output.push_str(&format!("Parent:    {}\n", parent));
    }
    output.push_str(&format!(
        "WAL range: {} ({} bytes)\n",
        record.wal_range,
        record.wal_range.len()
    ));
    output.push_str(&format!(
        "Created:   {}\n",
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!("Size:      {}\n", format_size(record.total_size_bytes)));
    if let Some(dir) = record.backup_dir() {
        output.push_str(&format!("Location:  {}\n", dir.display()));
    }

    match manifest {
        Some(manifest) => {
            output.push_str(&format!("\nWAL segments: {}\n", manifest.wal_segments.len()));
            for name in &manifest.wal_segments {
                output.push_str(&format!("  {}\n", name));
            }
            output.push_str(&format!("Content files: {}\n", manifest.content_files.len()));
            for path in manifest.content_files.iter().take(20) {
                output.push_str(&format!("  {}\n", path.display()));
            }
            if manifest.content_files.len() > 20 {
                output.push_str(&format!(
                    "  ... and {} more\n",
                    manifest.content_files.len() - 20
                ));
            }
            output.push_str(&format!("Artifacts: {} checksummed\n", manifest.checksums.len()));
        }
        None => output.push_str("\nManifest: missing\n"),
    }

    output
}

/// Format a restore chain, root first
pub fn format_chain(chain: &[BackupRecord]) -> String {
    let mut output = String::new();
    for (i, record) in chain.iter().enumerate() {
        let marker = if i == 0 { "*" } else { "+" };
        output.push_str(&format!(
            "{:indent$}{} {}  {}  {}\n",
            "",
            marker,
            record.backup_id,
            record.wal_range,
            format_size(record.total_size_bytes),
            indent = i * 2,
        ));
    }
    output
}

pub fn format_restore_summary(summary: &RestoreSummary) -> String {
    let chain = summary
        .chain
        .iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ");
    let phases = summary
        .phases
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(" -> ");

    format!(
        "Session:  {}\nTarget:   {}\nChain:    {}\nPhases:   {}\nDuration: {}\n",
        summary.session_id,
        summary.target,
        chain,
        phases,
        format_duration(summary.duration()),
    )
}

/// Format a duration in human-readable form
pub fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds();

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    format!("{}mo", days / 30)
}

/// Format a byte count in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
