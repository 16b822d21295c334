//! WAL segment naming and selection
//!
//! Segment files are named `TTTTTTTTXXXXXXXXYYYYYYYY`: timeline, then the
//! segment number split into a "log id" and the segment within it, each as
//! eight upper-case hex digits.

use std::fs;
use std::path::Path;

use crate::error::{VaultError, VaultResult};
use crate::models::{Lsn, TimelineId, WalRange};

use super::WalSegment;

const SEGMENT_NAME_LEN: usize = 24;

/// File name of segment `segno` on `timeline`
pub fn segment_file_name(timeline: TimelineId, segno: u64, segment_size: u64) -> String {
    let per_log_id = 0x1_0000_0000u64 / segment_size;
    format!(
        "{:08X}{:08X}{:08X}",
        timeline.value(),
        segno / per_log_id,
        segno % per_log_id
    )
}

/// Whether `name` looks like a WAL segment file name
pub fn is_segment_name(name: &str) -> bool {
    name.len() == SEGMENT_NAME_LEN && name.chars().all(|c| c.is_ascii_hexdigit())
}

/// Names of the segments holding the bytes of `(range.start, range.end]`
pub fn segments_covering(timeline: TimelineId, range: WalRange, segment_size: u64) -> Vec<String> {
    if range.is_empty() {
        return Vec::new();
    }

    let first = range.start.segment_number(segment_size);
    let last = Lsn(range.end.0 - 1).segment_number(segment_size);

    (first..=last)
        .map(|segno| segment_file_name(timeline, segno, segment_size))
        .collect()
}

/// Pick `needed` out of `available`, failing if any segment is missing
pub fn select_segments(
    available: &[WalSegment],
    needed: &[String],
) -> VaultResult<Vec<WalSegment>> {
    needed
        .iter()
        .map(|name| {
            available
                .iter()
                .find(|s| &s.name == name)
                .cloned()
                .ok_or_else(|| {
                    VaultError::Engine(format!(
                        "WAL segment {} is no longer in the WAL directory",
                        name
                    ))
                })
        })
        .collect()
}

/// List segment files in a WAL directory, oldest name first
pub fn scan_wal_dir(wal_dir: &Path) -> VaultResult<Vec<WalSegment>> {
    if !wal_dir.exists() {
        return Err(VaultError::Engine(format!(
            "WAL directory not found: {}",
            wal_dir.display()
        )));
    }

    let mut segments = Vec::new();
    for entry in fs::read_dir(wal_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !is_segment_name(&name) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        segments.push(WalSegment {
            name,
            path: entry.path(),
            size: metadata.len(),
            modified: metadata.modified()?,
        });
    }

    segments.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SEG: u64 = 16 * 1024 * 1024;

    #[test]
    fn test_segment_file_name() {
        assert_eq!(
            segment_file_name(TimelineId(1), 3, SEG),
            "000000010000000000000003"
        );
        // 256 segments of 16MiB per log id
        assert_eq!(
            segment_file_name(TimelineId(2), 257, SEG),
            "000000020000000100000001"
        );
    }

    #[test]
    fn test_segments_covering_single_segment() {
        let range = WalRange::new(Lsn(0x0200_0100), Lsn(0x0300_0000));
        assert_eq!(
            segments_covering(TimelineId(1), range, SEG),
            vec!["000000010000000000000002".to_string()]
        );
    }

    #[test]
    fn test_segments_covering_spans() {
        let range = WalRange::new(Lsn(0x0300_0000), Lsn(0x0500_0010));
        let names = segments_covering(TimelineId(1), range, SEG);
        assert_eq!(
            names,
            vec![
                "000000010000000000000003",
                "000000010000000000000004",
                "000000010000000000000005",
            ]
        );
    }

    #[test]
    fn test_empty_range_needs_nothing() {
        let range = WalRange::new(Lsn(0x0300_0000), Lsn(0x0300_0000));
        assert!(segments_covering(TimelineId(1), range, SEG).is_empty());
    }

    #[test]
    fn test_scan_and_select() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("000000010000000000000002"), b"seg2").unwrap();
        fs::write(temp_dir.path().join("000000010000000000000003"), b"seg3").unwrap();
        fs::write(temp_dir.path().join("000000010000000000000003.partial"), b"x").unwrap();
        fs::create_dir(temp_dir.path().join("archive_status")).unwrap();

        let available = scan_wal_dir(temp_dir.path()).unwrap();
        assert_eq!(available.len(), 2);

        let needed = ["000000010000000000000003".to_string()];
        let picked = select_segments(&available, &needed).unwrap();
        assert_eq!(picked[0].size, 4);

        let missing = select_segments(&available, &["000000010000000000000009".to_string()]);
        assert!(matches!(missing, Err(VaultError::Engine(_))));
    }

    #[test]
    fn test_scan_missing_dir_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(scan_wal_dir(&temp_dir.path().join("pg_wal")).is_err());
    }
}
