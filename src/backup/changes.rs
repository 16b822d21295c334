//! Content tree change detection
//!
//! A file counts as changed when its modification time is strictly later
//! than the cutoff. Deleted files are not reported.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::error::{VaultError, VaultResult};

/// Regular files under `root` modified after `cutoff`, as sorted paths
/// relative to `root`
///
/// A missing root yields an empty set.
pub fn changed_since(root: &Path, cutoff: DateTime<Utc>) -> VaultResult<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut changed = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let modified: DateTime<Utc> = entry.metadata()?.modified()?.into();
        if modified > cutoff {
            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| VaultError::Io(e.to_string()))?;
            changed.push(rel.to_path_buf());
        }
    }

    changed.sort();
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn write_at(path: &Path, modified: SystemTime) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
    }

    #[test]
    fn test_reports_only_newer_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let cutoff = SystemTime::now() - Duration::from_secs(3600);

        write_at(&root.join("old.pdf"), cutoff - Duration::from_secs(60));
        write_at(&root.join("new.pdf"), cutoff + Duration::from_secs(60));
        write_at(&root.join("sub/dir/deep.csv"), cutoff + Duration::from_secs(120));

        let changed = changed_since(root, cutoff.into()).unwrap();
        assert_eq!(
            changed,
            vec![PathBuf::from("new.pdf"), PathBuf::from("sub/dir/deep.csv")]
        );
    }

    #[test]
    fn test_cutoff_is_exclusive() {
        let temp_dir = TempDir::new().unwrap();
        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        write_at(&temp_dir.path().join("same.txt"), at);

        assert!(changed_since(temp_dir.path(), at.into()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_root_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let changed = changed_since(&temp_dir.path().join("missing"), Utc::now()).unwrap();
        assert!(changed.is_empty());
    }

    #[test]
    fn test_directories_are_not_reported() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("fresh/empty")).unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        assert!(changed_since(temp_dir.path(), cutoff).unwrap().is_empty());
    }
}
