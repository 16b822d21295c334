//! Archive and directory helpers
//!
//! Content trees are stored as gzip-compressed tarballs with paths relative
//! to the tree root. WAL segments are stored as single gzip files. Snapshots
//! are plain recursive copies.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};
use walkdir::WalkDir;

use crate::error::{VaultError, VaultResult};

/// Pack every regular file under `root` into `dest`
///
/// A missing root produces a valid, empty archive.
/// Returns the archived paths, relative to `root`.
pub fn pack_tree(root: &Path, dest: &Path) -> VaultResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    if root.exists() {
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let rel = entry
                    .path()
                    .strip_prefix(root)
                    .map_err(|e| VaultError::Archive(e.to_string()))?;
                files.push(rel.to_path_buf());
            }
        }
    }
    files.sort();
    pack_files(root, &files, dest)?;
    Ok(files)
}

/// Pack the listed files (relative to `root`) into `dest`
pub fn pack_files(root: &Path, files: &[PathBuf], dest: &Path) -> VaultResult<()> {
    let file = File::create(dest).map_err(|e| {
        VaultError::Archive(format!("Failed to create archive {}: {}", dest.display(), e))
    })?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = Builder::new(encoder);

    for rel_path in files {
        let abs_path = root.join(rel_path);
        let mut src = File::open(&abs_path).map_err(|e| {
            VaultError::Archive(format!("Failed to open {}: {}", abs_path.display(), e))
        })?;
        builder.append_file(rel_path, &mut src).map_err(|e| {
            VaultError::Archive(format!(
                "Failed to append {} to archive: {}",
                abs_path.display(),
                e
            ))
        })?;
    }

    let mut writer = builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| VaultError::Archive(format!("Failed to finish archive: {}", e)))?;
    writer
        .flush()
        .map_err(|e| VaultError::Archive(format!("Failed to flush archive: {}", e)))?;

    Ok(())
}

/// Extract a tarball into `dest`, overwriting files with the same relative
/// path and leaving everything else in place
pub fn unpack(archive_path: &Path, dest: &Path) -> VaultResult<()> {
    let file = File::open(archive_path).map_err(|e| {
        VaultError::Archive(format!(
            "Failed to open archive {}: {}",
            archive_path.display(),
            e
        ))
    })?;

    fs::create_dir_all(dest)?;

    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.set_overwrite(true);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);

    archive.unpack(dest).map_err(|e| {
        VaultError::Archive(format!(
            "Failed to extract {} into {}: {}",
            archive_path.display(),
            dest.display(),
            e
        ))
    })
}

/// Relative paths of the regular files stored in a tarball
pub fn list_entries(archive_path: &Path) -> VaultResult<Vec<PathBuf>> {
    let file = File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));

    let mut paths = Vec::new();
    let entries = archive
        .entries()
        .map_err(|e| VaultError::Archive(format!("Failed to read archive: {}", e)))?;
    for entry in entries {
        let entry =
            entry.map_err(|e| VaultError::Archive(format!("Corrupt archive entry: {}", e)))?;
        if entry.header().entry_type().is_file() {
            let path = entry
                .path()
                .map_err(|e| VaultError::Archive(format!("Invalid path in archive: {}", e)))?;
            paths.push(path.to_path_buf());
        }
    }
    Ok(paths)
}

/// Gzip a single file
pub fn compress_file(src: &Path, dest: &Path) -> VaultResult<u64> {
    let mut input = BufReader::new(File::open(src)?);
    let output = File::create(dest)?;
    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());

    let copied = io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(copied)
}

/// Inflate a gzip file written by [`compress_file`]
pub fn decompress_file(src: &Path, dest: &Path) -> VaultResult<u64> {
    let input = File::open(src)?;
    let mut decoder = GzDecoder::new(BufReader::new(input));
    let mut output = BufWriter::new(File::create(dest)?);

    let copied = io::copy(&mut decoder, &mut output).map_err(|e| {
        VaultError::Archive(format!("Failed to decompress {}: {}", src.display(), e))
    })?;
    output.flush()?;
    Ok(copied)
}

/// Recursively copy `src` to `dest`, keeping permissions and symlinks
pub fn copy_tree(src: &Path, dest: &Path) -> VaultResult<()> {
    fs::create_dir_all(dest)?;
    fs::set_permissions(dest, fs::metadata(src)?.permissions())?;

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| VaultError::Io(e.to_string()))?;
        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            fs::set_permissions(&target, entry.metadata()?.permissions())?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> VaultResult<()> {
    let link = fs::read_link(src)?;
    std::os::unix::fs::symlink(link, dest)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> VaultResult<()> {
    fs::copy(src, dest)?;
    Ok(())
}

/// Remove everything inside `dir` but keep the directory itself
///
/// A missing directory is created empty.
pub fn clear_dir(dir: &Path) -> VaultResult<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        return Ok(());
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Total size of all regular files under `root`
pub fn tree_size(root: &Path) -> VaultResult<u64> {
    let mut total = 0;
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_pack_and_unpack_tree() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("content");
        write(&root.join("a.txt"), "alpha");
        write(&root.join("nested/b.txt"), "beta");

        let archive = temp_dir.path().join("content.tar.gz");
        assert_eq!(pack_tree(&root, &archive).unwrap().len(), 2);

        let mut entries = list_entries(&archive).unwrap();
        entries.sort();
        assert_eq!(
            entries,
            vec![PathBuf::from("a.txt"), PathBuf::from("nested/b.txt")]
        );

        let out = temp_dir.path().join("out");
        unpack(&archive, &out).unwrap();
        assert_eq!(fs::read_to_string(out.join("nested/b.txt")).unwrap(), "beta");
    }

    #[test]
    fn test_pack_missing_root_is_empty_archive() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("content.tar.gz");

        assert!(pack_tree(&temp_dir.path().join("nope"), &archive).unwrap().is_empty());
        assert!(fs::metadata(&archive).unwrap().len() > 0);
        assert!(list_entries(&archive).unwrap().is_empty());
    }

    #[test]
    fn test_unpack_overlays_without_deleting() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        write(&src.join("shared.txt"), "new");

        let archive = temp_dir.path().join("delta.tar.gz");
        pack_files(&src, &[PathBuf::from("shared.txt")], &archive).unwrap();

        let dest = temp_dir.path().join("dest");
        write(&dest.join("shared.txt"), "old");
        write(&dest.join("untouched.txt"), "keep");

        unpack(&archive, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("shared.txt")).unwrap(), "new");
        assert_eq!(fs::read_to_string(dest.join("untouched.txt")).unwrap(), "keep");
    }

    #[test]
    fn test_compress_roundtrip_keeps_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("000000010000000000000003");
        let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        fs::write(&src, &payload).unwrap();

        let gz = temp_dir.path().join("seg.gz");
        compress_file(&src, &gz).unwrap();
        let out = temp_dir.path().join("restored");
        decompress_file(&gz, &out).unwrap();

        assert_eq!(fs::read(&out).unwrap(), payload);
    }

    #[test]
    fn test_copy_tree_and_clear_dir() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("data");
        write(&src.join("base/1/1259"), "heap");
        write(&src.join("PG_VERSION"), "16");

        let dest = temp_dir.path().join("copy");
        copy_tree(&src, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("base/1/1259")).unwrap(), "heap");
        assert_eq!(tree_size(&dest).unwrap(), 6);

        clear_dir(&src).unwrap();
        assert!(src.exists());
        assert_eq!(fs::read_dir(&src).unwrap().count(), 0);
    }

    #[test]
    fn test_decompress_garbage_fails() {
        let temp_dir = TempDir::new().unwrap();
        let bad = temp_dir.path().join("bad.gz");
        fs::write(&bad, b"not gzip").unwrap();

        let result = decompress_file(&bad, &temp_dir.path().join("out"));
        assert!(matches!(result, Err(VaultError::Archive(_))));
    }
}
