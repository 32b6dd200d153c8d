//! Expansion of the persistent-alert path list into alert files.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Expands `paths` into candidate alert files.
///
/// Directories are scanned recursively in name order. Symlinked entries
/// inside a directory are skipped. Paths that are not directories are passed
/// through unchanged so the loader can report them if they do not exist.
pub fn discover_alert_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            scan_dir(path, &mut files);
        } else {
            files.push(path.clone());
        }
    }
    files
}

fn scan_dir(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Unable to scan alert directory {}: {}", dir.display(), e);
            return;
        }
    };

    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort();

    for path in paths {
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Unable to stat {}: {}", path.display(), e);
                continue;
            }
        };
        if meta.file_type().is_symlink() {
            debug!("Skipping symlink {}", path.display());
        } else if meta.is_dir() {
            scan_dir(&path, files);
        } else {
            files.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recursive_scan() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("b/nested")).unwrap();
        fs::write(root.join("a.vsa"), "").unwrap();
        fs::write(root.join("b/c.vsax"), "").unwrap();
        fs::write(root.join("b/nested/.hidden.vsa"), "").unwrap();

        let files = discover_alert_files(&[root.to_path_buf()]);
        assert_eq!(
            files,
            vec![
                root.join("a.vsa"),
                root.join("b/c.vsax"),
                root.join("b/nested/.hidden.vsa"),
            ]
        );
    }

    #[test]
    fn test_plain_paths_pass_through() {
        let missing = PathBuf::from("/nonexistent/alert.vsa");
        assert_eq!(discover_alert_files(&[missing.clone()]), vec![missing]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("real")).unwrap();
        fs::write(root.join("real/x.vsa"), "").unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("link")).unwrap();

        let files = discover_alert_files(&[root.to_path_buf()]);
        assert_eq!(files, vec![root.join("real/x.vsa")]);
    }
}
