//! Cleanup of rendered badge label files.

use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::error::Result;

const LABEL_EXTENSIONS: &[&str] = &["pdf", "png"];

fn is_label_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| LABEL_EXTENSIONS.iter().any(|l| ext.eq_ignore_ascii_case(l)))
}

/// Remove label files in `dir` last modified more than `max_age` ago.
///
/// A missing directory counts as nothing to clean. Files that cannot be
/// inspected or removed are logged and skipped.
///
/// # Errors
///
/// Returns `SupervisorError::Io` if the directory exists but cannot be read.
pub async fn cleanup_old_label_files(dir: &Path, max_age: Duration) -> Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "Labels directory does not exist");
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_label_file(&path) {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => {
                warn!(path = %path.display(), "Cannot inspect label file: {}", e);
                continue;
            }
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if !age.is_some_and(|age| age > max_age) {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed label file");
                removed += 1;
            }
            Err(e) => warn!(path = %path.display(), "Cannot remove label file: {}", e),
        }
    }

    info!(dir = %dir.display(), removed, "Label cleanup finished");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, age: Duration) {
        let file = File::create(dir.join(name)).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[tokio::test]
    async fn test_removes_only_old_labels() {
        let dir = TempDir::new().unwrap();
        let day = Duration::from_secs(24 * 3600);

        touch(dir.path(), "old.pdf", day * 2);
        touch(dir.path(), "old.PNG", day * 3);
        touch(dir.path(), "fresh.pdf", Duration::from_secs(60));
        touch(dir.path(), "old.txt", day * 2);
        std::fs::create_dir(dir.path().join("archive.pdf")).unwrap();

        let removed = cleanup_old_label_files(dir.path(), day).await.unwrap();
        assert_eq!(removed, 2);

        let mut left: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        left.sort();
        assert_eq!(left, vec!["archive.pdf", "fresh.pdf", "old.txt"]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let removed = cleanup_old_label_files(&dir.path().join("labels"), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }
}
