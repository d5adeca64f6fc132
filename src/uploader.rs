//! Upload targets and the sequential upload loop behind the CLI.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::auth::TokenProvider;
use crate::client::{guess_mime_type, DriveClient};
use crate::error::{DriveError, Result};
use crate::models::FileRef;

/// Expand an upload argument into the files to send.
///
/// A regular file yields itself. A directory yields its immediate children
/// that are regular files, sorted by name; subdirectories and other entries
/// are skipped, there is no recursion. Anything else is
/// [`DriveError::UploadTargetNotFound`].
pub fn resolve_targets(path: &Path) -> Result<Vec<PathBuf>> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => DriveError::UploadTargetNotFound(path.to_path_buf()),
        _ => DriveError::IoError(e),
    })?;

    if metadata.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !metadata.is_dir() {
        return Err(DriveError::UploadTargetNotFound(path.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry_path = entry?.path();
        if entry_path.is_file() {
            files.push(entry_path);
        } else {
            warn!("skipping {}: not a regular file", entry_path.display());
        }
    }
    files.sort();

    debug!("{} file(s) to upload from {}", files.len(), path.display());
    Ok(files)
}

/// Upload `files` one after another, writing `<id> - <name>` to `out` after each.
///
/// Stops at the first failure. Files already uploaded stay uploaded and
/// their lines are already written; later files are not attempted.
pub async fn upload_all<A, W>(
    client: &DriveClient<A>,
    files: &[PathBuf],
    parent_id: Option<&str>,
    out: &mut W,
) -> Result<Vec<FileRef>>
where
    A: TokenProvider,
    W: Write,
{
    let mut uploaded = Vec::with_capacity(files.len());

    for file in files {
        let id = client.upload_file(file, parent_id).await?;
        let entry = FileRef {
            id,
            name: file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            mime_type: guess_mime_type(file),
        };

        writeln!(out, "{}", entry)?;
        out.flush()?;
        uploaded.push(entry);
    }

    Ok(uploaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_single_file_target() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("onefile.txt");
        fs::write(&file, b"hello").unwrap();

        assert_eq!(resolve_targets(&file).unwrap(), vec![file]);
    }

    #[test]
    fn test_directory_is_not_recursive() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.txt"), b"c").unwrap();

        let targets = resolve_targets(dir.path()).unwrap();
        assert_eq!(
            targets,
            vec![dir.path().join("a.txt"), dir.path().join("b.txt")]
        );
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("only_a_dir")).unwrap();

        assert!(resolve_targets(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_target() {
        let err = resolve_targets(Path::new("/nonexistent/missing.txt")).unwrap_err();
        assert!(matches!(err, DriveError::UploadTargetNotFound(_)));
    }
}
