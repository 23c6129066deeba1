//! Policy-gated file operations
//!
//! Read, list, delete and create files on behalf of the model. Every
//! operation runs the path through [`SecurityPolicy`] before touching disk.

use serde::Serialize;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

use crate::error::{ToolError, ToolOutcome};
use crate::security::SecurityPolicy;

/// Bytes inspected when sniffing for binary content
pub const BINARY_SNIFF_LEN: usize = 1024;

/// File content with metadata
#[derive(Debug, Clone, Serialize)]
pub struct FileContent {
    pub file_path: String,
    pub content: String,
    pub size: u64,
    /// Line count of the whole file, before truncation
    pub lines: usize,
    pub truncated: bool,
}

/// One entry of a directory listing
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DirEntryInfo {
    pub name: String,
    /// Path relative to the listed directory, `/`-separated
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub size: Option<u64>,
    /// Seconds since the unix epoch
    pub modified: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
}

/// Directory listing
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryListing {
    pub directory: String,
    pub items: Vec<DirEntryInfo>,
    pub count: usize,
}

/// Result of a create or delete
#[derive(Debug, Clone, Serialize)]
pub struct FileChange {
    pub message: String,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Policy-gated filesystem operations
#[derive(Clone)]
pub struct FileStore {
    policy: Arc<SecurityPolicy>,
}

impl FileStore {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self { policy }
    }

    /// Read a text file.
    ///
    /// Files over the size ceiling are rejected without reading. Content
    /// past `max_output_lines` is cut and marked.
    pub async fn read(&self, path: &str) -> ToolOutcome<FileContent> {
        let resolved = self.policy.require_path(path)?;

        let metadata = match tokio::fs::metadata(&resolved).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::not_found("File", path));
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(ToolError::NotAFile(path.into()));
        }

        let size = metadata.len();
        let max = self.policy.max_file_size();
        if size > max {
            return Err(ToolError::TooLarge { size, max });
        }

        let bytes = tokio::fs::read(&resolved).await?;
        if looks_binary(&bytes) {
            return Err(ToolError::BinaryUnsupported(path.into()));
        }

        let text = String::from_utf8_lossy(&bytes);
        let (content, lines, truncated) =
            truncate_lines(&text, self.policy.max_output_lines());

        tracing::info!(path = %path, size, lines, truncated, "Read file");

        Ok(FileContent {
            file_path: path.to_string(),
            content,
            size,
            lines,
            truncated,
        })
    }

    /// List a directory, optionally recursing.
    ///
    /// Entries the policy denies are left out; recursion does not descend
    /// into denied directories.
    pub async fn list(&self, path: &str, recursive: bool) -> ToolOutcome<DirectoryListing> {
        let resolved = self.policy.require_path(path)?;
        ensure_directory(&resolved, path)?;

        let policy = Arc::clone(&self.policy);
        let mut items = tokio::task::spawn_blocking(move || collect_entries(&policy, &resolved, recursive))
            .await
            .map_err(|e| ToolError::ExecutionFailure(format!("Listing task failed: {}", e)))?;

        items.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));

        tracing::info!(path = %path, recursive, count = items.len(), "Listed directory");

        Ok(DirectoryListing {
            directory: path.to_string(),
            count: items.len(),
            items,
        })
    }

    /// Delete a regular file. There is no backup.
    pub async fn delete(&self, path: &str) -> ToolOutcome<FileChange> {
        let resolved = self.policy.require_path(path)?;

        let metadata = match tokio::fs::metadata(&resolved).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::not_found("File", path));
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(ToolError::NotAFile(path.into()));
        }

        tokio::fs::remove_file(&resolved).await?;
        tracing::info!(path = %path, "Deleted file");

        Ok(FileChange {
            message: format!("File deleted successfully: {}", path),
            file_path: path.to_string(),
            size: None,
        })
    }

    /// Create a new file. Never overwrites.
    pub async fn create(&self, path: &str, content: &str) -> ToolOutcome<FileChange> {
        let resolved = self.policy.require_path(path)?;

        if tokio::fs::symlink_metadata(&resolved).await.is_ok() {
            return Err(ToolError::AlreadyExists(path.into()));
        }

        let target = resolved.clone();
        let data = content.as_bytes().to_vec();
        tokio::task::spawn_blocking(move || create_new_file(&target, &data))
            .await
            .map_err(|e| ToolError::ExecutionFailure(e.to_string()))?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => ToolError::AlreadyExists(path.into()),
                _ => ToolError::Io(e),
            })?;

        let size = content.len() as u64;
        tracing::info!(path = %path, size, "Created file");

        Ok(FileChange {
            message: format!("File created successfully: {}", path),
            file_path: path.to_string(),
            size: Some(size),
        })
    }
}

/// Walk `root`, pruning entries the policy denies
fn collect_entries(policy: &SecurityPolicy, root: &Path, recursive: bool) -> Vec<DirEntryInfo> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut items = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| policy.check_path(entry.path()).allowed);

    for entry in walker {
        let Ok(entry) = entry else { continue };
        let Ok(metadata) = entry.metadata() else { continue };

        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path());

        items.push(DirEntryInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: slash_path(rel),
            kind,
            size: metadata.is_file().then(|| metadata.len()),
            modified: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64()),
        });
    }

    items
}

fn create_new_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;

    if let Err(e) = file.write_all(data).and_then(|_| file.sync_all()) {
        drop(file);
        let _ = std::fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

/// Verify `resolved` is an existing directory
pub(crate) fn ensure_directory(resolved: &Path, shown: &str) -> ToolOutcome<()> {
    match std::fs::metadata(resolved) {
        Ok(m) if m.is_dir() => Ok(()),
        Ok(_) => Err(ToolError::NotADirectory(PathBuf::from(shown))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ToolError::not_found("Directory", shown))
        }
        Err(e) => Err(e.into()),
    }
}

/// Null byte in the leading bytes means binary
pub fn looks_binary(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(BINARY_SNIFF_LEN)].contains(&0)
}

/// Sniff a file on disk without reading all of it
pub fn is_binary_file(path: &Path) -> std::io::Result<bool> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = [0u8; BINARY_SNIFF_LEN];
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(looks_binary(&buf[..filled]))
}

/// Keep the first `max_lines` lines and append the truncation marker.
///
/// Returns the (possibly cut) text, the original line count and whether
/// anything was dropped.
pub fn truncate_lines(text: &str, max_lines: usize) -> (String, usize, bool) {
    let total = text.lines().count();
    if total <= max_lines {
        return (text.to_string(), total, false);
    }

    let mut kept = text.lines().take(max_lines).collect::<Vec<_>>().join("\n");
    kept.push_str(&format!(
        "\n... (truncated, showing first {} lines)",
        max_lines
    ));
    (kept, total, true)
}

pub(crate) fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> FileStore {
        FileStore::new(Arc::new(SecurityPolicy::permissive()))
    }

    fn p(path: &Path) -> String {
        path.display().to_string()
    }

    #[tokio::test]
    async fn test_read_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("hello.txt");
        std::fs::write(&file, "line one\nline two\n").unwrap();

        let content = store().read(&p(&file)).await.unwrap();
        assert_eq!(content.content, "line one\nline two\n");
        assert_eq!(content.lines, 2);
        assert_eq!(content.size, 18);
        assert!(!content.truncated);
    }

    #[tokio::test]
    async fn test_read_truncates_long_files() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("long.txt");
        let text: String = (1..=20).map(|i| format!("row {}\n", i)).collect();
        std::fs::write(&file, text).unwrap();

        let policy = SecurityPolicy::permissive().with_limits(1024, 5);
        let content = FileStore::new(Arc::new(policy)).read(&p(&file)).await.unwrap();

        assert!(content.truncated);
        assert_eq!(content.lines, 20);
        assert!(content.content.starts_with("row 1\nrow 2\n"));
        assert!(content
            .content
            .ends_with("row 5\n... (truncated, showing first 5 lines)"));
    }

    #[tokio::test]
    async fn test_read_rejects_large_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("big.txt");
        std::fs::write(&file, "x".repeat(2048)).unwrap();

        let policy = SecurityPolicy::permissive().with_limits(1024, 1000);
        let err = FileStore::new(Arc::new(policy))
            .read(&p(&file))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::TooLarge { size: 2048, max: 1024 }));
    }

    #[tokio::test]
    async fn test_read_rejects_binary() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("blob.bin");
        std::fs::write(&file, [0x89u8, b'P', 0, 1, 2]).unwrap();

        let err = store().read(&p(&file)).await.unwrap_err();
        assert_eq!(err.kind(), "binary_unsupported");
    }

    #[tokio::test]
    async fn test_read_missing_and_directory() {
        let temp = TempDir::new().unwrap();

        let err = store().read(&p(&temp.path().join("nope"))).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let err = store().read(&p(temp.path())).await.unwrap_err();
        assert_eq!(err.kind(), "not_a_file");
    }

    #[tokio::test]
    async fn test_read_lossy_utf8() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("latin1.txt");
        std::fs::write(&file, [b'c', b'a', b'f', 0xE9, b'\n']).unwrap();

        let content = store().read(&p(&file)).await.unwrap();
        assert!(content.content.starts_with("caf"));
        assert_eq!(content.lines, 1);
    }

    #[tokio::test]
    async fn test_list_directory() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("b.txt"), "b").unwrap();
        std::fs::write(temp.path().join("a.txt"), "aa").unwrap();
        std::fs::create_dir(temp.path().join("zdir")).unwrap();
        std::fs::write(temp.path().join("zdir/inner.txt"), "i").unwrap();

        let listing = store().list(&p(temp.path()), false).await.unwrap();
        let names: Vec<_> = listing.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["zdir", "a.txt", "b.txt"]);
        assert_eq!(listing.count, 3);
        assert_eq!(listing.items[0].size, None);
        assert_eq!(listing.items[1].size, Some(2));
        assert!(listing.items[1].modified.is_some());

        let listing = store().list(&p(temp.path()), true).await.unwrap();
        assert_eq!(listing.count, 4);
        assert!(listing.items.iter().any(|i| i.path == "zdir/inner.txt"));
    }

    #[tokio::test]
    async fn test_list_prunes_blocked_directories() {
        let temp = TempDir::new().unwrap();
        let secret = temp.path().join("secret");
        std::fs::create_dir(&secret).unwrap();
        std::fs::write(secret.join("key.txt"), "k").unwrap();
        std::fs::write(temp.path().join("open.txt"), "o").unwrap();

        let policy = SecurityPolicy::new::<String>(&[], &[p(&secret)], &[], &[]);
        let listing = FileStore::new(Arc::new(policy))
            .list(&p(temp.path()), true)
            .await
            .unwrap();

        let paths: Vec<_> = listing.items.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["open.txt"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_recursive_list_runs_off_the_executor() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("a/b/c")).unwrap();
        std::fs::write(temp.path().join("a/b/c/leaf.txt"), "x").unwrap();

        let policy = Arc::new(SecurityPolicy::permissive());
        let ticker = tokio::spawn(async { tokio::task::yield_now().await });
        let listing = FileStore::new(policy.clone())
            .list(&p(temp.path()), true)
            .await
            .unwrap();
        ticker.await.unwrap();

        assert_eq!(listing.count, 4);
        let direct = collect_entries(&policy, temp.path(), false);
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].name, "a");
    }

    #[tokio::test]
    async fn test_list_not_a_directory() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("f.txt");
        std::fs::write(&file, "f").unwrap();

        let err = store().list(&p(&file), false).await.unwrap_err();
        assert_eq!(err.kind(), "not_a_directory");
    }

    #[tokio::test]
    async fn test_create_never_overwrites() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("nested/dir/new.txt");

        let created = store().create(&p(&file), "hello").await.unwrap();
        assert_eq!(created.size, Some(5));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello");

        let err = store().create(&p(&file), "other").await.unwrap_err();
        assert_eq!(err.kind(), "already_exists");
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_delete_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("gone.txt");
        std::fs::write(&file, "bye").unwrap();

        tokio_test::assert_ok!(store().delete(&p(&file)).await);
        assert!(!file.exists());

        let err = store().delete(&p(&file)).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
        let err = store().delete(&p(temp.path())).await.unwrap_err();
        assert_eq!(err.kind(), "not_a_file");
    }

    #[tokio::test]
    async fn test_blocked_path() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("x.txt");
        std::fs::write(&file, "x").unwrap();

        let policy = SecurityPolicy::new::<String>(&[], &[p(temp.path())], &[], &[]);
        let files = FileStore::new(Arc::new(policy));

        assert_eq!(files.read(&p(&file)).await.unwrap_err().kind(), "access_denied");
        assert_eq!(files.delete(&p(&file)).await.unwrap_err().kind(), "access_denied");
        assert!(file.exists());
    }

    #[test]
    fn test_truncate_lines_exact_limit() {
        let (text, total, truncated) = truncate_lines("a\nb\n", 2);
        assert_eq!(text, "a\nb\n");
        assert_eq!(total, 2);
        assert!(!truncated);
    }
}
