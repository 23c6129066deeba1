//! File editing with backups
//!
//! Replaces a whole file or an inclusive, 1-indexed line range. An existing
//! target is copied into the backup directory before it is modified.

use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ToolError, ToolOutcome};
use crate::security::SecurityPolicy;

/// Result of an edit
#[derive(Debug, Clone, Serialize)]
pub struct EditOutcome {
    pub message: String,
    pub file_path: String,
    /// `None` when the file did not exist before the edit
    pub backup_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines_modified: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_lines: Option<usize>,
}

/// Whole-file and line-range editor
#[derive(Clone)]
pub struct Editor {
    policy: Arc<SecurityPolicy>,
    backup_dir: PathBuf,
}

impl Editor {
    pub fn new(policy: Arc<SecurityPolicy>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            policy,
            backup_dir: backup_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Edit a file.
    ///
    /// With no range the file is replaced (and created if absent). With a
    /// range the file must exist; `end_line` past the end is clamped.
    pub async fn edit(
        &self,
        path: &str,
        content: &str,
        start_line: Option<usize>,
        end_line: Option<usize>,
    ) -> ToolOutcome<EditOutcome> {
        let resolved = self.policy.require_path(path)?;

        match (start_line, end_line) {
            (None, None) => self.replace_whole(path, &resolved, content),
            (Some(start), Some(end)) => self.replace_range(path, &resolved, content, start, end),
            _ => Err(ToolError::InvalidArguments(
                "start_line and end_line must be given together".to_string(),
            )),
        }
    }

    fn replace_whole(&self, path: &str, resolved: &Path, content: &str) -> ToolOutcome<EditOutcome> {
        if resolved.is_dir() {
            return Err(ToolError::NotAFile(path.into()));
        }

        let backup = self.backup(resolved)?;
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_replacing(resolved, content)?;

        let lines = content.lines().count();
        tracing::info!(path = %path, lines, backup = ?backup, "Replaced file");

        Ok(EditOutcome {
            message: format!("File edited successfully: {}", path),
            file_path: path.to_string(),
            backup_path: backup.map(|b| b.display().to_string()),
            size: Some(content.len() as u64),
            lines: Some(lines),
            lines_modified: None,
            new_lines: None,
            total_lines: None,
        })
    }

    fn replace_range(
        &self,
        path: &str,
        resolved: &Path,
        content: &str,
        start: usize,
        end: usize,
    ) -> ToolOutcome<EditOutcome> {
        let bytes = match std::fs::read(resolved) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::not_found("File", path));
            }
            Err(e) if resolved.is_dir() => {
                tracing::debug!(error = %e, "Range edit target is a directory");
                return Err(ToolError::NotAFile(path.into()));
            }
            Err(e) => return Err(e.into()),
        };
        let current = String::from_utf8(bytes).map_err(|_| ToolError::BinaryUnsupported(path.into()))?;

        let spliced = splice_lines(&current, content, start, end)?;

        let backup = self.backup(resolved)?;
        write_replacing(resolved, &spliced.text)?;

        tracing::info!(
            path = %path,
            start,
            end = spliced.end,
            new_lines = spliced.new_lines,
            backup = ?backup,
            "Edited line range"
        );

        Ok(EditOutcome {
            message: format!(
                "File edited successfully (lines {}-{}): {}",
                start, spliced.end, path
            ),
            file_path: path.to_string(),
            backup_path: backup.map(|b| b.display().to_string()),
            size: None,
            lines: None,
            lines_modified: Some(spliced.end - start + 1),
            new_lines: Some(spliced.new_lines),
            total_lines: Some(spliced.total_lines),
        })
    }

    /// Copy an existing file into the backup directory.
    ///
    /// Returns `None` if there is nothing to back up.
    fn backup(&self, target: &Path) -> ToolOutcome<Option<PathBuf>> {
        if !target.is_file() {
            return Ok(None);
        }

        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ToolError::BackupFailed(format!("no file name in {}", target.display())))?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let backup_path = self.backup_dir.join(format!("{}.{}.backup", name, stamp));

        std::fs::create_dir_all(&self.backup_dir)
            .and_then(|_| std::fs::copy(target, &backup_path))
            .map_err(|e| ToolError::BackupFailed(e.to_string()))?;

        tracing::debug!(from = %target.display(), to = %backup_path.display(), "Backup created");
        Ok(Some(backup_path))
    }
}

struct Spliced {
    text: String,
    /// Effective end line after clamping
    end: usize,
    new_lines: usize,
    total_lines: usize,
}

/// Replace lines `start..=end` (1-indexed) of `current` with `replacement`
fn splice_lines(current: &str, replacement: &str, start: usize, end: usize) -> ToolOutcome<Spliced> {
    let lines: Vec<&str> = current.split_inclusive('\n').collect();

    if start < 1 || end < start || start > lines.len() {
        return Err(ToolError::InvalidRange {
            start,
            end,
            lines: lines.len(),
        });
    }
    let end = end.min(lines.len());

    let mut inserted: Vec<String> = replacement
        .split_inclusive('\n')
        .map(str::to_string)
        .collect();

    // A final unterminated line must not fuse with the line after the range
    if end < lines.len() {
        if let Some(last) = inserted.last_mut() {
            if !last.ends_with('\n') {
                last.push_str(line_ending(replacement, lines[end - 1]));
            }
        }
    }

    let new_lines = inserted.len();
    let mut text = String::with_capacity(current.len() + replacement.len());
    lines[..start - 1].iter().for_each(|l| text.push_str(l));
    inserted.iter().for_each(|l| text.push_str(l));
    lines[end..].iter().for_each(|l| text.push_str(l));

    let total_lines = start - 1 + new_lines + (lines.len() - end);

    Ok(Spliced {
        text,
        end,
        new_lines,
        total_lines,
    })
}

/// Line ending of the replacement text, falling back to the replaced line's
fn line_ending(replacement: &str, replaced_line: &str) -> &'static str {
    if replacement.contains('\n') {
        if replacement.contains("\r\n") {
            "\r\n"
        } else {
            "\n"
        }
    } else if replaced_line.ends_with("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

/// Write through a sibling temp file and rename over the target
fn write_replacing(target: &Path, content: &str) -> ToolOutcome<()> {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = target.with_file_name(format!(".{}.{}.tmp", name, std::process::id()));

    let result = std::fs::write(&tmp, content).and_then(|_| {
        if let Ok(meta) = std::fs::metadata(target) {
            std::fs::set_permissions(&tmp, meta.permissions())?;
        }
        std::fs::rename(&tmp, target)
    });

    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn editor(temp: &TempDir) -> Editor {
        Editor::new(
            Arc::new(SecurityPolicy::permissive()),
            temp.path().join("backups"),
        )
    }

    fn p(path: &Path) -> String {
        path.display().to_string()
    }

    #[tokio::test]
    async fn test_range_edit_replaces_only_range() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("five.txt");
        std::fs::write(&file, "1\n2\n3\n4\n5\n").unwrap();

        let outcome = editor(&temp)
            .edit(&p(&file), "two\nthree\n", Some(2), Some(3))
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), "1\ntwo\nthree\n4\n5\n");
        assert_eq!(outcome.lines_modified, Some(2));
        assert_eq!(outcome.new_lines, Some(2));
        assert_eq!(outcome.total_lines, Some(5));
        assert!(outcome.backup_path.is_some());
    }

    #[tokio::test]
    async fn test_range_edit_line_count_follows_block() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("five.txt");
        std::fs::write(&file, "1\n2\n3\n4\n5\n").unwrap();

        let outcome = editor(&temp)
            .edit(&p(&file), "a\nb\nc\nd", Some(2), Some(3))
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "1\na\nb\nc\nd\n4\n5\n"
        );
        assert_eq!(outcome.new_lines, Some(4));
        assert_eq!(outcome.total_lines, Some(7));
    }

    #[tokio::test]
    async fn test_range_edit_clamps_end() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("short.txt");
        std::fs::write(&file, "a\nb\nc").unwrap();

        let outcome = editor(&temp)
            .edit(&p(&file), "z", Some(2), Some(99))
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), "a\nz");
        assert_eq!(outcome.lines_modified, Some(2));
    }

    #[tokio::test]
    async fn test_range_edit_keeps_crlf() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("dos.txt");
        std::fs::write(&file, "a\r\nb\r\nc\r\n").unwrap();

        editor(&temp)
            .edit(&p(&file), "B", Some(2), Some(2))
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), "a\r\nB\r\nc\r\n");
    }

    #[tokio::test]
    async fn test_invalid_ranges() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("three.txt");
        std::fs::write(&file, "1\n2\n3\n").unwrap();
        let ed = editor(&temp);

        for (start, end) in [(0, 1), (3, 2), (4, 5)] {
            let err = ed.edit(&p(&file), "x", Some(start), Some(end)).await.unwrap_err();
            assert_eq!(err.kind(), "invalid_range", "range {}-{}", start, end);
        }
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "1\n2\n3\n");
        assert!(!temp.path().join("backups").exists());
    }

    #[tokio::test]
    async fn test_half_range_is_invalid_arguments() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("f.txt");
        std::fs::write(&file, "1\n").unwrap();

        let err = editor(&temp)
            .edit(&p(&file), "x", Some(1), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");
    }

    #[tokio::test]
    async fn test_range_edit_requires_existing_file() {
        let temp = TempDir::new().unwrap();
        let err = editor(&temp)
            .edit(&p(&temp.path().join("missing.txt")), "x", Some(1), Some(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_full_replace_creates_without_backup() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("sub/new.txt");

        let outcome = editor(&temp).edit(&p(&file), "hi\nthere\n", None, None).await.unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hi\nthere\n");
        assert_eq!(outcome.backup_path, None);
        assert_eq!(outcome.lines, Some(2));
        assert_eq!(outcome.size, Some(9));
    }

    #[tokio::test]
    async fn test_full_replace_backs_up_original() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("keep.txt");
        std::fs::write(&file, "original").unwrap();

        let outcome = editor(&temp).edit(&p(&file), "replaced", None, None).await.unwrap();

        let backup = PathBuf::from(outcome.backup_path.unwrap());
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "original");
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("keep.txt."));
        assert!(name.ends_with(".backup"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "replaced");
    }

    #[tokio::test]
    async fn test_backup_failure_aborts_edit() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("target.txt");
        std::fs::write(&file, "untouched").unwrap();
        // A regular file where the backup directory should be
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let ed = Editor::new(Arc::new(SecurityPolicy::permissive()), &blocker);
        let err = ed.edit(&p(&file), "changed", None, None).await.unwrap_err();

        assert_eq!(err.kind(), "backup_failed");
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "untouched");
    }

    #[tokio::test]
    async fn test_edit_denied_by_policy() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("locked.txt");
        std::fs::write(&file, "x").unwrap();

        let policy = SecurityPolicy::new::<String>(&[], &[p(temp.path())], &[], &[]);
        let ed = Editor::new(Arc::new(policy), temp.path().join("backups"));
        let err = ed.edit(&p(&file), "y", None, None).await.unwrap_err();

        assert_eq!(err.kind(), "access_denied");
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "x");
    }
}
