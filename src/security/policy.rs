//! Access-control policy for tool operations
//!
//! Every filesystem path and shell command a tool touches passes through
//! [`SecurityPolicy`] first. Block lists are evaluated before allow lists,
//! so a blocked prefix always wins.

use std::path::{Component, Path, PathBuf};

use crate::error::{ToolError, ToolOutcome};

/// Default size ceiling for file reads (10 MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default cap on lines returned by any tool
pub const DEFAULT_MAX_OUTPUT_LINES: usize = 1000;

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
    /// Normalized absolute path (path checks only)
    pub resolved_path: Option<PathBuf>,
}

impl PolicyVerdict {
    fn allow(resolved_path: Option<PathBuf>) -> Self {
        Self {
            allowed: true,
            reason: None,
            resolved_path,
        }
    }

    fn deny(reason: impl Into<String>, resolved_path: Option<PathBuf>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            resolved_path,
        }
    }
}

/// Path and command access policy, read-only after construction
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    allowed_directories: Vec<(String, PathBuf)>,
    blocked_directories: Vec<(String, PathBuf)>,
    allowed_commands: Vec<String>,
    blocked_commands: Vec<String>,
    max_file_size: u64,
    max_output_lines: usize,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::permissive()
    }
}

impl SecurityPolicy {
    /// Create a policy from configured lists.
    ///
    /// Directory prefixes are normalized once here, the same way checked
    /// paths are, so relative prefixes resolve against the startup directory.
    pub fn new<S: AsRef<str>>(
        allowed_directories: &[S],
        blocked_directories: &[S],
        allowed_commands: &[S],
        blocked_commands: &[S],
    ) -> Self {
        let prefixes = |dirs: &[S]| -> Vec<(String, PathBuf)> {
            dirs.iter()
                .map(|d| (d.as_ref().to_string(), resolve_path(d.as_ref())))
                .collect()
        };
        let lowered = |cmds: &[S]| -> Vec<String> {
            cmds.iter()
                .map(|c| c.as_ref().trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect()
        };

        Self {
            allowed_directories: prefixes(allowed_directories),
            blocked_directories: prefixes(blocked_directories),
            allowed_commands: lowered(allowed_commands),
            blocked_commands: lowered(blocked_commands),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_output_lines: DEFAULT_MAX_OUTPUT_LINES,
        }
    }

    /// A policy with no lists at all
    pub fn permissive() -> Self {
        Self::new::<&str>(&[], &[], &[], &[])
    }

    pub fn with_limits(mut self, max_file_size: u64, max_output_lines: usize) -> Self {
        self.max_file_size = max_file_size;
        self.max_output_lines = max_output_lines;
        self
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn max_output_lines(&self) -> usize {
        self.max_output_lines
    }

    /// Evaluate a filesystem path
    pub fn check_path(&self, path: impl AsRef<Path>) -> PolicyVerdict {
        let resolved = resolve_path(path.as_ref());

        for (name, prefix) in &self.blocked_directories {
            if resolved.starts_with(prefix) {
                return PolicyVerdict::deny(format!("{} is blocked", name), Some(resolved));
            }
        }

        if !self.allowed_directories.is_empty()
            && !self
                .allowed_directories
                .iter()
                .any(|(_, prefix)| resolved.starts_with(prefix))
        {
            return PolicyVerdict::deny("Path not in allowed directories", Some(resolved));
        }

        PolicyVerdict::allow(Some(resolved))
    }

    /// Evaluate a shell command line
    pub fn check_command(&self, command: &str) -> PolicyVerdict {
        let command_lower = command.trim().to_lowercase();
        if command_lower.is_empty() {
            return PolicyVerdict::deny("Command is empty", None);
        }

        for blocked in &self.blocked_commands {
            if command_lower.contains(blocked.as_str()) {
                return PolicyVerdict::deny(format!("Command blocked: contains '{}'", blocked), None);
            }
        }

        if !self.allowed_commands.is_empty() {
            let tokens = match shell_words::split(&command_lower) {
                Ok(tokens) => tokens,
                Err(e) => {
                    return PolicyVerdict::deny(format!("Command could not be parsed: {}", e), None)
                }
            };
            let Some(base) = tokens.first() else {
                return PolicyVerdict::deny("Command is empty", None);
            };
            if !self.allowed_commands.iter().any(|allowed| allowed == base) {
                return PolicyVerdict::deny(format!("Command not allowed: '{}'", base), None);
            }
        }

        PolicyVerdict::allow(None)
    }

    /// Check a path and return its resolved form, or `AccessDenied`
    pub fn require_path(&self, path: impl AsRef<Path>) -> ToolOutcome<PathBuf> {
        let verdict = self.check_path(path.as_ref());
        match verdict.resolved_path {
            Some(resolved) if verdict.allowed => Ok(resolved),
            _ => Err(ToolError::AccessDenied(
                verdict.reason.unwrap_or_else(|| "Path denied".to_string()),
            )),
        }
    }

    /// Check a command, or `AccessDenied`
    pub fn require_command(&self, command: &str) -> ToolOutcome<()> {
        let verdict = self.check_command(command);
        if verdict.allowed {
            Ok(())
        } else {
            Err(ToolError::AccessDenied(
                verdict.reason.unwrap_or_else(|| "Command denied".to_string()),
            ))
        }
    }
}

/// Normalize a path to absolute form.
///
/// `~` expands to `$HOME`, relative paths join the current directory, `.`
/// and `..` are resolved lexically, and symlinks are resolved through the
/// longest existing ancestor so non-existent targets still normalize.
pub fn resolve_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let expanded = expand_home(path);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(expanded),
            Err(_) => expanded,
        }
    };

    canonicalize_existing_prefix(&lexical_normalize(&absolute))
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn canonicalize_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut remainder = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            for part in remainder.iter().rev() {
                resolved.push(part);
            }
            return resolved;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                remainder.push(name.to_os_string());
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }
}
