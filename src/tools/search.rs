//! Search tools: filename search, grep, codebase search, definition lookup
//!
//! All searches walk the tree with `walkdir`, skip hidden entries and prune
//! directories the policy denies.

use glob::Pattern;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use walkdir::{DirEntry, WalkDir};

use crate::error::{ToolError, ToolOutcome};
use crate::security::SecurityPolicy;
use crate::tools::filesystem::{ensure_directory, is_binary_file, slash_path};

/// Cap on filename search results
pub const MAX_FILENAME_RESULTS: usize = 100;

/// Globs used by codebase search when none are given
pub const DEFAULT_FILE_TYPES: &[&str] = &[
    "*.py", "*.js", "*.ts", "*.java", "*.cpp", "*.c", "*.h", "*.rs", "*.go",
];

/// Declaration keywords recognized by definition lookup
const DEFINITION_KEYWORDS: &[&str] = &[
    "def", "class", "function", "const", "let", "var", "fn", "struct", "enum", "trait", "type",
    "interface",
];

#[derive(Debug, Clone, Serialize)]
pub struct FileMatch {
    /// Path relative to the search directory
    pub path: String,
    pub full_path: String,
    pub size: u64,
    pub modified: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSearchResult {
    pub pattern: String,
    pub directory: String,
    pub matches: Vec<FileMatch>,
    pub total_found: usize,
    pub truncated: bool,
}

/// A matching line
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LineMatch {
    /// Path relative to the search root, `/`-separated
    pub file: String,
    /// 1-based
    pub line_number: usize,
    /// Line text with surrounding whitespace trimmed
    pub line_content: String,
    /// `[start, end)` character offsets into the untrimmed line
    pub match_positions: Vec<[usize; 2]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrepResult {
    pub pattern: String,
    pub directory: String,
    pub file_pattern: String,
    pub matches: Vec<LineMatch>,
    pub total_found: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodebaseResult {
    pub query: String,
    pub file_types: Vec<String>,
    pub matches: Vec<LineMatch>,
    pub total_found: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DefinitionResult {
    pub symbol: String,
    pub file_types: Vec<String>,
    pub matches: Vec<LineMatch>,
    pub total_found: usize,
    pub truncated: bool,
}

/// Filename and content search
#[derive(Clone)]
pub struct TextSearch {
    policy: Arc<SecurityPolicy>,
}

impl TextSearch {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self { policy }
    }

    /// Find files whose name contains `pattern` (glob syntax allowed)
    pub async fn search_filenames(&self, pattern: &str, directory: &str) -> ToolOutcome<FileSearchResult> {
        let this = self.clone();
        let (pattern, directory) = (pattern.to_string(), directory.to_string());
        blocking(move || this.search_filenames_blocking(&pattern, &directory)).await
    }

    /// Case-insensitive regex search over files matching `file_pattern`
    pub async fn grep(&self, pattern: &str, directory: &str, file_pattern: &str) -> ToolOutcome<GrepResult> {
        let this = self.clone();
        let (pattern, directory, file_pattern) =
            (pattern.to_string(), directory.to_string(), file_pattern.to_string());
        blocking(move || this.grep_blocking(&pattern, &directory, &file_pattern)).await
    }

    /// Grep from the working directory once per file glob, merged
    pub async fn codebase_search(&self, query: &str, file_types: &[String]) -> ToolOutcome<CodebaseResult> {
        let this = self.clone();
        let query = query.to_string();
        let file_types = effective_file_types(file_types);
        blocking(move || {
            let regex = compile(&query)?;
            let (matches, total_found, truncated) = this.multi_glob_search(&regex, &file_types)?;
            tracing::info!(query = %query, total_found, "Codebase search");
            Ok(CodebaseResult {
                query,
                file_types,
                matches,
                total_found,
                truncated,
            })
        })
        .await
    }

    /// Locate declarations of `symbol` across source files
    pub async fn find_definition(&self, symbol: &str, file_types: &[String]) -> ToolOutcome<DefinitionResult> {
        if symbol.trim().is_empty() {
            return Err(ToolError::InvalidArguments("symbol must not be empty".to_string()));
        }
        let this = self.clone();
        let symbol = symbol.trim().to_string();
        let file_types = effective_file_types(file_types);
        blocking(move || {
            let regex = definition_regex(&symbol)?;
            let (matches, total_found, truncated) = this.multi_glob_search(&regex, &file_types)?;
            tracing::info!(symbol = %symbol, total_found, "Definition lookup");
            Ok(DefinitionResult {
                symbol,
                file_types,
                matches,
                total_found,
                truncated,
            })
        })
        .await
    }

    fn search_filenames_blocking(&self, pattern: &str, directory: &str) -> ToolOutcome<FileSearchResult> {
        let root = self.policy.require_path(directory)?;
        ensure_directory(&root, directory)?;
        let matcher = Pattern::new(&format!("*{}*", pattern))?;
        let needle = pattern.to_lowercase();

        let mut matches: Vec<FileMatch> = self
            .walk(&root)
            .filter(|e| e.file_type().is_file())
            .filter(|e| matcher.matches(&e.file_name().to_string_lossy()))
            .filter_map(|e| {
                let metadata = e.metadata().ok()?;
                let rel = e.path().strip_prefix(&root).unwrap_or(e.path());
                Some(FileMatch {
                    path: slash_path(rel),
                    full_path: Path::new(directory).join(rel).display().to_string(),
                    size: metadata.len(),
                    modified: metadata
                        .modified()
                        .ok()
                        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                        .map(|d| d.as_secs_f64()),
                })
            })
            .collect();

        matches.sort_by_cached_key(|m| {
            let base = m.path.rsplit('/').next().unwrap_or(&m.path).to_lowercase();
            (!base.contains(&needle), m.path.len(), m.path.to_lowercase())
        });

        let total_found = matches.len();
        let truncated = total_found > MAX_FILENAME_RESULTS;
        matches.truncate(MAX_FILENAME_RESULTS);

        tracing::info!(pattern = %pattern, directory = %directory, total_found, "Filename search");

        Ok(FileSearchResult {
            pattern: pattern.to_string(),
            directory: directory.to_string(),
            matches,
            total_found,
            truncated,
        })
    }

    fn grep_blocking(&self, pattern: &str, directory: &str, file_pattern: &str) -> ToolOutcome<GrepResult> {
        let regex = compile(pattern)?;
        let root = self.policy.require_path(directory)?;
        ensure_directory(&root, directory)?;
        let file_glob = FileGlob::new(file_pattern)?;

        let (matches, truncated) =
            self.grep_tree(&root, &regex, &file_glob, self.policy.max_output_lines());

        tracing::info!(
            pattern = %pattern,
            directory = %directory,
            found = matches.len(),
            truncated,
            "Grep search"
        );

        Ok(GrepResult {
            pattern: pattern.to_string(),
            directory: directory.to_string(),
            file_pattern: file_pattern.to_string(),
            total_found: matches.len(),
            matches,
            truncated,
        })
    }

    /// Run `regex` from `.` for each glob; dedupe by (file, line), sort, cap
    fn multi_glob_search(&self, regex: &Regex, file_types: &[String]) -> ToolOutcome<(Vec<LineMatch>, usize, bool)> {
        let root = self.policy.require_path(".")?;
        let limit = self.policy.max_output_lines();

        let mut merged: BTreeMap<(String, usize), LineMatch> = BTreeMap::new();
        let mut truncated = false;
        for file_type in file_types {
            let file_glob = FileGlob::new(file_type)?;
            let (matches, cut) = self.grep_tree(&root, regex, &file_glob, limit);
            truncated |= cut;
            for m in matches {
                merged.entry((m.file.clone(), m.line_number)).or_insert(m);
            }
        }

        let total_found = merged.len();
        truncated |= total_found > limit;
        let matches = merged.into_values().take(limit).collect();
        Ok((matches, total_found, truncated))
    }

    /// Collect up to `limit` matching lines below `root`.
    ///
    /// The flag is set only when a further match had to be dropped.
    fn grep_tree(&self, root: &Path, regex: &Regex, file_glob: &FileGlob, limit: usize) -> (Vec<LineMatch>, bool) {
        let mut matches = Vec::new();

        let files = self
            .walk(root)
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                let rel = e.path().strip_prefix(root).unwrap_or(e.path());
                file_glob.matches(rel)
            });

        for entry in files {
            match is_binary_file(entry.path()) {
                Ok(false) => {}
                Ok(true) => continue,
                Err(e) => {
                    tracing::debug!(path = %entry.path().display(), error = %e, "Skipping unreadable file");
                    continue;
                }
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if size > self.policy.max_file_size() {
                tracing::debug!(path = %entry.path().display(), size, "Skipping oversized file");
                continue;
            }
            let Ok(file) = File::open(entry.path()) else { continue };
            let rel = slash_path(entry.path().strip_prefix(root).unwrap_or(entry.path()));

            let mut reader = BufReader::new(file);
            let mut buf = Vec::new();
            let mut line_number = 0;
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(path = %entry.path().display(), error = %e, "Read failed mid-file");
                        break;
                    }
                }
                line_number += 1;

                let text = String::from_utf8_lossy(&buf);
                let line = strip_line_ending(&text);
                if !regex.is_match(line) {
                    continue;
                }
                if matches.len() >= limit {
                    return (matches, true);
                }
                matches.push(LineMatch {
                    file: rel.clone(),
                    line_number,
                    line_content: line.trim().to_string(),
                    match_positions: char_spans(regex, line),
                });
            }
        }

        (matches, false)
    }

    /// Sorted walk below `root`, skipping hidden and policy-denied entries
    fn walk(&self, root: &Path) -> impl Iterator<Item = DirEntry> {
        let policy = Arc::clone(&self.policy);
        WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| !is_hidden(e) && policy.check_path(e.path()).allowed)
            .filter_map(Result::ok)
    }
}

/// Matches a file glob against a base name, or against the relative path
/// when the glob contains a `/`
struct FileGlob {
    pattern: Pattern,
    match_path: bool,
}

impl FileGlob {
    fn new(glob: &str) -> ToolOutcome<Self> {
        let glob = if glob.trim().is_empty() { "*" } else { glob.trim() };
        Ok(Self {
            pattern: Pattern::new(glob)?,
            match_path: glob.contains('/'),
        })
    }

    fn matches(&self, rel: &Path) -> bool {
        if self.match_path {
            self.pattern.matches(&slash_path(rel))
        } else {
            rel.file_name()
                .map(|n| self.pattern.matches(&n.to_string_lossy()))
                .unwrap_or(false)
        }
    }
}

async fn blocking<T, F>(f: F) -> ToolOutcome<T>
where
    T: Send + 'static,
    F: FnOnce() -> ToolOutcome<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ToolError::ExecutionFailure(format!("Search task failed: {}", e)))?
}

fn compile(pattern: &str) -> ToolOutcome<Regex> {
    Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
}

fn definition_regex(symbol: &str) -> ToolOutcome<Regex> {
    let escaped = regex::escape(symbol);
    let keywords = DEFINITION_KEYWORDS.join("|");
    compile(&format!(
        r"\b(?:{})\s+{}\b|\b{}\s*=(?:[^=]|$)",
        keywords, escaped, escaped
    ))
}

fn effective_file_types(file_types: &[String]) -> Vec<String> {
    let given: Vec<String> = file_types
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if given.is_empty() {
        DEFAULT_FILE_TYPES.iter().map(|s| s.to_string()).collect()
    } else {
        given
    }
}

/// Byte spans from the regex, converted to character offsets
fn char_spans(regex: &Regex, line: &str) -> Vec<[usize; 2]> {
    regex
        .find_iter(line)
        .map(|m| {
            let start = line[..m.start()].chars().count();
            let len = m.as_str().chars().count();
            [start, start + len]
        })
        .collect()
}

fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}
