//! Tool definitions for the model
//!
//! This module builds the tool catalog sent to the backend, parses tool
//! calls into typed commands and executes them against the handlers.

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::config::{Config, ToolsConfig};
use crate::error::{ToolError, ToolOutcome};
use crate::security::SecurityPolicy;
use crate::tools::{Editor, FileStore, ProcessRunner, TextSearch};

/// Every tool the proxy knows, in catalog order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ReadFile,
    ListDirectory,
    DeleteFile,
    TerminalCommand,
    EditFile,
    CreateFile,
    SearchFiles,
    GrepSearch,
    CodebaseSearch,
    FindDefinition,
}

/// Feature group a tool belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    FileOperations,
    Terminal,
    EditOperations,
    Search,
}

impl ToolKind {
    pub const ALL: [ToolKind; 10] = [
        ToolKind::ReadFile,
        ToolKind::ListDirectory,
        ToolKind::DeleteFile,
        ToolKind::TerminalCommand,
        ToolKind::EditFile,
        ToolKind::CreateFile,
        ToolKind::SearchFiles,
        ToolKind::GrepSearch,
        ToolKind::CodebaseSearch,
        ToolKind::FindDefinition,
    ];

    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::ReadFile => "read_file",
            ToolKind::ListDirectory => "list_directory",
            ToolKind::DeleteFile => "delete_file",
            ToolKind::TerminalCommand => "terminal_command",
            ToolKind::EditFile => "edit_file",
            ToolKind::CreateFile => "create_file",
            ToolKind::SearchFiles => "search_files",
            ToolKind::GrepSearch => "grep_search",
            ToolKind::CodebaseSearch => "codebase_search",
            ToolKind::FindDefinition => "find_definition",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn category(&self) -> ToolCategory {
        match self {
            ToolKind::ReadFile | ToolKind::ListDirectory | ToolKind::DeleteFile => {
                ToolCategory::FileOperations
            }
            ToolKind::TerminalCommand => ToolCategory::Terminal,
            // create_file is gated with edits: it writes
            ToolKind::EditFile | ToolKind::CreateFile => ToolCategory::EditOperations,
            ToolKind::SearchFiles
            | ToolKind::GrepSearch
            | ToolKind::CodebaseSearch
            | ToolKind::FindDefinition => ToolCategory::Search,
        }
    }
}

/// Which tool groups are exposed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolFlags {
    pub file_operations: bool,
    pub terminal: bool,
    pub edit_operations: bool,
}

impl Default for ToolFlags {
    fn default() -> Self {
        Self {
            file_operations: true,
            terminal: true,
            edit_operations: true,
        }
    }
}

impl From<&ToolsConfig> for ToolFlags {
    fn from(config: &ToolsConfig) -> Self {
        Self {
            file_operations: config.enable_file_operations,
            terminal: config.enable_terminal,
            edit_operations: config.enable_edit_operations,
        }
    }
}

impl ToolFlags {
    pub fn allows(&self, category: ToolCategory) -> bool {
        match category {
            ToolCategory::FileOperations => self.file_operations,
            ToolCategory::Terminal => self.terminal,
            ToolCategory::EditOperations => self.edit_operations,
            ToolCategory::Search => true,
        }
    }
}

/// JSON-schema type of a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Boolean,
    Array,
}

impl ParamType {
    fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
        }
    }
}

/// One parameter of a tool
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub param_type: ParamType,
    pub description: &'static str,
    pub required: bool,
    pub default: Option<Value>,
    /// Element type for arrays
    pub items: Option<ParamType>,
}

impl ParamSpec {
    fn new(name: &'static str, param_type: ParamType, description: &'static str) -> Self {
        Self {
            name,
            param_type,
            description,
            required: false,
            default: None,
            items: None,
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    fn with_items(mut self, items: ParamType) -> Self {
        self.items = Some(items);
        self
    }

    fn schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".into(), json!(self.param_type.as_str()));
        schema.insert("description".into(), json!(self.description));
        if let Some(items) = self.items {
            schema.insert("items".into(), json!({ "type": items.as_str() }));
        }
        if let Some(default) = &self.default {
            schema.insert("default".into(), default.clone());
        }
        Value::Object(schema)
    }
}

/// A tool as advertised to the model
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub kind: ToolKind,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

impl ToolDescriptor {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// JSON-schema object for the parameters
    pub fn parameters(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.to_string(), p.schema()))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// OpenAI `tools[]` entry
    pub fn to_openai(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description,
                "parameters": self.parameters(),
            }
        })
    }
}

fn describe(kind: ToolKind) -> ToolDescriptor {
    use ParamType::*;

    let (description, params) = match kind {
        ToolKind::ReadFile => (
            "Read the contents of a file within your codebase",
            vec![ParamSpec::new("file_path", String, "Path to the file to read").required()],
        ),
        ToolKind::ListDirectory => (
            "Read the structure of a directory without reading file contents",
            vec![
                ParamSpec::new("directory_path", String, "Path to the directory to list").required(),
                ParamSpec::new("recursive", Boolean, "Whether to list recursively")
                    .with_default(json!(false)),
            ],
        ),
        ToolKind::DeleteFile => (
            "Delete a file from the filesystem",
            vec![ParamSpec::new("file_path", String, "Path to the file to delete").required()],
        ),
        ToolKind::TerminalCommand => (
            "Execute terminal commands and monitor output",
            vec![
                ParamSpec::new("command", String, "Command to execute in terminal").required(),
                ParamSpec::new("working_directory", String, "Working directory for command execution")
                    .with_default(json!(".")),
            ],
        ),
        ToolKind::EditFile => (
            "Edit and apply changes to files",
            vec![
                ParamSpec::new("file_path", String, "Path to the file to edit").required(),
                ParamSpec::new("content", String, "New content for the file").required(),
                ParamSpec::new("start_line", Integer, "Starting line number for partial edit"),
                ParamSpec::new("end_line", Integer, "Ending line number for partial edit"),
            ],
        ),
        ToolKind::CreateFile => (
            "Create a new file with specified content",
            vec![
                ParamSpec::new("file_path", String, "Path where the new file should be created")
                    .required(),
                ParamSpec::new("content", String, "Content for the new file").required(),
            ],
        ),
        ToolKind::SearchFiles => (
            "Find files by name using fuzzy matching",
            vec![
                ParamSpec::new("pattern", String, "Search pattern for file names").required(),
                ParamSpec::new("directory", String, "Directory to search in").with_default(json!(".")),
            ],
        ),
        ToolKind::GrepSearch => (
            "Search for exact keywords or patterns within files",
            vec![
                ParamSpec::new("pattern", String, "Pattern to search for").required(),
                ParamSpec::new("directory", String, "Directory to search in").with_default(json!(".")),
                ParamSpec::new("file_pattern", String, "File pattern to limit search")
                    .with_default(json!("*")),
            ],
        ),
        ToolKind::CodebaseSearch => (
            "Search the codebase for a text pattern across common source file types",
            vec![
                ParamSpec::new("query", String, "Search query (regular expression)").required(),
                ParamSpec::new("file_types", Array, "File globs to include in search")
                    .with_items(String),
            ],
        ),
        ToolKind::FindDefinition => (
            "Find where a function, class, type or variable is defined",
            vec![
                ParamSpec::new("symbol", String, "Name of the symbol to look up").required(),
                ParamSpec::new("file_types", Array, "File globs to include in search")
                    .with_items(String),
            ],
        ),
    };

    ToolDescriptor {
        kind,
        description,
        params,
    }
}

/// Catalog of enabled tools, in catalog order
pub fn builtin_tools(flags: &ToolFlags) -> Vec<ToolDescriptor> {
    ToolKind::ALL
        .into_iter()
        .filter(|k| flags.allows(k.category()))
        .map(describe)
        .collect()
}

fn default_dot() -> String {
    ".".to_string()
}

fn default_star() -> String {
    "*".to_string()
}

/// Accept a line number as a JSON number or a numeric string
fn deserialize_line<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| serde::de::Error::custom(format!("invalid line number: {}", n))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid line number: {:?}", s))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid line number: {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReadFileArgs {
    pub file_path: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ListDirectoryArgs {
    pub directory_path: String,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DeleteFileArgs {
    pub file_path: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TerminalCommandArgs {
    pub command: String,
    #[serde(default = "default_dot")]
    pub working_directory: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EditFileArgs {
    pub file_path: String,
    pub content: String,
    #[serde(default, deserialize_with = "deserialize_line")]
    pub start_line: Option<usize>,
    #[serde(default, deserialize_with = "deserialize_line")]
    pub end_line: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CreateFileArgs {
    pub file_path: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchFilesArgs {
    pub pattern: String,
    #[serde(default = "default_dot")]
    pub directory: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GrepSearchArgs {
    pub pattern: String,
    #[serde(default = "default_dot")]
    pub directory: String,
    #[serde(default = "default_star")]
    pub file_pattern: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CodebaseSearchArgs {
    pub query: String,
    #[serde(default)]
    pub file_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FindDefinitionArgs {
    pub symbol: String,
    #[serde(default)]
    pub file_types: Vec<String>,
}

/// A parsed tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCommand {
    ReadFile(ReadFileArgs),
    ListDirectory(ListDirectoryArgs),
    DeleteFile(DeleteFileArgs),
    TerminalCommand(TerminalCommandArgs),
    EditFile(EditFileArgs),
    CreateFile(CreateFileArgs),
    SearchFiles(SearchFilesArgs),
    GrepSearch(GrepSearchArgs),
    CodebaseSearch(CodebaseSearchArgs),
    FindDefinition(FindDefinitionArgs),
}

impl ToolCommand {
    /// Parse a tool name and its raw JSON argument text
    pub fn parse(name: &str, arguments: &str) -> ToolOutcome<Self> {
        let kind = ToolKind::from_name(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let raw = if arguments.trim().is_empty() { "{}" } else { arguments };
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| ToolError::InvalidArguments(format!("arguments are not valid JSON: {}", e)))?;
        if !value.is_object() {
            return Err(ToolError::InvalidArguments(
                "arguments must be a JSON object".to_string(),
            ));
        }

        fn args<T: serde::de::DeserializeOwned>(value: Value) -> ToolOutcome<T> {
            serde_json::from_value(value).map_err(|e| ToolError::InvalidArguments(e.to_string()))
        }

        Ok(match kind {
            ToolKind::ReadFile => ToolCommand::ReadFile(args(value)?),
            ToolKind::ListDirectory => ToolCommand::ListDirectory(args(value)?),
            ToolKind::DeleteFile => ToolCommand::DeleteFile(args(value)?),
            ToolKind::TerminalCommand => ToolCommand::TerminalCommand(args(value)?),
            ToolKind::EditFile => ToolCommand::EditFile(args(value)?),
            ToolKind::CreateFile => ToolCommand::CreateFile(args(value)?),
            ToolKind::SearchFiles => ToolCommand::SearchFiles(args(value)?),
            ToolKind::GrepSearch => ToolCommand::GrepSearch(args(value)?),
            ToolKind::CodebaseSearch => ToolCommand::CodebaseSearch(args(value)?),
            ToolKind::FindDefinition => ToolCommand::FindDefinition(args(value)?),
        })
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolCommand::ReadFile(_) => ToolKind::ReadFile,
            ToolCommand::ListDirectory(_) => ToolKind::ListDirectory,
            ToolCommand::DeleteFile(_) => ToolKind::DeleteFile,
            ToolCommand::TerminalCommand(_) => ToolKind::TerminalCommand,
            ToolCommand::EditFile(_) => ToolKind::EditFile,
            ToolCommand::CreateFile(_) => ToolKind::CreateFile,
            ToolCommand::SearchFiles(_) => ToolKind::SearchFiles,
            ToolCommand::GrepSearch(_) => ToolKind::GrepSearch,
            ToolCommand::CodebaseSearch(_) => ToolKind::CodebaseSearch,
            ToolCommand::FindDefinition(_) => ToolKind::FindDefinition,
        }
    }
}

/// Tool execution result.
///
/// Serializes flat: `{"success": true, ...payload}` or
/// `{"success": false, "error": ..., "error_kind": ...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub success: bool,
    pub payload: Map<String, Value>,
    pub error: Option<String>,
    pub error_kind: Option<&'static str>,
}

impl ToolResult {
    pub fn success(payload: impl Serialize) -> Self {
        let payload = match serde_json::to_value(payload) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                let mut map = Map::new();
                map.insert("result".into(), other);
                map
            }
            Err(e) => return Self::failure(&ToolError::ExecutionFailure(e.to_string())),
        };
        Self {
            success: true,
            payload,
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(error: &ToolError) -> Self {
        Self {
            success: false,
            payload: Map::new(),
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    pub fn from_outcome<T: Serialize>(outcome: ToolOutcome<T>) -> Self {
        match outcome {
            Ok(value) => Self::success(value),
            Err(e) => Self::failure(&e),
        }
    }

    /// JSON text attached to the tool-role message
    pub fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            json!({ "success": false, "error": e.to_string() }).to_string()
        })
    }
}

impl Serialize for ToolResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("success", &self.success)?;
        if self.success {
            for (key, value) in &self.payload {
                if key != "success" {
                    map.serialize_entry(key, value)?;
                }
            }
        } else {
            map.serialize_entry("error", &self.error)?;
            map.serialize_entry("error_kind", &self.error_kind)?;
        }
        map.end()
    }
}

/// Tool execution context: the handlers, built once at startup
#[derive(Clone)]
pub struct ToolContext {
    pub files: FileStore,
    pub editor: Editor,
    pub runner: ProcessRunner,
    pub search: TextSearch,
    flags: ToolFlags,
}

impl ToolContext {
    pub fn new(policy: Arc<SecurityPolicy>, tools: &ToolsConfig) -> Self {
        Self {
            files: FileStore::new(policy.clone()),
            editor: Editor::new(policy.clone(), tools.backup_directory.clone()),
            runner: ProcessRunner::new(policy.clone())
                .with_timeout(std::time::Duration::from_secs(tools.command_timeout_secs)),
            search: TextSearch::new(policy),
            flags: ToolFlags::from(tools),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(config.security_policy()), &config.tools)
    }

    pub fn flags(&self) -> ToolFlags {
        self.flags
    }

    /// Enabled tool descriptors
    pub fn catalog(&self) -> Vec<ToolDescriptor> {
        builtin_tools(&self.flags)
    }

    /// Enabled tools as OpenAI `tools[]` entries
    pub fn tools_json(&self) -> Vec<Value> {
        self.catalog().iter().map(ToolDescriptor::to_openai).collect()
    }

    /// Execute one tool call. Never fails: errors become a failed result.
    pub async fn execute(&self, name: &str, arguments: &str) -> ToolResult {
        let result = match ToolCommand::parse(name, arguments) {
            Ok(command) => self.run(command).await,
            Err(e) => ToolResult::failure(&e),
        };

        if result.success {
            tracing::info!(tool = %name, "Tool executed");
        } else {
            tracing::warn!(
                tool = %name,
                error = result.error.as_deref().unwrap_or_default(),
                "Tool failed"
            );
        }
        result
    }

    async fn run(&self, command: ToolCommand) -> ToolResult {
        let kind = command.kind();
        if !self.flags.allows(kind.category()) {
            return ToolResult::failure(&ToolError::AccessDenied(format!(
                "Tool '{}' is disabled",
                kind.name()
            )));
        }

        match command {
            ToolCommand::ReadFile(a) => ToolResult::from_outcome(self.files.read(&a.file_path).await),
            ToolCommand::ListDirectory(a) => {
                ToolResult::from_outcome(self.files.list(&a.directory_path, a.recursive).await)
            }
            ToolCommand::DeleteFile(a) => ToolResult::from_outcome(self.files.delete(&a.file_path).await),
            ToolCommand::CreateFile(a) => {
                ToolResult::from_outcome(self.files.create(&a.file_path, &a.content).await)
            }
            ToolCommand::EditFile(a) => ToolResult::from_outcome(
                self.editor
                    .edit(&a.file_path, &a.content, a.start_line, a.end_line)
                    .await,
            ),
            ToolCommand::TerminalCommand(a) => {
                ToolResult::from_outcome(self.runner.run(&a.command, &a.working_directory).await)
            }
            ToolCommand::SearchFiles(a) => {
                ToolResult::from_outcome(self.search.search_filenames(&a.pattern, &a.directory).await)
            }
            ToolCommand::GrepSearch(a) => ToolResult::from_outcome(
                self.search
                    .grep(&a.pattern, &a.directory, &a.file_pattern)
                    .await,
            ),
            ToolCommand::CodebaseSearch(a) => {
                ToolResult::from_outcome(self.search.codebase_search(&a.query, &a.file_types).await)
            }
            ToolCommand::FindDefinition(a) => {
                ToolResult::from_outcome(self.search.find_definition(&a.symbol, &a.file_types).await)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(flags: ToolFlags) -> Vec<&'static str> {
        builtin_tools(&flags).iter().map(|t| t.name()).collect()
    }

    fn context(temp: &TempDir, flags: ToolFlags) -> ToolContext {
        let tools = ToolsConfig {
            enable_file_operations: flags.file_operations,
            enable_terminal: flags.terminal,
            enable_edit_operations: flags.edit_operations,
            backup_directory: temp.path().join("backups"),
            ..ToolsConfig::default()
        };
        ToolContext::new(Arc::new(SecurityPolicy::permissive()), &tools)
    }

    #[test]
    fn test_catalog_order_and_flags() {
        assert_eq!(
            names(ToolFlags::default()),
            vec![
                "read_file",
                "list_directory",
                "delete_file",
                "terminal_command",
                "edit_file",
                "create_file",
                "search_files",
                "grep_search",
                "codebase_search",
                "find_definition",
            ]
        );

        let only_search = ToolFlags {
            file_operations: false,
            terminal: false,
            edit_operations: false,
        };
        assert_eq!(
            names(only_search),
            vec!["search_files", "grep_search", "codebase_search", "find_definition"]
        );
    }

    #[test]
    fn test_descriptor_schema() {
        let tool = describe(ToolKind::GrepSearch).to_openai();
        assert_eq!(tool["type"], "function");
        assert_eq!(tool["function"]["name"], "grep_search");
        let params = &tool["function"]["parameters"];
        assert_eq!(params["type"], "object");
        assert_eq!(params["required"], json!(["pattern"]));
        assert_eq!(params["properties"]["file_pattern"]["default"], "*");

        let tool = describe(ToolKind::CodebaseSearch).to_openai();
        assert_eq!(
            tool["function"]["parameters"]["properties"]["file_types"]["items"]["type"],
            "string"
        );
    }

    #[test]
    fn test_kind_round_trip_names() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ToolKind::from_name("rm_everything"), None);
    }

    #[test]
    fn test_parse_applies_defaults() {
        let command = ToolCommand::parse("grep_search", r#"{"pattern":"TODO"}"#).unwrap();
        assert_eq!(
            command,
            ToolCommand::GrepSearch(GrepSearchArgs {
                pattern: "TODO".into(),
                directory: ".".into(),
                file_pattern: "*".into(),
            })
        );
    }

    #[test]
    fn test_parse_line_numbers_as_strings() {
        let command = ToolCommand::parse(
            "edit_file",
            r#"{"file_path":"a.txt","content":"x","start_line":"2","end_line":3}"#,
        )
        .unwrap();
        match command {
            ToolCommand::EditFile(args) => {
                assert_eq!(args.start_line, Some(2));
                assert_eq!(args.end_line, Some(3));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        let err = ToolCommand::parse("nope", "{}").unwrap_err();
        assert_eq!(err.to_string(), "Unknown tool: nope");

        let err = ToolCommand::parse("read_file", "{not json").unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");

        let err = ToolCommand::parse("read_file", "[1,2]").unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");

        let err = ToolCommand::parse("read_file", "").unwrap_err();
        assert!(err.to_string().contains("file_path"));
    }

    #[test]
    fn test_result_serializes_flat() {
        let ok = ToolResult::success(json!({ "content": "hi", "size": 2 }));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({ "success": true, "content": "hi", "size": 2 })
        );

        let failed = ToolResult::failure(&ToolError::UnknownTool("x".into()));
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({ "success": false, "error": "Unknown tool: x", "error_kind": "unknown_tool" })
        );
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let temp = TempDir::new().unwrap();
        let result = context(&temp, ToolFlags::default())
            .execute("launch_rockets", "{}")
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Unknown tool: launch_rockets"));
    }

    #[tokio::test]
    async fn test_execute_disabled_tool() {
        let temp = TempDir::new().unwrap();
        let flags = ToolFlags {
            terminal: false,
            ..ToolFlags::default()
        };
        let result = context(&temp, flags)
            .execute("terminal_command", r#"{"command":"echo hi"}"#)
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some("access_denied"));
    }

    #[tokio::test]
    async fn test_execute_create_then_read() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, ToolFlags::default());
        let file = temp.path().join("made.txt").display().to_string();

        let args = json!({ "file_path": file, "content": "made\n" }).to_string();
        let created = ctx.execute("create_file", &args).await;
        assert!(created.success, "{:?}", created.error);

        let args = json!({ "file_path": file }).to_string();
        let read = ctx.execute("read_file", &args).await;
        assert!(read.success);
        assert_eq!(read.payload["content"], "made\n");
        assert_eq!(read.payload["lines"], 1);
    }
}
