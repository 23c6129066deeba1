//! Tools module
//!
//! Capability handlers. Each one takes the shared [`SecurityPolicy`] and
//! checks it before doing any I/O.
//!
//! [`SecurityPolicy`]: crate::security::SecurityPolicy

pub mod editor;
pub mod filesystem;
pub mod search;
pub mod shell;

pub use editor::{EditOutcome, Editor};
pub use filesystem::{DirectoryListing, FileChange, FileContent, FileStore};
pub use search::{CodebaseResult, DefinitionResult, FileSearchResult, GrepResult, LineMatch, TextSearch};
pub use shell::{CommandOutput, ProcessRunner};
