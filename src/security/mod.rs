//! Security module
//!
//! Path and command access control shared by every tool handler.

pub mod policy;

pub use policy::{resolve_path, PolicyVerdict, SecurityPolicy};
