//! Agent module - model backend access and the tool-calling round

pub mod llm;
pub mod tool_loop;
pub mod tools;
