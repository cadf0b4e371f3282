//! CLI module: argument parsing, interactive prompts and output formatting.

pub mod args;
pub mod output;
pub mod prompt;
