//! CLI subcommand implementations for the `shareview` binary.

pub mod cache_cmd;
pub mod discover_cmd;
pub mod doctor;
pub mod fetch_cmd;
pub mod output;
