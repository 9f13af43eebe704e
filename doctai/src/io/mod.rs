//! I/O adapters used by the orchestrator and the CLI.

pub mod config;
pub mod fetcher;
pub mod process;
pub mod prompt;
pub mod provider;
pub mod report;
pub mod script_runner;
