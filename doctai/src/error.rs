//! Typed stage errors.
//!
//! Each pipeline stage has its own error enum. [`RunError`] wraps them for the
//! orchestrator; its `Display` text is what a [`crate::core::result::TestResult`]
//! carries as its top-level error.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while loading documentation sources.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no documentation sources were provided")]
    NoSources,

    #[error("Path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid path type: {}", .0.display())]
    InvalidPathType(PathBuf),

    #[error("Failed to read file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No documentation files found in directory: {}", .0.display())]
    NoDocumentsFound(PathBuf),

    #[error("Failed to fetch documentation from URL {url}: {message}")]
    Http { url: String, message: String },
}

/// Failures talking to a model provider, normalized across backends.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} API authentication failed. Please check your API key.")]
    Auth { provider: String },

    #[error("{provider} rate limit exceeded. Please wait and try again.")]
    RateLimit { provider: String },

    #[error(
        "{provider} API request timed out after {seconds} seconds. Try increasing --timeout."
    )]
    Timeout { provider: String, seconds: u64 },

    #[error("Unexpected response format from {provider} API: {message}")]
    MalformedResponse { provider: String, message: String },

    #[error("{provider} API error: {message}")]
    Transport { provider: String, message: String },
}

/// Stage failure that ends a run. Only one is ever recorded per run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to fetch documentation: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to generate test scripts: {0}")]
    Provider(#[from] ProviderError),

    #[error("Failed to generate test scripts: {0}")]
    Prompt(String),

    #[error("No test scripts were generated")]
    NoScriptsGenerated,

    #[error("Failed to execute scripts: {0}")]
    Execution(String),

    #[error("Run interrupted before completion")]
    Interrupted,
}
