//! Documentation tester: an LLM turns documentation into scripts, which are
//! then executed to check that the documentation actually works.
//!
//! The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (fence extraction, script
//!   classification, ordering, result aggregation). No I/O.
//! - **[`io`]**: Side-effecting adapters (documentation loading, model
//!   providers, script execution, config files, reports).
//!
//! [`orchestrator`] coordinates both to implement one test run.

pub mod cancel;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
