//! Per-script outcomes and the aggregate run result.

use serde::Serialize;

use crate::core::types::ScriptSet;

/// Captured stdout/stderr kept per outcome, in characters.
pub const DETAIL_OUTPUT_LIMIT_CHARS: usize = 1000;

/// Keep at most `limit` leading characters, never splitting a code point.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    #[serde(rename = "script")]
    pub name: String,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionOutcome {
    pub fn new(name: impl Into<String>, success: bool, stdout: &str, stderr: &str) -> Self {
        Self {
            name: name.into(),
            success,
            stdout: truncate_chars(stdout, DETAIL_OUTPUT_LIMIT_CHARS),
            stderr: truncate_chars(stderr, DETAIL_OUTPUT_LIMIT_CHARS),
        }
    }
}

/// Raw material for a [`TestResult`]. Counts are derived, never supplied.
#[derive(Debug, Clone, Default)]
pub struct RunRecord {
    pub documentation_sources: Vec<String>,
    pub documentation_count: usize,
    pub scripts: ScriptSet,
    pub details: Vec<ExecutionOutcome>,
    pub error: Option<String>,
}

/// Aggregate report for one run.
///
/// Built once from a [`RunRecord`]; every count and the `success` flag are
/// derived from the record, so they cannot disagree with `details`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResult {
    success: bool,
    documentation_sources: Vec<String>,
    documentation_count: usize,
    scripts_generated: usize,
    scripts_executed: usize,
    scripts_passed: usize,
    scripts_failed: usize,
    scripts: ScriptSet,
    details: Vec<ExecutionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl TestResult {
    pub fn from_record(record: RunRecord) -> Self {
        let scripts_executed = record.details.len();
        let scripts_passed = record.details.iter().filter(|d| d.success).count();
        let scripts_failed = scripts_executed - scripts_passed;
        Self {
            success: scripts_executed > 0 && scripts_failed == 0,
            documentation_sources: record.documentation_sources,
            documentation_count: record.documentation_count,
            scripts_generated: record.scripts.len(),
            scripts_executed,
            scripts_passed,
            scripts_failed,
            scripts: record.scripts,
            details: record.details,
            error: record.error,
        }
    }

    /// Stage failure before any document was loaded or script produced.
    pub fn failed_early(documentation_sources: Vec<String>, error: impl ToString) -> Self {
        Self::from_record(RunRecord {
            documentation_sources,
            error: Some(error.to_string()),
            ..RunRecord::default()
        })
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn documentation_sources(&self) -> &[String] {
        &self.documentation_sources
    }

    pub fn documentation_count(&self) -> usize {
        self.documentation_count
    }

    pub fn scripts_generated(&self) -> usize {
        self.scripts_generated
    }

    pub fn scripts_executed(&self) -> usize {
        self.scripts_executed
    }

    pub fn scripts_passed(&self) -> usize {
        self.scripts_passed
    }

    pub fn scripts_failed(&self) -> usize {
        self.scripts_failed
    }

    pub fn scripts(&self) -> &ScriptSet {
        &self.scripts
    }

    pub fn details(&self) -> &[ExecutionOutcome] {
        &self.details
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
