//! Report output: JSON file and the human-readable summary.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::result::TestResult;

const RULE_WIDTH: usize = 80;

/// Write the report as pretty JSON with a trailing newline.
pub fn write_report(path: &Path, result: &TestResult) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create report dir {}", parent.display()))?;
    }
    let mut buf = serde_json::to_string_pretty(result).context("serialize report")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write report {}", path.display()))
}

pub fn render_summary(result: &TestResult) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "TEST RESULTS SUMMARY");
    let _ = writeln!(out, "{rule}\n");
    let _ = writeln!(out, "Documentation sources: {}", result.documentation_count());
    let _ = writeln!(out, "Scripts generated: {}", result.scripts_generated());
    let _ = writeln!(out, "Scripts executed: {}", result.scripts_executed());
    let _ = writeln!(out, "Scripts passed: {} ✓", result.scripts_passed());
    let _ = writeln!(out, "Scripts failed: {} ✗", result.scripts_failed());
    if let Some(error) = result.error() {
        let _ = writeln!(out, "\nError: {error}");
    }
    let verdict = if result.success() {
        "✓ SUCCESS"
    } else {
        "✗ FAILURE"
    };
    let _ = writeln!(out, "\nOverall result: {verdict}");
    let _ = writeln!(out, "{rule}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::result::{ExecutionOutcome, RunRecord};
    use crate::core::types::{ScriptEntry, ScriptSet, ScriptType};

    fn passing() -> TestResult {
        let scripts: ScriptSet = std::iter::once((
            "script_1_bash".to_string(),
            ScriptEntry {
                content: "echo hi".to_string(),
                script_type: ScriptType::Bash,
            },
        ))
        .collect();
        TestResult::from_record(RunRecord {
            documentation_sources: vec!["README.md".to_string()],
            documentation_count: 1,
            scripts,
            details: vec![ExecutionOutcome::new("script_1_bash", true, "hi\n", "")],
            error: None,
        })
    }

    #[test]
    fn summary_lists_counts_and_verdict() {
        let summary = render_summary(&passing());
        assert!(summary.contains("Scripts executed: 1"));
        assert!(summary.contains("Scripts passed: 1 ✓"));
        assert!(summary.contains("Overall result: ✓ SUCCESS"));
        assert!(!summary.contains("Error:"));
    }

    #[test]
    fn summary_shows_error() {
        let failed = TestResult::failed_early(Vec::new(), "No test scripts were generated");
        let summary = render_summary(&failed);
        assert!(summary.contains("Error: No test scripts were generated"));
        assert!(summary.contains("✗ FAILURE"));
    }

    #[test]
    fn report_is_pretty_json_with_newline() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("out/report.json");
        write_report(&path, &passing()).expect("write");

        let contents = fs::read_to_string(&path).expect("read");
        assert!(contents.ends_with("}\n"));
        let value: serde_json::Value = serde_json::from_str(&contents).expect("json");
        assert_eq!(value["scripts_passed"], 1);
        assert_eq!(value["documentation_sources"][0], "README.md");
    }
}
