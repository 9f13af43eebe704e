//! Candidate classification: drop non-executable and runner blocks, spot cleanup.

use crate::core::types::{ScriptCandidate, ScriptDecision, ScriptType};

/// Languages that describe data or prose rather than something to execute.
pub const NON_EXECUTABLE_LANGUAGES: &[&str] = &[
    "json", "yaml", "yml", "toml", "xml", "html", "css", "markdown", "md", "txt",
];

/// Phrases that mark a script as teardown.
pub const CLEANUP_INDICATORS: &[&str] = &[
    "cleanup",
    "clean up",
    "remove",
    "rm -rf",
    "delete",
    "tear down",
    "teardown",
];

/// Output statements that, together with an indicator, confirm a cleanup script.
pub const OUTPUT_MARKERS: &[&str] = &["echo"];

/// Only this many leading characters are searched for a cleanup indicator.
pub const CLEANUP_WINDOW_CHARS: usize = 200;

const RUNNER_MAX_LINES: usize = 2;

pub fn is_non_executable(script_type: &ScriptType) -> bool {
    match script_type {
        ScriptType::Other(name) => NON_EXECUTABLE_LANGUAGES.contains(&name.as_str()),
        ScriptType::Bash | ScriptType::Python => false,
    }
}

/// True when the block only marks and launches a sibling `.sh` file.
///
/// At most two meaningful lines (non-blank, not `#` comments), one of which
/// either runs `chmod` on a `.sh` path or starts with `./` and names a `.sh` path.
pub fn is_runner_script(content: &str) -> bool {
    let meaningful: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();

    meaningful.len() <= RUNNER_MAX_LINES && meaningful.iter().any(|line| launches_shell_file(line))
}

fn launches_shell_file(line: &str) -> bool {
    line.contains(".sh") && (line.contains("chmod") || line.starts_with("./"))
}

/// True when an indicator sits in the leading window and is confirmed either by
/// an output statement anywhere in the script or by a `#indicator` /
/// `# indicator` comment anywhere in the body, inline comments included.
pub fn is_cleanup_script(content: &str) -> bool {
    let lowered = content.to_lowercase();
    let window: String = lowered.chars().take(CLEANUP_WINDOW_CHARS).collect();
    let has_output = OUTPUT_MARKERS.iter().any(|marker| lowered.contains(marker));

    CLEANUP_INDICATORS.iter().any(|indicator| {
        window.contains(indicator) && (has_output || has_indicator_comment(&lowered, indicator))
    })
}

fn has_indicator_comment(lowered: &str, indicator: &str) -> bool {
    lowered.contains(&format!("# {indicator}")) || lowered.contains(&format!("#{indicator}"))
}

/// Assign exactly one decision. Earlier rules win.
pub fn classify(candidate: &ScriptCandidate) -> ScriptDecision {
    if is_non_executable(&candidate.script_type) {
        ScriptDecision::RejectedNonExecutable
    } else if is_runner_script(&candidate.raw_content) {
        ScriptDecision::RejectedRunner
    } else if is_cleanup_script(&candidate.raw_content) {
        ScriptDecision::Cleanup
    } else {
        ScriptDecision::Normal
    }
}
