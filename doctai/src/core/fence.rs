//! Fenced code block extraction from free-form model output.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::ScriptCandidate;

/// Opening fence with a language token on its own line, then a non-greedy body
/// up to the next closing fence.
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(\w+)[ \t]*\r?\n(.*?)```").expect("fence regex should be valid")
});

/// Extract every fenced block that declares a language, in order of appearance.
///
/// Blocks without a language token are not candidates and do not consume an
/// ordinal. Ordinals start at 1.
pub fn extract_candidates(response: &str) -> Vec<ScriptCandidate> {
    FENCE_RE
        .captures_iter(response)
        .enumerate()
        .map(|(index, caps)| {
            let language = caps.get(1).map_or("", |m| m.as_str());
            let body = caps.get(2).map_or("", |m| m.as_str());
            ScriptCandidate::new(index + 1, language, body)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ScriptType;

    #[test]
    fn no_fences_yields_nothing() {
        assert!(extract_candidates("").is_empty());
        assert!(extract_candidates("The docs look fine, nothing to run.").is_empty());
    }

    #[test]
    fn extracts_blocks_in_order_with_ordinals() {
        let response = "Intro\n\n```bash\n#!/bin/bash\necho hi\n```\n\nthen\n\n```python\nprint('x')\n```\n";
        let candidates = extract_candidates(response);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].ordinal, 1);
        assert_eq!(candidates[0].declared_language, "bash");
        assert_eq!(candidates[0].raw_content, "#!/bin/bash\necho hi\n");
        assert_eq!(candidates[1].ordinal, 2);
        assert_eq!(candidates[1].script_type, ScriptType::Python);
    }

    #[test]
    fn fences_without_language_are_skipped() {
        let response = "```\nplain text\n```\n\n```sh\nls\n```\n";
        let candidates = extract_candidates(response);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].ordinal, 1);
        assert_eq!(candidates[0].script_type, ScriptType::Bash);
        assert_eq!(candidates[0].raw_content, "ls\n");
    }

    #[test]
    fn tolerates_trailing_spaces_and_crlf_after_language() {
        let response = "```bash  \r\necho hi\r\n```";
        let candidates = extract_candidates(response);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].raw_content, "echo hi\r\n");
    }

    #[test]
    fn unterminated_fence_is_not_a_candidate() {
        let response = "```bash\necho never closed\n";
        assert!(extract_candidates(response).is_empty());
    }
}
