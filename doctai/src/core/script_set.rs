//! Ordering and naming of classified candidates.

use crate::core::classifier::classify;
use crate::core::fence::extract_candidates;
use crate::core::types::{ScriptCandidate, ScriptDecision, ScriptEntry, ScriptSet, ScriptType};

/// Stable name for a candidate: `script_<ordinal>_<type>`.
pub fn script_name(ordinal: usize, script_type: &ScriptType) -> String {
    format!("script_{ordinal}_{script_type}")
}

/// A candidate paired with the decision it received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedCandidate {
    pub candidate: ScriptCandidate,
    pub decision: ScriptDecision,
}

pub fn classify_all(candidates: Vec<ScriptCandidate>) -> Vec<ClassifiedCandidate> {
    candidates
        .into_iter()
        .map(|candidate| {
            let decision = classify(&candidate);
            ClassifiedCandidate {
                candidate,
                decision,
            }
        })
        .collect()
}

/// Normal scripts in original order, then cleanup scripts in original order.
/// Rejected candidates are dropped. Content is trimmed of surrounding whitespace.
pub fn build_script_set(classified: &[ClassifiedCandidate]) -> ScriptSet {
    let normal = classified
        .iter()
        .filter(|item| item.decision == ScriptDecision::Normal);
    let cleanup = classified
        .iter()
        .filter(|item| item.decision == ScriptDecision::Cleanup);

    normal
        .chain(cleanup)
        .map(|item| {
            let candidate = &item.candidate;
            (
                script_name(candidate.ordinal, &candidate.script_type),
                ScriptEntry {
                    content: candidate.raw_content.trim().to_string(),
                    script_type: candidate.script_type.clone(),
                },
            )
        })
        .collect()
}

/// Full parser pipeline: extract, classify, order.
pub fn parse_response(response: &str) -> ScriptSet {
    build_script_set(&classify_all(extract_candidates(response)))
}
