use serde::{Deserialize, Serialize};

use crate::judge::Verdict;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Adequate,
    Inadequate,
    Error,
}

/// No verdict (generation failed or the reply was unparseable) is an error.
pub fn classify_outcome(verdict: Option<&Verdict>) -> Outcome {
    match verdict {
        Some(verdict) if verdict.adequate => Outcome::Adequate,
        Some(_) => Outcome::Inadequate,
        None => Outcome::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(adequate: bool) -> Verdict {
        Verdict {
            adequate,
            reason: String::new(),
            missing: Vec::new(),
        }
    }

    #[test]
    fn adequate_and_inadequate() {
        assert_eq!(classify_outcome(Some(&verdict(true))), Outcome::Adequate);
        assert_eq!(classify_outcome(Some(&verdict(false))), Outcome::Inadequate);
    }

    #[test]
    fn error_without_verdict() {
        assert_eq!(classify_outcome(None), Outcome::Error);
    }
}
