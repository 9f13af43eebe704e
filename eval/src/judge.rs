//! Golden-script comparison: prompt construction and verdict parsing.
//!
//! The model is asked to compare the generated scripts with the golden script
//! and answer in a fixed three-line format.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use doctai::core::types::ScriptSet;

/// The model's assessment of one generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verdict {
    pub adequate: bool,
    pub reason: String,
    /// Critical steps the generated scripts left out.
    pub missing: Vec<String>,
}

/// Join every generated script body, in execution order.
pub fn combine_scripts(scripts: &ScriptSet) -> Option<String> {
    if scripts.is_empty() {
        return None;
    }
    let bodies: Vec<&str> = scripts.iter().map(|(_, entry)| entry.content.as_str()).collect();
    Some(bodies.join("\n\n"))
}

pub fn comparison_prompt(generated: &str, golden: &str) -> String {
    format!(
        r#"You are a code review expert. I have two scripts:

1. GOLDEN SCRIPT (known to be correct):
```bash
{golden}
```

2. GENERATED SCRIPT (from AI analyzing documentation):
```bash
{generated}
```

Compare these scripts and determine if the GENERATED script is adequate.

The GENERATED script is adequate if it:
- Covers all critical installation steps from the GOLDEN script
- Doesn't skip any essential dependencies
- Tests/verifies the functionality properly
- Has proper error handling (if golden script has it)

The GENERATED script can:
- Have different formatting or style
- Use different approaches (as long as they work)
- Have additional helpful steps
- Be more verbose or concise

Respond in this EXACT format:
ADEQUATE: YES or NO
REASON: <one-line explanation>
MISSING: <comma-separated list of critical missing steps, or "none">
"#
    )
}

/// Parse the three-line verdict. A reply without an `ADEQUATE:` line is an error.
pub fn parse_verdict(response: &str) -> Result<Verdict> {
    let mut adequate = None;
    let mut reason = String::new();
    let mut missing = Vec::new();

    for line in response.lines().map(strip_emphasis) {
        if let Some(rest) = line.strip_prefix("ADEQUATE:") {
            adequate = Some(rest.to_uppercase().contains("YES"));
        } else if let Some(rest) = line.strip_prefix("REASON:") {
            reason = strip_emphasis(rest).to_string();
        } else if let Some(rest) = line.strip_prefix("MISSING:") {
            let rest = strip_emphasis(rest);
            if !rest.eq_ignore_ascii_case("none") {
                missing = rest
                    .split(',')
                    .map(str::trim)
                    .filter(|step| !step.is_empty())
                    .map(str::to_string)
                    .collect();
            }
        }
    }

    let Some(adequate) = adequate else {
        bail!("verdict has no ADEQUATE line");
    };
    Ok(Verdict {
        adequate,
        reason,
        missing,
    })
}

/// Models often bold the labels, e.g. `**ADEQUATE:** YES`.
fn strip_emphasis(text: &str) -> &str {
    text.trim().trim_matches('*').trim()
}

pub fn write_verdict(path: &Path, verdict: &Verdict) -> Result<()> {
    let contents = serde_json::to_string_pretty(verdict).context("serialize verdict")?;
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
