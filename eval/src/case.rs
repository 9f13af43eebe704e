//! Case file parsing and validation.
//!
//! Cases are TOML files naming documentation sources and a golden script
//! known to cover them correctly. See `eval/cases/` for examples.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

use doctai::io::fetcher::is_url;

/// A parsed case file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CaseFile {
    pub case: CaseMeta,
    #[serde(default)]
    pub config: CaseConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CaseMeta {
    /// Unique identifier (slug format: `[a-z0-9_-]+`).
    pub id: String,
    /// Documentation files, directories or URLs. Relative paths resolve
    /// against the case file's directory.
    pub docs: Vec<String>,
    /// Reference script the generated scripts are compared against.
    pub golden: PathBuf,
}

/// Model overrides for the case; unset values come from the doctai config.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CaseConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub instructions: Option<String>,
}

impl CaseFile {
    /// Load and validate a case file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read case {}", path.display()))?;
        let case: CaseFile =
            toml::from_str(&contents).with_context(|| format!("parse case {}", path.display()))?;
        case.validate()
            .with_context(|| format!("validate case {}", path.display()))?;
        Ok(case)
    }

    #[cfg(test)]
    pub fn parse_str(contents: &str) -> Result<Self> {
        let case: CaseFile = toml::from_str(contents).context("parse case")?;
        case.validate()?;
        Ok(case)
    }

    /// Documentation sources with local paths anchored at `base_dir`.
    pub fn resolved_docs(&self, base_dir: &Path) -> Vec<String> {
        self.case
            .docs
            .iter()
            .map(|source| {
                if is_url(source) || Path::new(source).is_absolute() {
                    source.clone()
                } else {
                    base_dir.join(source).display().to_string()
                }
            })
            .collect()
    }

    pub fn golden_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.case.golden)
    }

    fn validate(&self) -> Result<()> {
        validate_case_id(&self.case.id)?;
        if self.case.docs.is_empty() {
            bail!("case.docs must be a non-empty array");
        }
        if self.case.docs.iter().any(|doc| doc.trim().is_empty()) {
            bail!("case.docs entries must be non-empty");
        }
        if self.case.golden.as_os_str().is_empty() {
            bail!("case.golden must be non-empty");
        }
        if let Some(model) = &self.config.model
            && model.trim().is_empty()
        {
            bail!("config.model must be non-empty when set");
        }
        Ok(())
    }
}

/// Discover and load all case files from a directory.
///
/// Returns cases sorted by id. Errors if duplicate ids are found.
pub fn discover_cases(dir: &Path) -> Result<Vec<CaseFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut cases = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read cases dir {}", dir.display()))? {
        let entry = entry.context("read case entry")?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        cases.push(CaseFile::load(&path)?);
    }
    cases.sort_by(|left, right| left.case.id.cmp(&right.case.id));
    for pair in cases.windows(2) {
        if pair[0].case.id == pair[1].case.id {
            return Err(anyhow!("duplicate case.id {}", pair[0].case.id));
        }
    }
    Ok(cases)
}

pub fn validate_case_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        bail!("case.id must be non-empty");
    }
    if id.contains('/') || id.contains('\\') {
        bail!("case.id must not contain path separators");
    }
    if id.contains("..") {
        bail!("case.id must not contain '..'");
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        bail!("case.id must use [a-z0-9_-] only");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_case() {
        let input = r#"
[case]
id = "flask-api"
docs = ["flask-api/README.md"]
golden = "flask-api/golden_script.sh"

[config]
provider = "anthropic"
instructions = "Do not start long-running servers in the foreground."
"#;
        let case = CaseFile::parse_str(input).expect("case parses");
        assert_eq!(case.case.id, "flask-api");
        assert_eq!(case.config.provider.as_deref(), Some("anthropic"));
        assert!(case.config.model.is_none());
    }

    #[test]
    fn rejects_invalid_id() {
        let input = r#"
[case]
id = "bad/id"
docs = ["README.md"]
golden = "golden.sh"
"#;
        let err = CaseFile::parse_str(input).expect_err("invalid id");
        assert!(err.to_string().contains("case.id"));
    }

    #[test]
    fn rejects_empty_docs() {
        let input = r#"
[case]
id = "empty"
docs = []
golden = "golden.sh"
"#;
        let err = CaseFile::parse_str(input).expect_err("empty docs");
        assert!(err.to_string().contains("case.docs"));
    }

    #[test]
    fn resolves_relative_docs_only() {
        let input = r#"
[case]
id = "mixed"
docs = ["project/README.md", "https://example.com/guide.md", "/abs/README.md"]
golden = "project/golden.sh"
"#;
        let case = CaseFile::parse_str(input).expect("case parses");
        let docs = case.resolved_docs(Path::new("/cases"));
        assert_eq!(
            docs,
            vec![
                "/cases/project/README.md",
                "https://example.com/guide.md",
                "/abs/README.md"
            ]
        );
        assert_eq!(
            case.golden_path(Path::new("/cases")),
            PathBuf::from("/cases/project/golden.sh")
        );
    }
}
