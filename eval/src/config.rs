//! doctai settings for a case.
//!
//! Starts from the doctai config discovered at the repo root and applies the
//! case's model overrides.

use std::path::Path;

use anyhow::{Context, Result};
use doctai::io::config::{FileConfig, Overrides, Settings, load_config};
use doctai::io::provider::ProviderKind;

use crate::case::CaseFile;

/// Apply case overrides on top of the repo's doctai config file.
pub fn settings_for_case(
    repo_root: &Path,
    case_dir: &Path,
    case: &CaseFile,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Settings> {
    let file = load_config(None, repo_root).context("load doctai config")?;
    apply_case_config(file, case_dir, case, lookup)
}

pub fn apply_case_config(
    file: FileConfig,
    case_dir: &Path,
    case: &CaseFile,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Settings> {
    let overrides = Overrides {
        docs: case.resolved_docs(case_dir),
        provider: case.config.provider.as_deref().map(ProviderKind::from_name),
        model: case.config.model.clone(),
        instructions: case.config.instructions.clone(),
        ..Overrides::default()
    };
    let settings = Settings::resolve(file, overrides, lookup);
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(provider: Option<&str>, model: Option<&str>) -> CaseFile {
        let mut input = String::from(
            "[case]\nid = \"demo\"\ndocs = [\"demo/README.md\"]\ngolden = \"demo/golden.sh\"\n[config]\n",
        );
        if let Some(provider) = provider {
            input.push_str(&format!("provider = \"{provider}\"\n"));
        }
        if let Some(model) = model {
            input.push_str(&format!("model = \"{model}\"\n"));
        }
        toml::from_str(&input).expect("case")
    }

    fn with_key(name: &str) -> Option<String> {
        (name == "DOCTAI_API_KEY").then(|| "secret".to_string())
    }

    #[test]
    fn case_overrides_provider_and_model() {
        let settings = apply_case_config(
            FileConfig::default(),
            Path::new("/cases"),
            &case(Some("anthropic"), Some("claude-x")),
            &with_key,
        )
        .expect("settings");
        assert_eq!(settings.provider, ProviderKind::Anthropic);
        assert_eq!(settings.model.as_deref(), Some("claude-x"));
        assert_eq!(settings.docs, vec!["/cases/demo/README.md"]);
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let err = apply_case_config(
            FileConfig::default(),
            Path::new("/cases"),
            &case(None, None),
            &|_| None,
        )
        .expect_err("no key");
        assert!(err.to_string().contains("API key"));
    }
}
