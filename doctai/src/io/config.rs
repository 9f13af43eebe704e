//! Configuration file discovery, parsing and merging with command-line values.
//!
//! Files are YAML, JSON or TOML, chosen by extension. Keys accept the aliases
//! older config files used. Command-line values win over the file, and the
//! file wins over built-in defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::io::provider::{DEFAULT_PROVIDER_TIMEOUT, ProviderKind};
use crate::io::script_runner::{DEFAULT_OUTPUT_LIMIT_BYTES, DEFAULT_SCRIPT_TIMEOUT};

/// Searched in order in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    ".doctai.yml",
    ".doctai.yaml",
    ".doctai.json",
    ".doctai.toml",
    "doctai.yml",
    "doctai.yaml",
    "doctai.json",
    "doctai.toml",
];

pub const DEFAULT_API_KEY_ENV: &str = "DOCTAI_API_KEY";
pub const API_KEY_ENV_OVERRIDE: &str = "DOCTAI_API_KEY_ENV_VAR";
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// A string, or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    /// Lists pass through. A single string splits on commas when it has one,
    /// otherwise on whitespace.
    pub fn into_sources(self) -> Vec<String> {
        let items = match self {
            Self::Many(items) => items,
            Self::One(text) if text.contains(',') => {
                text.split(',').map(str::to_string).collect()
            }
            Self::One(text) => text.split_whitespace().map(str::to_string).collect(),
        };
        items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    }

    /// Lists are joined with newlines.
    pub fn into_text(self) -> String {
        match self {
            Self::One(text) => text,
            Self::Many(items) => items.join("\n"),
        }
    }
}

/// A bool, or a truthy string (`true`, `yes`, `1`, `on`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BoolLike {
    Bool(bool),
    Text(String),
}

impl BoolLike {
    pub fn value(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Text(text) => matches!(
                text.trim().to_lowercase().as_str(),
                "true" | "yes" | "1" | "on"
            ),
        }
    }
}

/// An integer, or a string holding one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IntLike {
    Int(u64),
    Text(String),
}

impl IntLike {
    pub fn value(&self) -> Option<u64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// Scalar environment value; numbers and bools are stringified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl EnvValue {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Int(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Bool(value) => value.to_string(),
        }
    }
}

/// Raw configuration file contents. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    #[serde(alias = "documentation", alias = "sources", alias = "files")]
    pub docs: Option<StringOrList>,
    #[serde(alias = "ai_provider")]
    pub provider: Option<String>,
    #[serde(alias = "ai_model")]
    pub model: Option<String>,
    #[serde(alias = "api-url")]
    pub api_url: Option<String>,
    #[serde(alias = "work-dir")]
    pub work_dir: Option<PathBuf>,
    #[serde(alias = "stop-on-failure")]
    pub stop_on_failure: Option<BoolLike>,
    #[serde(alias = "max-iterations")]
    pub max_iterations: Option<IntLike>,
    pub timeout: Option<IntLike>,
    #[serde(alias = "script-timeout")]
    pub script_timeout: Option<IntLike>,
    #[serde(
        alias = "custom_instructions",
        alias = "additional_instructions",
        alias = "notes"
    )]
    pub instructions: Option<StringOrList>,
    #[serde(alias = "api_key_env", alias = "api_key_var")]
    pub api_key_env_var: Option<String>,
    #[serde(alias = "save-scripts")]
    pub save_scripts: Option<BoolLike>,
    #[serde(alias = "scripts-dir")]
    pub scripts_dir: Option<PathBuf>,
    pub env: BTreeMap<String, EnvValue>,
    #[serde(alias = "output-limit-bytes")]
    pub output_limit_bytes: Option<IntLike>,
}

/// First default config file present in `dir`.
pub fn discover_config(dir: &Path) -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Parse a config file, picking the format from its extension.
pub fn load_config_file(path: &Path) -> Result<FileConfig> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to load config file {}", path.display()))?;

    let parsed: Option<FileConfig> = match extension.as_str() {
        "yml" | "yaml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("parse yaml config {}", path.display()))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("parse json config {}", path.display()))?,
        "toml" => Some(
            toml::from_str(&contents)
                .with_context(|| format!("parse toml config {}", path.display()))?,
        ),
        other => bail!("Unsupported config file format: .{other}"),
    };
    Ok(parsed.unwrap_or_default())
}

/// Load the explicit config, or the first default file in `search_dir`.
///
/// A missing explicit path is an error; no default file yields an empty config.
pub fn load_config(explicit: Option<&Path>, search_dir: &Path) -> Result<FileConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(anyhow!("Config file not found: {}", path.display()));
            }
            path.to_path_buf()
        }
        None => match discover_config(search_dir) {
            Some(path) => path,
            None => {
                debug!(dir = %search_dir.display(), "no config file found");
                return Ok(FileConfig::default());
            }
        },
    };
    info!(path = %path.display(), "loading config file");
    load_config_file(&path)
}

/// Values supplied on the command line (or through `DOCTAI_*` variables).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub docs: Vec<String>,
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub work_dir: Option<PathBuf>,
    pub stop_on_failure: bool,
    pub max_iterations: Option<u32>,
    pub timeout: Option<u64>,
    pub script_timeout: Option<u64>,
    pub instructions: Option<String>,
    pub no_save_scripts: bool,
    pub scripts_dir: Option<PathBuf>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub docs: Vec<String>,
    pub provider: ProviderKind,
    pub model: Option<String>,
    pub api_url: Option<String>,
    pub api_key: String,
    pub work_dir: Option<PathBuf>,
    pub stop_on_failure: bool,
    pub max_iterations: u32,
    pub timeout: Duration,
    pub script_timeout: Duration,
    pub instructions: Option<String>,
    pub save_scripts: bool,
    pub scripts_dir: PathBuf,
    pub env: BTreeMap<String, String>,
    pub output_limit_bytes: usize,
}

fn int_setting(name: &str, value: Option<&IntLike>) -> Option<u64> {
    let raw = value?;
    let parsed = raw.value();
    if parsed.is_none() {
        warn!(key = name, value = ?raw, "ignoring non-numeric config value");
    }
    parsed
}

/// Pick the API key: explicit value first, then the variable named by
/// `DOCTAI_API_KEY_ENV_VAR` or the config file, then `DOCTAI_API_KEY`.
pub fn resolve_api_key(
    explicit: Option<&str>,
    config_env_var: Option<&str>,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Option<String> {
    if let Some(key) = explicit.filter(|key| !key.is_empty()) {
        return Some(key.to_string());
    }
    let var_name = lookup(API_KEY_ENV_OVERRIDE)
        .filter(|name| !name.is_empty())
        .or_else(|| config_env_var.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string());
    if let Some(key) = lookup(&var_name).filter(|key| !key.is_empty()) {
        info!(var = %var_name, "using API key from environment variable");
        return Some(key);
    }
    lookup(DEFAULT_API_KEY_ENV).filter(|key| !key.is_empty())
}

impl Settings {
    /// Merge command-line values over the file over defaults. `lookup` reads
    /// environment variables.
    pub fn resolve(
        file: FileConfig,
        overrides: Overrides,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Self {
        let docs = if overrides.docs.is_empty() {
            file.docs.map(StringOrList::into_sources).unwrap_or_default()
        } else {
            overrides.docs
        };
        let provider = overrides
            .provider
            .or_else(|| file.provider.as_deref().map(ProviderKind::from_name))
            .unwrap_or(ProviderKind::Openai);
        let api_key = resolve_api_key(
            overrides.api_key.as_deref(),
            file.api_key_env_var.as_deref(),
            lookup,
        )
        .unwrap_or_default();

        let max_iterations = overrides.max_iterations.map(u64::from).or_else(|| {
            int_setting("max_iterations", file.max_iterations.as_ref())
        });
        let timeout = overrides
            .timeout
            .or_else(|| int_setting("timeout", file.timeout.as_ref()))
            .map_or(DEFAULT_PROVIDER_TIMEOUT, Duration::from_secs);
        let script_timeout = overrides
            .script_timeout
            .or_else(|| int_setting("script_timeout", file.script_timeout.as_ref()))
            .map_or(DEFAULT_SCRIPT_TIMEOUT, Duration::from_secs);
        let output_limit_bytes = int_setting("output_limit_bytes", file.output_limit_bytes.as_ref())
            .and_then(|value| usize::try_from(value).ok())
            .unwrap_or(DEFAULT_OUTPUT_LIMIT_BYTES);

        let stop_on_failure = overrides.stop_on_failure
            || file.stop_on_failure.as_ref().is_some_and(BoolLike::value);
        let save_scripts = !overrides.no_save_scripts
            && file.save_scripts.as_ref().is_none_or(BoolLike::value);

        Self {
            docs,
            provider,
            model: overrides.model.or(file.model),
            api_url: overrides.api_url.or(file.api_url),
            api_key,
            work_dir: overrides.work_dir.or(file.work_dir),
            stop_on_failure,
            max_iterations: max_iterations
                .map_or(DEFAULT_MAX_ITERATIONS, |value| {
                    u32::try_from(value).unwrap_or(u32::MAX)
                }),
            timeout,
            script_timeout,
            instructions: overrides
                .instructions
                .or_else(|| file.instructions.map(StringOrList::into_text))
                .filter(|text| !text.trim().is_empty()),
            save_scripts,
            scripts_dir: overrides
                .scripts_dir
                .or(file.scripts_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            env: file
                .env
                .into_iter()
                .map(|(key, value)| (key, value.into_string()))
                .collect(),
            output_limit_bytes,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.docs.is_empty() {
            bail!("no documentation sources given (use --docs or set `docs` in a config file)");
        }
        if self.api_key.trim().is_empty() {
            bail!(
                "no API key found (use --api-key, export {DEFAULT_API_KEY_ENV}, or set api_key_env_var in a config file)"
            );
        }
        if self.provider == ProviderKind::Custom {
            if self.api_url.as_deref().is_none_or(|url| url.trim().is_empty()) {
                bail!("api_url must be provided for custom provider");
            }
            if self.model.as_deref().is_none_or(|model| model.trim().is_empty()) {
                bail!("model must be provided for custom provider");
            }
        }
        if self.max_iterations == 0 {
            bail!("max_iterations must be > 0");
        }
        if self.timeout.is_zero() {
            bail!("timeout must be > 0");
        }
        if self.script_timeout.is_zero() {
            bail!("script_timeout must be > 0");
        }
        if self.output_limit_bytes == 0 {
            bail!("output_limit_bytes must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn yaml_with_aliases() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = write(
            temp.path(),
            ".doctai.yml",
            "documentation:\n  - README.md\n  - docs/\nai_provider: anthropic\nstop-on-failure: \"yes\"\nmax-iterations: \"5\"\nnotes:\n  - line one\n  - line two\napi_key_var: MY_KEY\nenv:\n  PORT: 8080\n  DEBUG: true\n",
        );

        let cfg = load_config_file(&path).expect("load");
        let settings = Settings::resolve(cfg, Overrides::default(), &env_of(&[("MY_KEY", "k")]));

        assert_eq!(settings.docs, vec!["README.md", "docs/"]);
        assert_eq!(settings.provider, ProviderKind::Anthropic);
        assert!(settings.stop_on_failure);
        assert_eq!(settings.max_iterations, 5);
        assert_eq!(settings.instructions.as_deref(), Some("line one\nline two"));
        assert_eq!(settings.api_key, "k");
        assert_eq!(settings.env.get("PORT").map(String::as_str), Some("8080"));
        assert_eq!(settings.env.get("DEBUG").map(String::as_str), Some("true"));
    }

    #[test]
    fn json_and_toml_are_supported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let json = write(
            temp.path(),
            "doctai.json",
            r#"{"docs": "a.md, b.md", "timeout": 30, "script_timeout": "45"}"#,
        );
        let cfg = load_config_file(&json).expect("json");
        let settings = Settings::resolve(cfg, Overrides::default(), &env_of(&[]));
        assert_eq!(settings.docs, vec!["a.md", "b.md"]);
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert_eq!(settings.script_timeout, Duration::from_secs(45));

        let toml_path = write(
            temp.path(),
            "doctai.toml",
            "docs = \"one.md two.md\"\nsave_scripts = false\nscripts_dir = \"out\"\n",
        );
        let cfg = load_config_file(&toml_path).expect("toml");
        let settings = Settings::resolve(cfg, Overrides::default(), &env_of(&[]));
        assert_eq!(settings.docs, vec!["one.md", "two.md"]);
        assert!(!settings.save_scripts);
        assert_eq!(settings.scripts_dir, PathBuf::from("out"));
    }

    #[test]
    fn empty_yaml_is_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = write(temp.path(), ".doctai.yaml", "# nothing here\n");
        assert_eq!(load_config_file(&path).expect("load"), FileConfig::default());
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = write(temp.path(), "doctai.ini", "docs=README.md");
        let err = load_config_file(&path).unwrap_err();
        assert!(err.to_string().contains("Unsupported config file format: .ini"));
    }

    #[test]
    fn discovery_follows_priority_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(discover_config(temp.path()).is_none());

        write(temp.path(), "doctai.yml", "docs: late.md\n");
        write(temp.path(), ".doctai.json", r#"{"docs": ["early.md"]}"#);
        let found = discover_config(temp.path()).expect("found");
        assert!(found.ends_with(".doctai.json"));

        let cfg = load_config(None, temp.path()).expect("load");
        assert_eq!(
            cfg.docs.map(StringOrList::into_sources),
            Some(vec!["early.md".to_string()])
        );
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("nope.yml");
        let err = load_config(Some(&missing), temp.path()).unwrap_err();
        assert!(err.to_string().starts_with("Config file not found"));
    }

    #[test]
    fn overrides_beat_file_values() {
        let file = FileConfig {
            docs: Some(StringOrList::One("file.md".to_string())),
            provider: Some("gemini".to_string()),
            model: Some("file-model".to_string()),
            timeout: Some(IntLike::Int(10)),
            save_scripts: Some(BoolLike::Bool(true)),
            ..FileConfig::default()
        };
        let overrides = Overrides {
            docs: vec!["cli.md".to_string()],
            provider: Some(ProviderKind::Openai),
            timeout: Some(99),
            no_save_scripts: true,
            ..Overrides::default()
        };
        let settings = Settings::resolve(file, overrides, &env_of(&[]));

        assert_eq!(settings.docs, vec!["cli.md"]);
        assert_eq!(settings.provider, ProviderKind::Openai);
        assert_eq!(settings.model.as_deref(), Some("file-model"));
        assert_eq!(settings.timeout, Duration::from_secs(99));
        assert!(!settings.save_scripts);
    }

    #[test]
    fn defaults_apply_when_nothing_set() {
        let settings = Settings::resolve(FileConfig::default(), Overrides::default(), &env_of(&[]));
        assert_eq!(settings.provider, ProviderKind::Openai);
        assert_eq!(settings.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(settings.timeout, DEFAULT_PROVIDER_TIMEOUT);
        assert_eq!(settings.script_timeout, DEFAULT_SCRIPT_TIMEOUT);
        assert_eq!(settings.output_limit_bytes, DEFAULT_OUTPUT_LIMIT_BYTES);
        assert!(settings.save_scripts);
        assert!(!settings.stop_on_failure);
        assert_eq!(settings.scripts_dir, PathBuf::from("."));
    }

    #[test]
    fn api_key_resolution_order() {
        let env = env_of(&[
            ("DOCTAI_API_KEY_ENV_VAR", "OVERRIDE_KEY"),
            ("OVERRIDE_KEY", "from-override"),
            ("CONFIG_KEY", "from-config"),
            ("DOCTAI_API_KEY", "from-default"),
        ]);
        assert_eq!(
            resolve_api_key(Some("flag"), Some("CONFIG_KEY"), &env).as_deref(),
            Some("flag")
        );
        assert_eq!(
            resolve_api_key(None, Some("CONFIG_KEY"), &env).as_deref(),
            Some("from-override")
        );

        let env = env_of(&[("CONFIG_KEY", "from-config"), ("DOCTAI_API_KEY", "d")]);
        assert_eq!(
            resolve_api_key(None, Some("CONFIG_KEY"), &env).as_deref(),
            Some("from-config")
        );

        let env = env_of(&[("DOCTAI_API_KEY", "d")]);
        assert_eq!(
            resolve_api_key(None, Some("UNSET_KEY"), &env).as_deref(),
            Some("d")
        );
        assert_eq!(resolve_api_key(None, None, &env_of(&[])), None);
    }

    #[test]
    fn validation_rules() {
        let base = Settings::resolve(
            FileConfig::default(),
            Overrides {
                docs: vec!["README.md".to_string()],
                api_key: Some("k".to_string()),
                ..Overrides::default()
            },
            &env_of(&[]),
        );
        base.validate().expect("valid");

        let no_docs = Settings {
            docs: Vec::new(),
            ..base.clone()
        };
        assert!(no_docs.validate().is_err());

        let no_key = Settings {
            api_key: String::new(),
            ..base.clone()
        };
        assert!(no_key.validate().unwrap_err().to_string().contains("API key"));

        let custom = Settings {
            provider: ProviderKind::Custom,
            ..base.clone()
        };
        assert!(custom.validate().unwrap_err().to_string().contains("api_url"));

        let zero = Settings {
            script_timeout: Duration::ZERO,
            ..base
        };
        assert!(zero.validate().is_err());
    }
}
