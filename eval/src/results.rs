//! Result persistence.
//!
//! Each eval run writes `meta.json`, `scripts.json` and, when the model
//! produced a usable verdict, `verdict.json` under
//! `eval/results/<case_id>/<eval_run_id>/`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::outcome::Outcome;

/// Metadata for an eval run, persisted to `meta.json`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EvalMeta {
    pub case_id: String,
    pub eval_run_id: String,
    /// SHA-256 of the case file for reproducibility tracking.
    pub case_hash: String,
    /// SHA-256 of the golden script.
    pub golden_hash: String,
    pub doctai_git_sha: Option<String>,
    pub provider: String,
    pub model: Option<String>,
    pub outcome: Outcome,
    pub scripts_generated: usize,
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: f64,
    /// Non-fatal problems and the failure that produced an `error` outcome.
    pub errors: Vec<String>,
}

/// Everything needed to build [`EvalMeta`].
#[derive(Debug)]
pub struct MetaInput<'a> {
    pub case_id: &'a str,
    pub eval_run_id: &'a str,
    pub case_path: &'a Path,
    pub golden_path: &'a Path,
    pub repo_root: &'a Path,
    pub provider: String,
    pub model: Option<String>,
    pub outcome: Outcome,
    pub scripts_generated: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub errors: Vec<String>,
}

pub fn build_meta(input: MetaInput<'_>) -> EvalMeta {
    let mut errors = input.errors;
    let case_hash = file_sha256(input.case_path).unwrap_or_else(|err| {
        errors.push(format!("case hash: {err}"));
        String::new()
    });
    let golden_hash = file_sha256(input.golden_path).unwrap_or_else(|err| {
        errors.push(format!("golden hash: {err}"));
        String::new()
    });
    let doctai_git_sha = match git_rev_parse(input.repo_root) {
        Ok(sha) => Some(sha),
        Err(err) => {
            warn!(err = %err, "could not read git sha");
            None
        }
    };

    let duration = input.finished_at - input.started_at;
    EvalMeta {
        case_id: input.case_id.to_string(),
        eval_run_id: input.eval_run_id.to_string(),
        case_hash,
        golden_hash,
        doctai_git_sha,
        provider: input.provider,
        model: input.model,
        outcome: input.outcome,
        scripts_generated: input.scripts_generated,
        start_time: input.started_at.to_rfc3339(),
        end_time: input.finished_at.to_rfc3339(),
        duration_secs: duration.num_milliseconds() as f64 / 1000.0,
        errors,
    }
}

pub fn results_dir(base_dir: &Path, case_id: &str, eval_run_id: &str) -> PathBuf {
    base_dir.join(case_id).join(eval_run_id)
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value).context("serialize json")?;
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn read_meta(path: &Path) -> Result<EvalMeta> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).context("parse meta")
}

fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    let digest = hasher.finalize();
    Ok(hex::encode(digest))
}

fn git_rev_parse(repo_root: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_root)
        .output()
        .context("git rev-parse")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("git rev-parse failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
