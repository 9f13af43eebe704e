use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::judge::Verdict;
use crate::outcome::Outcome;
use crate::results::read_meta;

/// How many missing steps `report` lists.
pub const TOP_MISSING: usize = 5;

#[derive(Debug, Default)]
pub struct ReportSummary {
    pub runs: usize,
    pub adequate: usize,
    pub inadequate: usize,
    pub error: usize,
    pub avg_duration_secs: Option<f64>,
    /// Lower-cased missing step -> number of runs that reported it.
    pub missing_counts: BTreeMap<String, usize>,
}

impl ReportSummary {
    /// Most frequently reported missing steps, ties broken alphabetically.
    pub fn top_missing(&self, limit: usize) -> Vec<(&str, usize)> {
        let mut ranked: Vec<(&str, usize)> = self
            .missing_counts
            .iter()
            .map(|(step, count)| (step.as_str(), *count))
            .collect();
        ranked.sort_by(|left, right| right.1.cmp(&left.1).then(left.0.cmp(right.0)));
        ranked.truncate(limit);
        ranked
    }
}

pub fn load_run_dirs(case_results_dir: &Path) -> Result<Vec<PathBuf>> {
    if !case_results_dir.exists() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(case_results_dir)
        .with_context(|| format!("read {}", case_results_dir.display()))?
    {
        let entry = entry.context("read entry")?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

pub fn aggregate(case_results_dir: &Path) -> Result<(ReportSummary, Vec<String>)> {
    let mut summary = ReportSummary::default();
    let mut warnings = Vec::new();

    for run_dir in load_run_dirs(case_results_dir)? {
        let meta = match read_meta(&run_dir.join("meta.json")) {
            Ok(meta) => meta,
            Err(err) => {
                warnings.push(format!(
                    "skip {}: meta.json invalid ({err:#})",
                    run_dir.display()
                ));
                continue;
            }
        };

        summary.runs += 1;
        match meta.outcome {
            Outcome::Adequate => summary.adequate += 1,
            Outcome::Inadequate => summary.inadequate += 1,
            Outcome::Error => summary.error += 1,
        }

        summary.avg_duration_secs = Some(match summary.avg_duration_secs {
            None => meta.duration_secs,
            Some(avg) => {
                let total = avg * (summary.runs as f64 - 1.0) + meta.duration_secs;
                total / summary.runs as f64
            }
        });

        if meta.outcome == Outcome::Error {
            continue;
        }
        let verdict_path = run_dir.join("verdict.json");
        match fs::read_to_string(&verdict_path)
            .with_context(|| format!("read {}", verdict_path.display()))
            .and_then(|contents| {
                serde_json::from_str::<Verdict>(&contents).context("parse verdict")
            }) {
            Ok(verdict) => {
                for step in verdict.missing {
                    *summary.missing_counts.entry(step.to_lowercase()).or_insert(0) += 1;
                }
            }
            Err(err) => warnings.push(format!(
                "{}: verdict.json invalid ({err:#})",
                run_dir.display()
            )),
        }
    }

    Ok((summary, warnings))
}
