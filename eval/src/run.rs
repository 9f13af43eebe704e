//! Case execution orchestration.
//!
//! Generates scripts through the doctai library (nothing is executed), asks
//! the model to compare them with the golden script, and records the result.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};
use tracing::{debug, info, instrument, warn};

use doctai::core::types::ScriptSet;
use doctai::error::RunError;
use doctai::io::fetcher::{DEFAULT_URL_TIMEOUT, DocumentationFetcher, SourceLoader};
use doctai::io::provider::{GatewayConfig, HttpGateway, ModelGateway};
use doctai::orchestrator::{TestRequest, generate_scripts};

use crate::case::CaseFile;
use crate::config::settings_for_case;
use crate::judge::{Verdict, combine_scripts, comparison_prompt, parse_verdict, write_verdict};
use crate::outcome::{Outcome, classify_outcome};
use crate::results::{MetaInput, build_meta, results_dir, write_json};

/// Result of running a single case.
#[derive(Debug)]
pub struct RunOutcome {
    /// Unique identifier for this eval run.
    pub eval_run_id: String,
    /// Path to the results directory.
    pub results_dir: PathBuf,
    pub outcome: Outcome,
}

/// Generated scripts and the model's verdict on them.
#[derive(Debug, Default)]
pub struct Evaluation {
    pub scripts: ScriptSet,
    pub verdict: Option<Verdict>,
    pub errors: Vec<String>,
}

/// Generate scripts for `request` and have the model judge them against `golden`.
///
/// The comparison goes through the same gateway, so it follows the
/// generation exchange in one conversation.
#[instrument(skip_all, fields(sources = request.sources.len()))]
pub fn evaluate<L: SourceLoader, G: ModelGateway>(
    loader: &L,
    gateway: &mut G,
    request: &TestRequest,
    golden: &str,
) -> Evaluation {
    let generation = match generate_scripts(loader, gateway, request) {
        Ok(generation) => generation,
        Err(err) => {
            warn!(err = %err, "generation failed");
            return Evaluation {
                errors: vec![err.to_string()],
                ..Evaluation::default()
            };
        }
    };
    let scripts = generation.scripts;
    let Some(generated) = combine_scripts(&scripts) else {
        return Evaluation {
            scripts,
            errors: vec![RunError::NoScriptsGenerated.to_string()],
            ..Evaluation::default()
        };
    };

    debug!(scripts = scripts.len(), "asking model to compare with golden script");
    let reply = match gateway.send(&comparison_prompt(&generated, golden), None) {
        Ok(reply) => reply,
        Err(err) => {
            return Evaluation {
                scripts,
                verdict: None,
                errors: vec![format!("compare scripts: {err}")],
            };
        }
    };
    match parse_verdict(&reply) {
        Ok(verdict) => Evaluation {
            scripts,
            verdict: Some(verdict),
            errors: Vec::new(),
        },
        Err(err) => Evaluation {
            scripts,
            verdict: None,
            errors: vec![format!("{err:#}")],
        },
    }
}

/// Run a case end-to-end: settings, generation, comparison, result capture.
#[instrument(skip_all, fields(case_id = %case.case.id))]
pub fn run_case(repo_root: &Path, case_path: &Path, case: &CaseFile) -> Result<RunOutcome> {
    info!("case run started");
    let case_dir = case_path.parent().unwrap_or_else(|| Path::new("."));
    let settings = settings_for_case(repo_root, case_dir, case, &|name| std::env::var(name).ok())
        .context("resolve settings")?;

    let golden_path = case.golden_path(case_dir);
    let golden = fs::read_to_string(&golden_path)
        .with_context(|| format!("read golden script {}", golden_path.display()))?;

    let loader = DocumentationFetcher::new(DEFAULT_URL_TIMEOUT)?;
    let mut gateway = HttpGateway::new(GatewayConfig {
        provider: settings.provider,
        api_key: settings.api_key.clone(),
        api_url: settings.api_url.clone(),
        model: settings.model.clone(),
        timeout: settings.timeout,
    })?;
    let request = TestRequest {
        sources: settings.docs.clone(),
        max_iterations: settings.max_iterations,
        stop_on_failure: settings.stop_on_failure,
        instructions: settings.instructions.clone(),
        script_timeout: settings.script_timeout,
        env: settings.env.clone(),
    };

    let started_at = Utc::now();
    let eval_run_id = new_eval_run_id(started_at);
    let evaluation = evaluate(&loader, &mut gateway, &request, &golden);
    let finished_at = Utc::now();
    let outcome = classify_outcome(evaluation.verdict.as_ref());

    let results_dir = results_dir(
        &repo_root.join("eval").join("results"),
        &case.case.id,
        &eval_run_id,
    );
    fs::create_dir_all(&results_dir)
        .with_context(|| format!("create results dir {}", results_dir.display()))?;
    write_json(&results_dir.join("scripts.json"), &evaluation.scripts)?;
    if let Some(verdict) = &evaluation.verdict {
        write_verdict(&results_dir.join("verdict.json"), verdict)?;
    }
    let meta = build_meta(MetaInput {
        case_id: &case.case.id,
        eval_run_id: &eval_run_id,
        case_path,
        golden_path: &golden_path,
        repo_root,
        provider: gateway.provider().to_string(),
        model: Some(gateway.model().to_string()),
        outcome,
        scripts_generated: evaluation.scripts.len(),
        started_at,
        finished_at,
        errors: evaluation.errors,
    });
    write_json(&results_dir.join("meta.json"), &meta)?;

    info!(outcome = ?outcome, results_dir = %results_dir.display(), "case run complete");
    Ok(RunOutcome {
        eval_run_id,
        results_dir,
        outcome,
    })
}

/// Timestamp plus a short random suffix so repeated runs in the same second
/// get distinct directories.
fn new_eval_run_id(at: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(4)
        .collect::<String>()
        .to_lowercase();
    format!("eval-{}-{suffix}", at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use doctai::error::ProviderError;
    use doctai::test_support::{ScriptedGateway, StaticLoader, fenced};

    fn request() -> TestRequest {
        TestRequest::new(vec!["README.md".to_string()])
    }

    #[test]
    fn eval_run_id_format() {
        let id = new_eval_run_id(Utc::now());
        assert!(id.starts_with("eval-"));
        assert_eq!(id.rsplit('-').next().map(str::len), Some(4));
    }

    #[test]
    fn adequate_verdict_from_second_reply() {
        let loader = StaticLoader::with_docs(&[("README.md", "pip install flask")]);
        let mut gateway = ScriptedGateway::new(vec![
            fenced("bash", "pip install flask"),
            "ADEQUATE: YES\nREASON: fine\nMISSING: none".to_string(),
        ]);

        let evaluation = evaluate(&loader, &mut gateway, &request(), "pip install flask");
        assert!(evaluation.errors.is_empty());
        assert_eq!(evaluation.scripts.len(), 1);
        assert_eq!(
            classify_outcome(evaluation.verdict.as_ref()),
            Outcome::Adequate
        );

        let prompts = gateway.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].prompt.contains("GOLDEN SCRIPT"));
        assert!(prompts[1].system.is_none());
    }

    #[test]
    fn no_scripts_is_an_error_outcome() {
        let loader = StaticLoader::with_docs(&[("README.md", "nothing")]);
        let mut gateway = ScriptedGateway::new(vec!["No code here.".to_string()]);

        let evaluation = evaluate(&loader, &mut gateway, &request(), "echo golden");
        assert_eq!(evaluation.errors, vec!["No test scripts were generated"]);
        assert_eq!(classify_outcome(evaluation.verdict.as_ref()), Outcome::Error);
        assert_eq!(gateway.prompts().len(), 1);
    }

    #[test]
    fn generation_failure_is_recorded() {
        let loader = StaticLoader::with_docs(&[("README.md", "docs")]);
        let mut gateway = ScriptedGateway::failing(ProviderError::RateLimit {
            provider: "OpenAI".to_string(),
        });

        let evaluation = evaluate(&loader, &mut gateway, &request(), "echo golden");
        assert!(evaluation.scripts.is_empty());
        assert!(evaluation.errors[0].contains("rate limit exceeded"));
    }

    #[test]
    fn unparseable_verdict_is_an_error() {
        let loader = StaticLoader::with_docs(&[("README.md", "docs")]);
        let mut gateway = ScriptedGateway::new(vec![
            fenced("bash", "make"),
            "Looks fine to me.".to_string(),
        ]);

        let evaluation = evaluate(&loader, &mut gateway, &request(), "make");
        assert!(evaluation.verdict.is_none());
        assert_eq!(evaluation.scripts.len(), 1);
        assert!(evaluation.errors[0].contains("ADEQUATE"));
    }
}
