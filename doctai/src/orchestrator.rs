//! One documentation test run: fetch, prompt, generate, parse, execute, aggregate.
//!
//! Every stage failure becomes the run's single top-level error and stops the
//! remaining stages. The caller always gets a complete [`TestResult`].

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::core::docs::DocumentationSet;
use crate::core::result::{ExecutionOutcome, RunRecord, TestResult};
use crate::core::script_set::parse_response;
use crate::core::types::ScriptSet;
use crate::error::RunError;
use crate::io::fetcher::SourceLoader;
use crate::io::prompt::{PromptEngine, system_prompt};
use crate::io::provider::ModelGateway;
use crate::io::script_runner::{DEFAULT_SCRIPT_TIMEOUT, RunFailure, ScriptRequest, ScriptRunner};

/// Parameters for one run.
#[derive(Debug, Clone)]
pub struct TestRequest {
    pub sources: Vec<String>,
    /// Accepted and validated, but only one model round-trip is made.
    pub max_iterations: u32,
    pub stop_on_failure: bool,
    pub instructions: Option<String>,
    pub script_timeout: Duration,
    pub env: BTreeMap<String, String>,
}

impl TestRequest {
    pub fn new(sources: Vec<String>) -> Self {
        Self {
            sources,
            max_iterations: 1,
            stop_on_failure: false,
            instructions: None,
            script_timeout: DEFAULT_SCRIPT_TIMEOUT,
            env: BTreeMap::new(),
        }
    }
}

/// Documents and the scripts generated from them.
#[derive(Debug, Clone)]
pub struct Generation {
    pub documentation: DocumentationSet,
    pub scripts: ScriptSet,
}

/// Outcomes of the scripts that ran to completion.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub outcomes: Vec<ExecutionOutcome>,
    pub interrupted: bool,
}

/// Ask the model for scripts covering `docs` and parse its reply.
///
/// An empty script set is not an error here.
#[instrument(skip_all, fields(documents = docs.len()))]
pub fn request_scripts<G: ModelGateway>(
    docs: &DocumentationSet,
    gateway: &mut G,
    request: &TestRequest,
) -> Result<ScriptSet, RunError> {
    if request.max_iterations > 1 {
        debug!(
            max_iterations = request.max_iterations,
            "only a single generation round is performed"
        );
    }
    let engine = PromptEngine::new().map_err(|e| RunError::Prompt(format!("{e:#}")))?;
    let prompt = engine
        .render_task(docs, request.instructions.as_deref())
        .map_err(|e| RunError::Prompt(format!("{e:#}")))?;

    let response = gateway.send(&prompt, Some(system_prompt()))?;
    let scripts = parse_response(&response);
    info!(scripts = scripts.len(), "parsed model response");
    Ok(scripts)
}

/// Fetch documentation and generate scripts without executing them.
pub fn generate_scripts<L: SourceLoader, G: ModelGateway>(
    loader: &L,
    gateway: &mut G,
    request: &TestRequest,
) -> Result<Generation, RunError> {
    let documentation = loader.fetch(&request.sources)?;
    let scripts = request_scripts(&documentation, gateway, request)?;
    Ok(Generation {
        documentation,
        scripts,
    })
}

/// Run scripts one at a time in set order.
///
/// With `stop_on_failure`, the first failing script ends the sequence. A
/// cancelled token ends it too, and the outcome of the script that was running
/// at that moment is dropped.
#[instrument(skip_all, fields(scripts = scripts.len(), stop_on_failure = request.stop_on_failure))]
pub fn execute_script_set<R: ScriptRunner>(
    runner: &mut R,
    scripts: &ScriptSet,
    request: &TestRequest,
    cancel: &CancelToken,
) -> ExecutionReport {
    let mut report = ExecutionReport::default();
    for (index, (name, entry)) in scripts.iter().enumerate() {
        if cancel.is_cancelled() {
            report.interrupted = true;
            break;
        }
        info!(script = name, position = index + 1, total = scripts.len(), "running script");
        let output = runner.run(&ScriptRequest {
            name: name.to_string(),
            index,
            content: entry.content.clone(),
            script_type: entry.script_type.clone(),
            timeout: request.script_timeout,
            env: request.env.clone(),
        });
        if cancel.is_cancelled() || output.failure == Some(RunFailure::Cancelled) {
            warn!(script = name, "run interrupted, discarding in-flight outcome");
            report.interrupted = true;
            break;
        }

        let success = output.success;
        report.outcomes.push(ExecutionOutcome::new(
            name,
            success,
            &output.stdout,
            &output.stderr,
        ));
        if !success && request.stop_on_failure {
            info!(script = name, "stopping after failed script");
            break;
        }
    }
    report
}

/// Full pipeline. `make_runner` is only called once scripts exist.
#[instrument(skip_all, fields(sources = request.sources.len()))]
pub fn run_doc_test<L, G, R, F>(
    loader: &L,
    gateway: &mut G,
    make_runner: F,
    request: &TestRequest,
    cancel: &CancelToken,
) -> TestResult
where
    L: SourceLoader,
    G: ModelGateway,
    R: ScriptRunner,
    F: FnOnce() -> Result<R>,
{
    let sources = request.sources.clone();

    info!("STEP 1: fetching documentation");
    let docs = match loader.fetch(&request.sources) {
        Ok(docs) => docs,
        Err(e) => return TestResult::failed_early(sources, RunError::from(e)),
    };
    info!(documents = docs.len(), "documentation loaded");
    let mut record = RunRecord {
        documentation_sources: sources,
        documentation_count: docs.len(),
        ..RunRecord::default()
    };
    if cancel.is_cancelled() {
        return finish_with(record, RunError::Interrupted);
    }

    info!("STEP 2: generating test scripts");
    match request_scripts(&docs, gateway, request) {
        Ok(scripts) => record.scripts = scripts,
        Err(e) => return finish_with(record, e),
    }
    if record.scripts.is_empty() {
        return finish_with(record, RunError::NoScriptsGenerated);
    }
    if cancel.is_cancelled() {
        return finish_with(record, RunError::Interrupted);
    }

    info!(scripts = record.scripts.len(), "STEP 3: executing scripts");
    let mut runner = match make_runner() {
        Ok(runner) => runner,
        Err(e) => return finish_with(record, RunError::Execution(format!("{e:#}"))),
    };
    let execution = execute_script_set(&mut runner, &record.scripts, request, cancel);
    let saved = runner.finish();
    if !saved.is_empty() {
        let paths: Vec<String> = saved.iter().map(|p| p.display().to_string()).collect();
        info!(paths = ?paths, "generated scripts saved");
    }

    record.details = execution.outcomes;
    if execution.interrupted {
        record.error = Some(RunError::Interrupted.to_string());
    }
    let result = TestResult::from_record(record);
    info!(
        executed = result.scripts_executed(),
        passed = result.scripts_passed(),
        failed = result.scripts_failed(),
        success = result.success(),
        "run finished"
    );
    result
}

fn finish_with(mut record: RunRecord, error: RunError) -> TestResult {
    warn!(err = %error, "run stopped early");
    record.error = Some(error.to_string());
    TestResult::from_record(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ScriptEntry, ScriptType};
    use crate::error::{FetchError, ProviderError};
    use crate::test_support::{ScriptedGateway, ScriptedRunner, StaticLoader, fenced};

    fn bash_set(names: &[&str]) -> ScriptSet {
        names
            .iter()
            .map(|name| {
                (
                    (*name).to_string(),
                    ScriptEntry {
                        content: format!("echo {name}"),
                        script_type: ScriptType::Bash,
                    },
                )
            })
            .collect()
    }

    fn request() -> TestRequest {
        TestRequest::new(vec!["README.md".to_string()])
    }

    #[test]
    fn fetch_failure_short_circuits_with_zero_counts() {
        let loader = StaticLoader::failing(FetchError::NotFound("README.md".into()));
        let mut gateway = ScriptedGateway::new(vec![]);
        let result = run_doc_test(
            &loader,
            &mut gateway,
            || Ok(ScriptedRunner::passing()),
            &request(),
            &CancelToken::new(),
        );

        assert!(!result.success());
        assert_eq!(result.documentation_count(), 0);
        assert_eq!(result.scripts_generated(), 0);
        assert!(
            result
                .error()
                .is_some_and(|e| e.starts_with("Failed to fetch documentation:"))
        );
        assert!(gateway.prompts().is_empty());
    }

    #[test]
    fn provider_failure_keeps_document_count() {
        let loader = StaticLoader::with_docs(&[("README.md", "docs")]);
        let mut gateway = ScriptedGateway::failing(ProviderError::Auth {
            provider: "OpenAI".to_string(),
        });
        let result = run_doc_test(
            &loader,
            &mut gateway,
            || Ok(ScriptedRunner::passing()),
            &request(),
            &CancelToken::new(),
        );

        assert_eq!(result.documentation_count(), 1);
        assert!(
            result
                .error()
                .is_some_and(|e| e.starts_with("Failed to generate test scripts:"))
        );
    }

    #[test]
    fn empty_parse_is_no_scripts_generated() {
        let loader = StaticLoader::with_docs(&[("README.md", "docs")]);
        let mut gateway = ScriptedGateway::new(vec![fenced("json", "{}")]);
        let result = run_doc_test(
            &loader,
            &mut gateway,
            || Ok(ScriptedRunner::passing()),
            &request(),
            &CancelToken::new(),
        );

        assert!(!result.success());
        assert_eq!(result.error(), Some("No test scripts were generated"));
    }

    #[test]
    fn runner_setup_failure_is_execution_error() {
        let loader = StaticLoader::with_docs(&[("README.md", "docs")]);
        let mut gateway = ScriptedGateway::new(vec![fenced("bash", "echo hi")]);
        let result = run_doc_test(
            &loader,
            &mut gateway,
            || -> Result<ScriptedRunner> { Err(anyhow::anyhow!("no space left")) },
            &request(),
            &CancelToken::new(),
        );

        assert_eq!(result.scripts_generated(), 1);
        assert_eq!(result.scripts_executed(), 0);
        assert_eq!(
            result.error(),
            Some("Failed to execute scripts: no space left")
        );
    }

    #[test]
    fn prompt_carries_docs_instructions_and_system() {
        let loader = StaticLoader::with_docs(&[("README.md", "Run make.")]);
        let mut gateway = ScriptedGateway::new(vec![fenced("bash", "make")]);
        let mut req = request();
        req.instructions = Some("Skip Docker steps.".to_string());
        req.max_iterations = 3;

        let result = run_doc_test(
            &loader,
            &mut gateway,
            || Ok(ScriptedRunner::passing()),
            &req,
            &CancelToken::new(),
        );
        assert!(result.success());

        let prompts = gateway.prompts();
        assert_eq!(prompts.len(), 1, "exactly one model round-trip");
        assert!(prompts[0].prompt.contains("Run make."));
        assert!(prompts[0].prompt.contains("Skip Docker steps."));
        assert!(
            prompts[0]
                .system
                .as_deref()
                .is_some_and(|s| s.contains("documentation tester"))
        );
    }

    #[test]
    fn stop_on_failure_halts_sequence() {
        let scripts = bash_set(&["a", "b", "c"]);
        let mut runner = ScriptedRunner::with_failures(&["b"]);
        let mut req = request();
        req.stop_on_failure = true;

        let report = execute_script_set(&mut runner, &scripts, &req, &CancelToken::new());
        let names: Vec<&str> = report.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(!report.outcomes[1].success);
        assert!(!report.interrupted);
    }

    #[test]
    fn without_stop_on_failure_everything_runs() {
        let scripts = bash_set(&["a", "b", "c"]);
        let mut runner = ScriptedRunner::with_failures(&["a"]);

        let report = execute_script_set(&mut runner, &scripts, &request(), &CancelToken::new());
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(runner.executed(), vec!["a", "b", "c"]);
    }

    #[test]
    fn cancellation_drops_in_flight_outcome() {
        let scripts = bash_set(&["a", "b", "c"]);
        let cancel = CancelToken::new();
        let mut runner = ScriptedRunner::passing().cancel_during("b", cancel.clone());

        let report = execute_script_set(&mut runner, &scripts, &request(), &cancel);
        let names: Vec<&str> = report.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
        assert!(report.interrupted);
        assert_eq!(runner.executed(), vec!["a", "b"]);
    }

    #[test]
    fn interrupted_run_reports_interruption() {
        let loader = StaticLoader::with_docs(&[("README.md", "docs")]);
        let response = [fenced("bash", "echo one"), fenced("bash", "echo two")].concat();
        let mut gateway = ScriptedGateway::new(vec![response]);
        let cancel = CancelToken::new();
        let runner_cancel = cancel.clone();

        let result = run_doc_test(
            &loader,
            &mut gateway,
            move || Ok(ScriptedRunner::passing().cancel_during("script_2_bash", runner_cancel)),
            &request(),
            &cancel,
        );

        assert_eq!(result.scripts_generated(), 2);
        assert_eq!(result.scripts_executed(), 1);
        assert_eq!(result.error(), Some("Run interrupted before completion"));
        assert!(result.success(), "success is derived from executed outcomes only");
    }

    #[test]
    fn scripts_receive_timeout_and_env() {
        let scripts = bash_set(&["a"]);
        let mut runner = ScriptedRunner::passing();
        let mut req = request();
        req.script_timeout = Duration::from_secs(7);
        req.env.insert("MODE".to_string(), "ci".to_string());

        execute_script_set(&mut runner, &scripts, &req, &CancelToken::new());
        let seen = runner.requests();
        assert_eq!(seen[0].timeout, Duration::from_secs(7));
        assert_eq!(seen[0].env.get("MODE").map(String::as_str), Some("ci"));
        assert_eq!(seen[0].index, 0);
    }
}
