//! doctai: test documentation by generating scripts with an LLM and running them.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use doctai::cancel::CancelToken;
use doctai::core::fence::extract_candidates;
use doctai::core::script_set::{build_script_set, classify_all, script_name};
use doctai::exit_codes;
use doctai::io::config::{Overrides, Settings, load_config};
use doctai::io::fetcher::{DEFAULT_URL_TIMEOUT, DocumentationFetcher};
use doctai::io::provider::{GatewayConfig, HttpGateway, ProviderKind};
use doctai::io::report::{render_summary, write_report};
use doctai::io::script_runner::{LocalScriptRunner, RunnerOptions};
use doctai::logging;
use doctai::orchestrator::{TestRequest, run_doc_test};

#[derive(Parser)]
#[command(
    name = "doctai",
    version,
    about = "Test documentation by generating and running scripts with an LLM"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch docs, generate scripts, run them, and report.
    Run(RunArgs),
    /// Parse a saved model response and print the resulting scripts as JSON.
    Parse {
        /// Response file, or `-` for stdin.
        file: PathBuf,
        /// List every fenced block and how it was classified on stderr.
        #[arg(long)]
        explain: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Documentation files, directories or URLs.
    #[arg(long, num_args = 1..)]
    docs: Vec<String>,
    /// Config file (YAML, JSON or TOML). Discovered in the current directory when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long, env = "DOCTAI_API_URL")]
    api_url: Option<String>,
    #[arg(long, value_enum, env = "DOCTAI_PROVIDER")]
    provider: Option<ProviderKind>,
    #[arg(long, env = "DOCTAI_MODEL")]
    model: Option<String>,
    /// Directory scripts run in. A temporary one is used when omitted.
    #[arg(long)]
    work_dir: Option<PathBuf>,
    #[arg(long)]
    max_iterations: Option<u32>,
    /// Stop at the first failing script.
    #[arg(long)]
    stop_on_failure: bool,
    /// Model request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,
    /// Per-script timeout in seconds.
    #[arg(long)]
    script_timeout: Option<u64>,
    /// Extra guidance appended to the prompt.
    #[arg(long)]
    instructions: Option<String>,
    /// Write the JSON report here.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Only log warnings and skip the summary.
    #[arg(short, long)]
    quiet: bool,
    /// Run scripts from temporary files instead of keeping `_gen-*` copies.
    #[arg(long)]
    no_save_scripts: bool,
    /// Where `_gen-*` script copies are written.
    #[arg(long)]
    scripts_dir: Option<PathBuf>,
}

impl RunArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            docs: self.docs.clone(),
            provider: self.provider,
            model: self.model.clone(),
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            work_dir: self.work_dir.clone(),
            stop_on_failure: self.stop_on_failure,
            max_iterations: self.max_iterations,
            timeout: self.timeout,
            script_timeout: self.script_timeout,
            instructions: self.instructions.clone(),
            no_save_scripts: self.no_save_scripts,
            scripts_dir: self.scripts_dir.clone(),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Run(args) => {
            logging::init(if args.quiet { "warn" } else { "info" });
            cmd_run(&args)
        }
        Command::Parse { file, explain } => {
            logging::init("warn");
            cmd_parse(&file, explain)
        }
    };
    match outcome {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn cmd_run(args: &RunArgs) -> Result<i32> {
    let cwd = std::env::current_dir().context("resolve current directory")?;
    let file = match load_config(args.config.as_deref(), &cwd) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("{err:#}");
            return Ok(exit_codes::INVALID);
        }
    };
    let settings = Settings::resolve(file, args.overrides(), &|name| std::env::var(name).ok());
    if let Err(err) = settings.validate() {
        eprintln!("{err:#}");
        return Ok(exit_codes::INVALID);
    }

    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel)?;

    let loader = DocumentationFetcher::new(DEFAULT_URL_TIMEOUT)?;
    let mut gateway = match HttpGateway::new(GatewayConfig {
        provider: settings.provider,
        api_key: settings.api_key.clone(),
        api_url: settings.api_url.clone(),
        model: settings.model.clone(),
        timeout: settings.timeout,
    }) {
        Ok(gateway) => gateway,
        Err(err) => {
            eprintln!("{err:#}");
            return Ok(exit_codes::INVALID);
        }
    };
    info!(provider = %gateway.provider(), model = gateway.model(), "using model");

    let request = TestRequest {
        sources: settings.docs.clone(),
        max_iterations: settings.max_iterations,
        stop_on_failure: settings.stop_on_failure,
        instructions: settings.instructions.clone(),
        script_timeout: settings.script_timeout,
        env: settings.env.clone(),
    };
    let runner_options = RunnerOptions {
        work_dir: settings.work_dir.clone(),
        scripts_dir: settings.scripts_dir.clone(),
        save_scripts: settings.save_scripts,
        source_context: settings.docs.first().cloned(),
        output_limit_bytes: settings.output_limit_bytes,
        cancel: cancel.clone(),
    };

    let result = run_doc_test(
        &loader,
        &mut gateway,
        || LocalScriptRunner::new(runner_options),
        &request,
        &cancel,
    );

    if let Some(path) = &args.output {
        write_report(path, &result)?;
        info!(path = %path.display(), "report written");
    }
    if !args.quiet {
        print!("{}", render_summary(&result));
    }

    Ok(if cancel.is_cancelled() {
        exit_codes::INTERRUPTED
    } else if result.success() {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

/// First Ctrl-C cancels the run cooperatively; a second one exits immediately.
fn install_interrupt_handler(cancel: &CancelToken) -> Result<()> {
    let token = cancel.clone();
    ctrlc::set_handler(move || {
        if token.cancel() {
            std::process::exit(exit_codes::INTERRUPTED);
        }
        warn!("interrupt received, stopping after cleanup (press Ctrl-C again to abort)");
    })
    .context("install Ctrl-C handler")
}

fn cmd_parse(file: &Path, explain: bool) -> Result<i32> {
    let response = if file.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read response from stdin")?;
        buf
    } else {
        fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?
    };

    let classified = classify_all(extract_candidates(&response));
    if explain {
        for item in &classified {
            eprintln!(
                "{} ({}): {}",
                script_name(item.candidate.ordinal, &item.candidate.script_type),
                item.candidate.declared_language,
                item.decision.as_str()
            );
        }
    }
    let scripts = build_script_set(&classified);
    let json = serde_json::to_string_pretty(&scripts).context("serialize scripts")?;
    println!("{json}");
    Ok(exit_codes::OK)
}
