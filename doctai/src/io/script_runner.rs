//! Script execution behind the [`ScriptRunner`] seam.
//!
//! [`LocalScriptRunner`] writes each script to disk, picks an interpreter from
//! the script type, and runs it inside the run's working directory. Tests use
//! scripted runners that return canned outputs without spawning anything.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rand::Rng;
use tempfile::{TempDir, TempPath};
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelToken;
use crate::core::result::truncate_chars;
use crate::core::types::ScriptType;
use crate::io::process::run_command_with_timeout;

pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

const WORK_DIR_PREFIX: &str = "doctai_";
const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 6;
const SOURCE_COMPONENT_MAX_CHARS: usize = 50;
const PREVIEW_CHARS: usize = 500;
const NAME_ATTEMPTS: usize = 8;

/// One script to run.
#[derive(Debug, Clone)]
pub struct ScriptRequest {
    pub name: String,
    /// 0-based position in the script set; used for file naming without a source.
    pub index: usize,
    pub content: String,
    pub script_type: ScriptType,
    pub timeout: Duration,
    /// Extra variables layered over the inherited environment.
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunFailure {
    TimedOut,
    SpawnFailed,
    Cancelled,
}

/// Result of running one script. Never an error: failures are folded into
/// `success = false` with a reason appended to `stderr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub failure: Option<RunFailure>,
}

impl ScriptOutput {
    pub fn exited(exit_code: Option<i32>, stdout: String, stderr: String) -> Self {
        Self {
            success: exit_code == Some(0),
            exit_code,
            stdout,
            stderr,
            failure: None,
        }
    }

    pub fn timed_out(timeout: Duration, stdout: String, stderr: String) -> Self {
        let mut stderr = stderr;
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&timeout_message(timeout));
        Self {
            success: false,
            exit_code: None,
            stdout,
            stderr,
            failure: Some(RunFailure::TimedOut),
        }
    }

    pub fn cancelled(stdout: String, stderr: String) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout,
            stderr,
            failure: Some(RunFailure::Cancelled),
        }
    }

    pub fn spawn_failed(reason: &str) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: format!("Failed to execute script: {reason}"),
            failure: Some(RunFailure::SpawnFailed),
        }
    }
}

pub fn timeout_message(timeout: Duration) -> String {
    format!(
        "Script execution timed out after {} seconds",
        timeout.as_secs()
    )
}

/// Abstraction over script execution backends.
pub trait ScriptRunner {
    fn run(&mut self, request: &ScriptRequest) -> ScriptOutput;

    /// Release run-scoped resources and return the persisted script paths.
    fn finish(self) -> Vec<PathBuf>
    where
        Self: Sized,
    {
        Vec::new()
    }
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Caller-provided working directory; a temporary one is created when `None`.
    pub work_dir: Option<PathBuf>,
    /// Where persisted `_gen-*` files are written.
    pub scripts_dir: PathBuf,
    pub save_scripts: bool,
    /// Source path or URL folded into persisted file names.
    pub source_context: Option<String>,
    pub output_limit_bytes: usize,
    /// Shared with the caller; cancelling it kills the running script.
    pub cancel: CancelToken,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            work_dir: None,
            scripts_dir: PathBuf::from("."),
            save_scripts: true,
            source_context: None,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            cancel: CancelToken::new(),
        }
    }
}

#[derive(Debug)]
enum WorkDir {
    Owned(TempDir),
    Provided(PathBuf),
}

impl WorkDir {
    fn path(&self) -> &Path {
        match self {
            Self::Owned(dir) => dir.path(),
            Self::Provided(path) => path,
        }
    }
}

/// Script file for a single execution. Temporary files are removed on drop.
enum ScriptFile {
    Persisted(PathBuf),
    Temporary(TempPath),
}

impl ScriptFile {
    fn path(&self) -> &Path {
        match self {
            Self::Persisted(path) => path,
            Self::Temporary(path) => path,
        }
    }
}

/// Runs scripts as local child processes. Holds run-scoped state: the working
/// directory and the list of persisted script paths.
#[derive(Debug)]
pub struct LocalScriptRunner {
    work_dir: WorkDir,
    scripts_dir: PathBuf,
    save_scripts: bool,
    source_context: Option<String>,
    output_limit_bytes: usize,
    cancel: CancelToken,
    generated_paths: Vec<PathBuf>,
}

impl LocalScriptRunner {
    pub fn new(options: RunnerOptions) -> Result<Self> {
        let work_dir = match options.work_dir {
            Some(path) => {
                fs::create_dir_all(&path)
                    .with_context(|| format!("create work dir {}", path.display()))?;
                let path = fs::canonicalize(&path)
                    .with_context(|| format!("resolve work dir {}", path.display()))?;
                WorkDir::Provided(path)
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix(WORK_DIR_PREFIX)
                    .tempdir()
                    .context("create temporary work dir")?;
                WorkDir::Owned(dir)
            }
        };

        let scripts_dir = if options.save_scripts {
            fs::create_dir_all(&options.scripts_dir).with_context(|| {
                format!("create scripts dir {}", options.scripts_dir.display())
            })?;
            fs::canonicalize(&options.scripts_dir).with_context(|| {
                format!("resolve scripts dir {}", options.scripts_dir.display())
            })?
        } else {
            options.scripts_dir
        };

        info!(work_dir = %work_dir.path().display(), "working directory ready");
        Ok(Self {
            work_dir,
            scripts_dir,
            save_scripts: options.save_scripts,
            source_context: options.source_context,
            output_limit_bytes: options.output_limit_bytes,
            cancel: options.cancel,
            generated_paths: Vec::new(),
        })
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    /// Persisted script files written so far, in execution order.
    pub fn generated_paths(&self) -> &[PathBuf] {
        &self.generated_paths
    }

    fn write_script(&mut self, request: &ScriptRequest) -> Result<ScriptFile> {
        let extension = script_extension(&request.script_type);
        let file = if self.save_scripts {
            let path = self.create_persisted(request, &extension)?;
            self.generated_paths.push(path.clone());
            ScriptFile::Persisted(path)
        } else {
            let mut temp = tempfile::Builder::new()
                .prefix("doctai_script_")
                .suffix(&extension)
                .tempfile_in(self.work_dir.path())
                .context("create temporary script file")?;
            temp.write_all(request.content.as_bytes())
                .context("write temporary script file")?;
            // Closing the handle keeps direct execution from failing with ETXTBSY.
            ScriptFile::Temporary(temp.into_temp_path())
        };
        make_executable(file.path())?;
        Ok(file)
    }

    fn create_persisted(&self, request: &ScriptRequest, extension: &str) -> Result<PathBuf> {
        for _ in 0..NAME_ATTEMPTS {
            let name = generated_file_name(
                self.source_context.as_deref(),
                request.index,
                extension,
                &random_suffix(),
            );
            let path = self.scripts_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(request.content.as_bytes())
                        .with_context(|| format!("write script {}", path.display()))?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("create script {}", path.display()));
                }
            }
        }
        Err(anyhow!(
            "could not find a free script name in {}",
            self.scripts_dir.display()
        ))
    }

    fn command_for(&self, script_type: &ScriptType, path: &Path) -> Command {
        let mut cmd = match script_type {
            ScriptType::Bash => {
                let mut cmd = Command::new("bash");
                cmd.arg(path);
                cmd
            }
            ScriptType::Python => {
                let mut cmd = Command::new("python3");
                cmd.arg(path);
                cmd
            }
            ScriptType::Other(_) => Command::new(path),
        };
        cmd.current_dir(self.work_dir.path());
        cmd
    }

    fn try_run(&mut self, request: &ScriptRequest) -> Result<ScriptOutput> {
        let file = self.write_script(request)?;
        info!(
            script = %request.name,
            script_type = %request.script_type,
            path = %file.path().display(),
            "executing script"
        );
        debug!(
            preview = %truncate_chars(&request.content, PREVIEW_CHARS),
            "script content"
        );

        let mut cmd = self.command_for(&request.script_type, file.path());
        cmd.envs(&request.env);
        let output =
            run_command_with_timeout(cmd, request.timeout, self.output_limit_bytes, &self.cancel)?;

        let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        stdout.push_str(&output.stdout_truncated_notice("script"));
        let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        stderr.push_str(&output.stderr_truncated_notice("script"));

        // `file` lives until here so a temporary script outlives its process.
        drop(file);

        if output.cancelled {
            return Ok(ScriptOutput::cancelled(stdout, stderr));
        }
        if output.timed_out {
            return Ok(ScriptOutput::timed_out(request.timeout, stdout, stderr));
        }
        Ok(ScriptOutput::exited(output.status.code(), stdout, stderr))
    }
}

impl ScriptRunner for LocalScriptRunner {
    #[instrument(skip_all, fields(script = %request.name, timeout_secs = request.timeout.as_secs()))]
    fn run(&mut self, request: &ScriptRequest) -> ScriptOutput {
        let output = match self.try_run(request) {
            Ok(output) => output,
            Err(e) => {
                let reason = format!("{e:#}");
                warn!(err = %reason, "script could not be executed");
                ScriptOutput::spawn_failed(&reason)
            }
        };
        match output.failure {
            Some(RunFailure::TimedOut) => {
                warn!(timeout_secs = request.timeout.as_secs(), "script timed out");
            }
            Some(RunFailure::Cancelled) => warn!("script cancelled"),
            Some(RunFailure::SpawnFailed) => {}
            None => info!(success = output.success, exit_code = ?output.exit_code, "script finished"),
        }
        output
    }

    /// Remove an owned working directory and hand back the persisted script paths.
    fn finish(self) -> Vec<PathBuf> {
        if let WorkDir::Owned(dir) = self.work_dir {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!(work_dir = %path.display(), "removed working directory"),
                Err(e) => {
                    warn!(err = %e, work_dir = %path.display(), "failed to remove working directory");
                }
            }
        }
        self.generated_paths
    }
}

pub fn script_extension(script_type: &ScriptType) -> String {
    match script_type {
        ScriptType::Bash => ".sh".to_string(),
        ScriptType::Python => ".py".to_string(),
        ScriptType::Other(name) => format!(".{name}"),
    }
}

/// Reduce a path or URL to a file-name-safe component of at most 50 characters.
pub fn sanitize_source(source: &str) -> String {
    let replaced: String = source
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = replaced.trim_matches('_');
    let skip = trimmed.chars().count().saturating_sub(SOURCE_COMPONENT_MAX_CHARS);
    let start = trimmed
        .char_indices()
        .nth(skip)
        .map_or(trimmed.len(), |(index, _)| index);
    trimmed[start..].to_string()
}

/// `_gen-<source-or-script{index}>-<suffix><extension>`.
pub fn generated_file_name(
    source_context: Option<&str>,
    index: usize,
    extension: &str,
    suffix: &str,
) -> String {
    let component = source_context
        .map(sanitize_source)
        .filter(|component| !component.is_empty())
        .unwrap_or_else(|| format!("script{index}"));
    format!("_gen-{component}-{suffix}{extension}")
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| char::from(SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())]))
        .collect()
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("chmod {}", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
