//! Test-only fakes for the pipeline seams.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::PathBuf;

use crate::cancel::CancelToken;
use crate::core::docs::DocumentationSet;
use crate::error::{FetchError, ProviderError};
use crate::io::fetcher::SourceLoader;
use crate::io::provider::ModelGateway;
use crate::io::script_runner::{ScriptOutput, ScriptRequest, ScriptRunner};

/// Wrap `body` in a fenced block tagged `language`, followed by a blank line.
pub fn fenced(language: &str, body: &str) -> String {
    format!("```{language}\n{body}\n```\n\n")
}

/// Loader returning a fixed documentation set, or a single error.
pub struct StaticLoader {
    docs: DocumentationSet,
    error: RefCell<Option<FetchError>>,
}

impl StaticLoader {
    pub fn with_docs(docs: &[(&str, &str)]) -> Self {
        let mut set = DocumentationSet::new();
        for (id, text) in docs {
            set.insert((*id).to_string(), (*text).to_string());
        }
        Self {
            docs: set,
            error: RefCell::new(None),
        }
    }

    pub fn failing(error: FetchError) -> Self {
        Self {
            docs: DocumentationSet::new(),
            error: RefCell::new(Some(error)),
        }
    }
}

impl SourceLoader for StaticLoader {
    fn fetch(&self, sources: &[String]) -> Result<DocumentationSet, FetchError> {
        if let Some(error) = self.error.borrow_mut().take() {
            return Err(error);
        }
        if sources.is_empty() {
            return Err(FetchError::NoSources);
        }
        Ok(self.docs.clone())
    }
}

/// A prompt seen by [`ScriptedGateway`].
#[derive(Debug, Clone)]
pub struct SentPrompt {
    pub prompt: String,
    pub system: Option<String>,
}

/// Gateway replaying canned replies in order.
pub struct ScriptedGateway {
    replies: VecDeque<String>,
    error: Option<ProviderError>,
    sent: Vec<SentPrompt>,
}

impl ScriptedGateway {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: replies.into(),
            error: None,
            sent: Vec::new(),
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            replies: VecDeque::new(),
            error: Some(error),
            sent: Vec::new(),
        }
    }

    pub fn prompts(&self) -> &[SentPrompt] {
        &self.sent
    }
}

impl ModelGateway for ScriptedGateway {
    fn send(&mut self, prompt: &str, system: Option<&str>) -> Result<String, ProviderError> {
        self.sent.push(SentPrompt {
            prompt: prompt.to_string(),
            system: system.map(str::to_string),
        });
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        self.replies
            .pop_front()
            .ok_or_else(|| ProviderError::MalformedResponse {
                provider: "Scripted".to_string(),
                message: "no scripted reply left".to_string(),
            })
    }
}

/// Runner that records requests and fails the scripts it is told to fail.
#[derive(Default)]
pub struct ScriptedRunner {
    failures: Vec<String>,
    cancel_on: Option<(String, CancelToken)>,
    requests: Vec<ScriptRequest>,
    saved: Vec<PathBuf>,
}

impl ScriptedRunner {
    pub fn passing() -> Self {
        Self::default()
    }

    pub fn with_failures(names: &[&str]) -> Self {
        Self {
            failures: names.iter().map(|name| (*name).to_string()).collect(),
            ..Self::default()
        }
    }

    /// Cancel `token` while the script called `name` is running.
    pub fn cancel_during(mut self, name: &str, token: CancelToken) -> Self {
        self.cancel_on = Some((name.to_string(), token));
        self
    }

    /// Report `paths` from [`ScriptRunner::finish`].
    pub fn saving(mut self, paths: Vec<PathBuf>) -> Self {
        self.saved = paths;
        self
    }

    pub fn requests(&self) -> &[ScriptRequest] {
        &self.requests
    }

    pub fn executed(&self) -> Vec<String> {
        self.requests.iter().map(|req| req.name.clone()).collect()
    }
}

impl ScriptRunner for ScriptedRunner {
    fn run(&mut self, request: &ScriptRequest) -> ScriptOutput {
        self.requests.push(request.clone());
        if let Some((name, token)) = &self.cancel_on
            && *name == request.name
        {
            token.cancel();
            return ScriptOutput::cancelled(String::new(), String::new());
        }
        if self.failures.contains(&request.name) {
            ScriptOutput::exited(Some(1), String::new(), format!("{} failed\n", request.name))
        } else {
            ScriptOutput::exited(Some(0), format!("{} ok\n", request.name), String::new())
        }
    }

    fn finish(self) -> Vec<PathBuf> {
        self.saved
    }
}
