//! Prompt rendering for script generation.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::docs::{DocumentationSet, format_documentation};

const SYSTEM_PROMPT: &str = include_str!("prompts/system.md");
const TASK_TEMPLATE: &str = include_str!("prompts/task.md");

/// Fixed system instruction: the model acts as a documentation-testing expert.
pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT.trim_end()
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("task", TASK_TEMPLATE)
            .context("load task prompt template")?;
        Ok(Self { env })
    }

    /// Documentation, optional operator instructions, then the fixed task rules.
    pub fn render_task(&self, docs: &DocumentationSet, instructions: Option<&str>) -> Result<String> {
        let template = self.env.get_template("task")?;
        let rendered = template
            .render(context! {
                documentation => format_documentation(docs),
                instructions => instructions.map(str::trim).filter(|s| !s.is_empty()),
            })
            .context("render task prompt")?;
        debug!(chars = rendered.len(), "rendered task prompt");
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs() -> DocumentationSet {
        let mut docs = DocumentationSet::new();
        docs.insert("README.md".to_string(), "Run `make install`.".to_string());
        docs
    }

    #[test]
    fn task_prompt_contains_docs_and_rules() {
        let engine = PromptEngine::new().expect("engine");
        let prompt = engine.render_task(&docs(), None).expect("render");

        assert!(prompt.starts_with("Here is the documentation I need you to test:"));
        assert!(prompt.contains("=== Documentation from: README.md ==="));
        assert!(prompt.contains("Run `make install`."));
        assert!(prompt.contains("Cleanup scripts LAST"));
        assert!(prompt.contains("DO NOT generate \"runner\" scripts"));
        assert!(prompt.contains("```bash"));
        assert!(!prompt.contains("Additional Instructions"));
        assert!(!prompt.contains("5. Address"));
    }

    #[test]
    fn instructions_add_section_and_rule() {
        let engine = PromptEngine::new().expect("engine");
        let prompt = engine
            .render_task(&docs(), Some("  Use Python 3.12 only.  "))
            .expect("render");

        assert!(prompt.contains("## Additional Instructions\n\nUse Python 3.12 only."));
        assert!(prompt.contains("4. Verify everything works as documented\n5. Address the additional instructions provided above"));
    }

    #[test]
    fn blank_instructions_are_ignored() {
        let engine = PromptEngine::new().expect("engine");
        let prompt = engine.render_task(&docs(), Some("   ")).expect("render");
        assert!(!prompt.contains("Additional Instructions"));
    }

    #[test]
    fn system_prompt_names_the_role() {
        assert!(system_prompt().starts_with("You are an expert software engineer and documentation tester."));
    }
}
