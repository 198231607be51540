//! Prompt Loader
//!
//! Loads prompt templates from files or falls back to embedded defaults.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

/// Variables for the user turn of a composite task
#[derive(Debug, Clone, Serialize)]
pub struct RunPrompt {
    pub entity_a: String,
    pub entity_b: String,
    /// Game date, `YYYY-MM-DD`
    pub game_date: String,
    /// Wall-clock date of the run, `MM/DD/YYYY`
    pub today: String,
    /// Rendered dependency sections, absent for tasks without inputs
    pub context: Option<String>,
    /// Candidate being revised
    pub previous: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct CriticPrompt<'a> {
    task_instructions: &'a str,
    critic_instructions: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct CandidatePrompt<'a> {
    output: &'a str,
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars engine with HTML escaping disabled
    hbs: Handlebars<'static>,
    /// User override directory (e.g., `.courtside/prompts/`)
    user_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader that checks `<root>/.courtside/prompts/` before the embedded set
    pub fn new(root: impl AsRef<Path>) -> Self {
        let user_dir = root.as_ref().join(".courtside/prompts");
        let user_dir_exists = user_dir.is_dir();
        debug!(?user_dir, %user_dir_exists, "PromptLoader::new: called");

        Self {
            hbs: Self::engine(),
            user_dir: user_dir_exists.then_some(user_dir),
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            user_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name
    ///
    /// Checks in order:
    /// 1. User override: `.courtside/prompts/{name}.pmt`
    /// 2. Embedded fallback
    pub fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref user_dir) = self.user_dir {
            let path = user_dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in user override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read user prompt {}: {}", path.display(), e));
            }
        }

        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| eyre!("Prompt template not found: {}", name))
    }

    /// Render a named template with the given context
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.render_str(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }

    /// Render an inline template
    pub fn render_str<T: Serialize>(&self, template: &str, context: &T) -> Result<String> {
        self.hbs
            .render_template(template, context)
            .map_err(|e| eyre!("Failed to render template: {}", e))
    }

    /// The user turn shared by worker and critic
    pub fn run_prompt(&self, prompt: &RunPrompt) -> Result<String> {
        self.render("run", prompt)
    }

    /// Critic system instruction: task instructions followed by the critic's own,
    /// with the candidate substituted for `{{output}}`
    pub fn critic_instructions(&self, task_instructions: &str, critic_template: &str, candidate: &str) -> Result<String> {
        debug!(candidate_len = candidate.len(), "PromptLoader::critic_instructions: called");
        let critic_instructions = self.render_str(critic_template, &CandidatePrompt { output: candidate })?;
        self.render(
            "critic",
            &CriticPrompt {
                task_instructions,
                critic_instructions: &critic_instructions,
            },
        )
    }
}

impl Default for PromptLoader {
    fn default() -> Self {
        Self::embedded_only()
    }
}
