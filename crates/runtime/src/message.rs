//! Commit message generation.
//!
//! Two strategies sit behind [`MessageStrategy`]: a deterministic heuristic
//! over `git diff --numstat`, and an AI strategy that asks a chat model for a
//! conventional-commit message.  [`MessageGenerator`] tries the AI strategy
//! when it is configured and falls back to the heuristic on any failure, so
//! [`MessageGenerator::generate`] always yields a message.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use goblin_config::GoblinConfig;
use goblin_exec::{DiffSummary, Scope, Vcs, VcsError};
use goblin_llm::{ChatCompletion, CompletionError, GroqClient};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Bytes of diff sent upstream, to stay inside the model's token budget.
pub const AI_DIFF_BUDGET: usize = 3000;

const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant that generates concise, \
    descriptive git commit messages following conventional commits format.";

const PROMPT_RULES: &str = "You are an expert software developer writing git commit messages.
Generate a clear, descriptive commit message following these rules:

1. Use conventional commits format: <type>: <description>
2. Types: feat, fix, docs, style, refactor, test, chore
3. Keep the first line under 72 characters
4. If changes are complex, add a blank line and detailed bullet points
5. Be specific about what changed and why
6. Focus on the impact and purpose, not just what was done
";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no changes to describe")]
    NothingToDescribe,

    #[error("could not read changes: {0}")]
    Vcs(#[from] VcsError),

    #[error("text generation failed: {0}")]
    Upstream(#[from] CompletionError),

    #[error("model returned an empty message")]
    EmptyMessage,
}

#[async_trait]
pub trait MessageStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn generate(&self, scope: &Scope) -> Result<String, GenerationError>;
}

/// Local timestamp appended to heuristic messages.
pub fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

// ── Heuristic ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Modified,
    Added,
    Removed,
    Updated,
}

impl ChangeKind {
    pub fn classify(summary: DiffSummary) -> Self {
        match (summary.insertions > 0, summary.deletions > 0) {
            (true, true) => Self::Modified,
            (true, false) => Self::Added,
            (false, true) => Self::Removed,
            (false, false) => Self::Updated,
        }
    }

    pub fn describe(self, scope: &Scope) -> String {
        match self {
            Self::Modified => format!("Modified {scope}"),
            Self::Added => format!("Added content to {scope}"),
            Self::Removed => format!("Removed content from {scope}"),
            Self::Updated => format!("Updated {scope}"),
        }
    }
}

pub struct HeuristicStrategy {
    vcs: Arc<dyn Vcs>,
}

impl HeuristicStrategy {
    pub fn new(vcs: Arc<dyn Vcs>) -> Self {
        Self { vcs }
    }

    /// Total: a git failure degrades to `Updated <scope> at <timestamp>`.
    pub async fn describe(&self, scope: &Scope) -> String {
        let kind = match self.vcs.diff_numstat(scope).await {
            Ok(summary) => ChangeKind::classify(summary),
            Err(err) => {
                debug!(%scope, error = %err, "diff unavailable; using generic message");
                ChangeKind::Updated
            }
        };
        format!("{} at {}", kind.describe(scope), timestamp())
    }
}

#[async_trait]
impl MessageStrategy for HeuristicStrategy {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn generate(&self, scope: &Scope) -> Result<String, GenerationError> {
        Ok(self.describe(scope).await)
    }
}

// ── AI-backed ─────────────────────────────────────────────────────────────────

pub struct AiStrategy {
    vcs: Arc<dyn Vcs>,
    client: Arc<dyn ChatCompletion>,
}

impl AiStrategy {
    pub fn new(vcs: Arc<dyn Vcs>, client: Arc<dyn ChatCompletion>) -> Self {
        Self { vcs, client }
    }
}

#[async_trait]
impl MessageStrategy for AiStrategy {
    fn name(&self) -> &'static str {
        "ai"
    }

    async fn generate(&self, scope: &Scope) -> Result<String, GenerationError> {
        let mut diff = self.vcs.diff_text(scope, true).await?;
        if diff.is_empty() {
            diff = self.vcs.diff_text(scope, false).await?;
        }
        let status = self.vcs.short_status(scope).await?.join("\n");
        if diff.is_empty() && status.is_empty() {
            return Err(GenerationError::NothingToDescribe);
        }

        let prompt = build_prompt(scope, &status, &diff);
        let raw = self.client.complete(SYSTEM_INSTRUCTION, &prompt).await?;
        let message = clean_message(&raw);
        if message.is_empty() {
            return Err(GenerationError::EmptyMessage);
        }
        Ok(message)
    }
}

pub fn build_prompt(scope: &Scope, status: &str, diff: &str) -> String {
    let mut prompt = String::from(PROMPT_RULES);
    if let Some(path) = scope.path() {
        prompt.push_str(&format!("\nFile modified: {path}\n"));
    }
    if !status.is_empty() {
        prompt.push_str(&format!("\nGit Status:\n{status}\n"));
    }
    if !diff.is_empty() {
        let preview = truncate_at_boundary(diff, AI_DIFF_BUDGET);
        prompt.push_str(&format!("\nGit Diff:\n```\n{preview}\n```\n"));
    }
    prompt.push_str("\nGenerate ONLY the commit message, no explanations or additional text:");
    prompt
}

/// Longest prefix of `text` no longer than `max` bytes that ends on a char boundary.
pub fn truncate_at_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Trims whitespace and any wrapping quote characters.
pub fn clean_message(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}

// ── Composition ───────────────────────────────────────────────────────────────

pub struct MessageGenerator {
    ai: Option<Box<dyn MessageStrategy>>,
    heuristic: HeuristicStrategy,
}

impl MessageGenerator {
    pub fn heuristic_only(vcs: Arc<dyn Vcs>) -> Self {
        Self {
            ai: None,
            heuristic: HeuristicStrategy::new(vcs),
        }
    }

    pub fn with_ai(vcs: Arc<dyn Vcs>, client: Arc<dyn ChatCompletion>) -> Self {
        Self {
            ai: Some(Box::new(AiStrategy::new(Arc::clone(&vcs), client))),
            heuristic: HeuristicStrategy::new(vcs),
        }
    }

    /// AI strategy only when the config has both a credential and the flag.
    pub fn from_config(vcs: Arc<dyn Vcs>, config: &GoblinConfig) -> Self {
        if !config.is_ai_enabled() {
            return Self::heuristic_only(vcs);
        }
        let Some(key) = config.api_key() else {
            warn!("AI commit messages enabled but no API key is configured");
            return Self::heuristic_only(vcs);
        };
        match GroqClient::new(key, config.ai_endpoint.clone(), config.ai_model.clone()) {
            Ok(client) => Self::with_ai(vcs, Arc::new(client)),
            Err(err) => {
                warn!(error = %err, "could not build AI client; using heuristic messages");
                Self::heuristic_only(vcs)
            }
        }
    }

    pub fn ai_enabled(&self) -> bool {
        self.ai.is_some()
    }

    pub async fn generate(&self, scope: &Scope) -> String {
        if let Some(ai) = &self.ai {
            match ai.generate(scope).await {
                Ok(message) => return message,
                Err(err) => {
                    info!(%scope, strategy = ai.name(), error = %err, "falling back to heuristic message");
                }
            }
        }
        self.heuristic.describe(scope).await
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
