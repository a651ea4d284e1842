use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_AI_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_AI_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Environment variables consulted for the AI credential, highest priority first.
const API_KEY_ENV_VARS: &[&str] = &["GROQ_API_KEY", "DEEPSEEK_API_KEY"];

// ── Paths ─────────────────────────────────────────────────────────────────────

/// Location of every artifact gitgoblin keeps for one repository.
///
/// All of them live inside the repository's `.git` directory so they are never
/// picked up by the watcher or committed by accident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoblinPaths {
    pub repo_root: PathBuf,
    pub git_dir: PathBuf,
    pub config_file: PathBuf,
    pub pid_file: PathBuf,
    pub lock_file: PathBuf,
    pub log_file: PathBuf,
}

impl GoblinPaths {
    pub fn for_repo(repo_root: impl Into<PathBuf>) -> Self {
        let repo_root = repo_root.into();
        let git_dir = repo_root.join(".git");
        Self {
            config_file: git_dir.join("gitgoblin.config.json"),
            pid_file: git_dir.join("gitgoblin.pid"),
            lock_file: git_dir.join("gitgoblin.lock"),
            log_file: git_dir.join("gitgoblin.log"),
            git_dir,
            repo_root,
        }
    }

    /// True when the root carries git metadata.
    pub fn is_repository(&self) -> bool {
        self.git_dir.exists()
    }
}

// ── Persisted configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GoblinConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groq_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_api_key: Option<String>,
    /// Legacy key from older releases.  Still honoured and preserved on
    /// save, but never set by this version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deepseek_api_key: Option<String>,
    pub ai_commits_enabled: bool,
    pub ai_model: String,
    pub ai_endpoint: String,
    /// Keys this version does not know about, kept so a save does not drop them.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for GoblinConfig {
    fn default() -> Self {
        Self {
            groq_api_key: None,
            ai_api_key: None,
            deepseek_api_key: None,
            ai_commits_enabled: false,
            ai_model: DEFAULT_AI_MODEL.to_string(),
            ai_endpoint: DEFAULT_AI_ENDPOINT.to_string(),
            extra: BTreeMap::new(),
        }
    }
}

impl GoblinConfig {
    /// Loads the config file; a missing file yields the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let Ok(raw) = fs::read_to_string(path) else {
            debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        };
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = serde_json::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// Resolves the AI credential.
    ///
    /// Environment variables win over the file, and within the file the Groq
    /// key wins over the generic key, which wins over the legacy key.
    pub fn api_key(&self) -> Option<String> {
        for var in API_KEY_ENV_VARS {
            if let Ok(value) = env::var(var) {
                if !value.trim().is_empty() {
                    return Some(value);
                }
            }
        }

        [&self.groq_api_key, &self.ai_api_key, &self.deepseek_api_key]
            .into_iter()
            .flatten()
            .find(|key| !key.trim().is_empty())
            .cloned()
    }

    /// Stores the key under both the Groq and the generic name.
    pub fn set_api_key(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.groq_api_key = Some(key.clone());
        self.ai_api_key = Some(key);
    }

    pub fn enable_ai_commits(&mut self, enabled: bool) {
        self.ai_commits_enabled = enabled;
    }

    pub fn is_ai_enabled(&self) -> bool {
        self.ai_commits_enabled
    }

    /// AI messages are attempted only with both a credential and the flag.
    pub fn ai_ready(&self) -> bool {
        self.is_ai_enabled() && self.api_key().is_some()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
