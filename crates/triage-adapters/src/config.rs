//! Provider settings: the `[providers]` table of the triage config file.
//!
//! ```toml
//! [providers]
//! fixtures = "fixtures/tickets.json"
//!
//! [providers.github]
//! api_url = "https://api.github.com"
//! token_env = "GITHUB_TOKEN"
//!
//! [providers.linear]
//! deployed_state = "Deployed to Prod"
//!
//! [providers.ollama]
//! base_url = "http://localhost:11434"
//! model = "llama3.2"
//! ```
//!
//! Credentials are never stored in the file; each provider names the
//! environment variable that holds its token.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_url: String,
    pub token_env: String,
    /// Base branch merged pull requests must target.
    pub base_branch: String,
    pub per_page: u32,
    pub request_timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            base_branch: "main".to_string(),
            per_page: 100,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearConfig {
    pub api_url: String,
    pub token_env: String,
    /// Workflow state marking an issue as shipped.
    pub deployed_state: String,
    pub page_size: u32,
    pub request_timeout_secs: u64,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.linear.app/graphql".to_string(),
            token_env: "LINEAR_API_KEY".to_string(),
            deployed_state: "Deployed to Prod".to_string(),
            page_size: 100,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("OLLAMA_HOST")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            model: "llama3.2".to_string(),
            temperature: 0.0,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub github: GithubConfig,
    pub linear: LinearConfig,
    pub ollama: OllamaConfig,
    /// JSON fixture file with tickets, code changes and features.
    pub fixtures: Option<PathBuf>,
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    providers: ProviderConfig,
}

impl ProviderConfig {
    /// Read the `[providers]` table from `path`. A missing file or table
    /// yields defaults. A relative `fixtures` path resolves against the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| AdapterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&raw).map_err(|source| AdapterError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        let mut providers = file.providers;
        if let (Some(fixtures), Some(dir)) = (providers.fixtures.as_mut(), path.parent()) {
            if fixtures.is_relative() {
                *fixtures = dir.join(&*fixtures);
            }
        }
        Ok(providers)
    }
}

/// Read a credential from the named environment variable.
pub fn credential(env_var: &str) -> Result<String> {
    match std::env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AdapterError::MissingCredential(env_var.to_string())),
    }
}
