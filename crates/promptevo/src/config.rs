//! Experiment file support for promptevo.
//!
//! Loads the experiment (base prompt, test cases, criteria and search
//! parameters) from `promptevo.toml`.

use anyhow::{Context, Result};
use promptevo_core::{OptimizationRequest, OptimizerConfig};
use promptevo_fitness::{EvaluationCriterion, FitnessOptions, PromptComponent, PromptTemplate, TestCase};
use promptevo_providers::{GeneratorKind, RateLimit};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The default experiment file name
pub const CONFIG_FILE_NAME: &str = "promptevo.toml";

/// Experiment loaded from `promptevo.toml`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Global default agent for every role
    pub agent: Option<String>,
    /// Global default model for every role
    pub model: Option<String>,
    /// Directory of documents the retriever searches, relative to the file
    pub corpus: Option<PathBuf>,
    pub base_prompt: BasePrompt,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub criteria: Vec<EvaluationCriterion>,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub evaluation: FitnessOptions,
    /// Model answering test-case queries with the candidate prompt
    #[serde(default)]
    pub generator: RoleConfig,
    /// Model scoring responses against the rubric
    #[serde(default)]
    pub judge: RoleConfig,
    /// Model used by rewrite mutations; local rewrites when absent
    pub rewriter: Option<RoleConfig>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Either one free-text prompt or named slots
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BasePrompt {
    Text(String),
    Slots(BTreeMap<String, String>),
}

impl BasePrompt {
    pub fn to_template(&self) -> PromptTemplate {
        match self {
            BasePrompt::Text(text) => PromptTemplate::single(text.trim()),
            BasePrompt::Slots(slots) => PromptTemplate::new(
                slots
                    .iter()
                    .map(|(name, text)| PromptComponent::new(name, text.trim()))
                    .collect(),
            ),
        }
    }
}

/// Configuration for one model role (generator, judge or rewriter)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    /// Agent to use for this role
    pub agent: Option<String>,
    /// Model to use for this role
    pub model: Option<String>,
    /// Per-call timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Program and arguments for a custom agent
    pub command: Option<Vec<String>>,
}

/// Provider pacing shared by every role
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    pub max_concurrent: usize,
    pub min_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            min_interval_ms: 0,
        }
    }
}

impl RateLimitConfig {
    pub fn to_rate_limit(&self) -> RateLimit {
        RateLimit {
            max_concurrent: self.max_concurrent.max(1),
            min_interval: Duration::from_millis(self.min_interval_ms),
        }
    }
}

/// A role with every precedence level applied
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRole {
    pub kind: GeneratorKind,
    pub model: Option<String>,
    pub timeout: Option<Duration>,
    pub command: Option<Vec<String>>,
}

impl ExperimentConfig {
    /// Load the experiment from an explicit path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let config: ExperimentConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Ok(config)
    }

    pub fn request(&self) -> OptimizationRequest {
        OptimizationRequest::new(
            self.base_prompt.to_template(),
            self.test_cases.clone(),
            self.criteria.clone(),
        )
    }

    /// Resolve a role.
    /// Priority: CLI override > [role] section > global setting > claude
    pub fn resolve_role(
        &self,
        role: &RoleConfig,
        agent_override: Option<&str>,
        model_override: Option<&str>,
    ) -> Result<ResolvedRole> {
        let agent = agent_override
            .or(role.agent.as_deref())
            .or(self.agent.as_deref())
            .unwrap_or("claude");
        let kind: GeneratorKind = agent.parse().map_err(|e: String| anyhow::anyhow!(e))?;

        let has_command = matches!(&role.command, Some(command) if !command.is_empty());
        if kind == GeneratorKind::Custom && !has_command {
            anyhow::bail!("Custom agent requires a non-empty `command` in its role section");
        }

        Ok(ResolvedRole {
            kind,
            model: model_override
                .or(role.model.as_deref())
                .or(self.model.as_deref())
                .map(str::to_string),
            timeout: role.timeout_secs.map(Duration::from_secs),
            command: role.command.clone(),
        })
    }
}
