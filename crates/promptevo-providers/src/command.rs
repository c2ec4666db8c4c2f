use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::{
    GenerateOptions, Generation, Generator, GeneratorKind, LlmError, ProcessOutput,
    ProcessSpawner, Usage,
};

/// Generator backed by an LLM command-line tool run as a child process
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    kind: GeneratorKind,
    name: String,
    binary_path: PathBuf,
    base_args: Vec<String>,
    model_flag: Option<String>,
    model: Option<String>,
    /// Pass `--` before the prompt so prompts starting with '-' are not read as options
    end_of_options: bool,
    timeout: Option<Duration>,
}

impl CommandGenerator {
    /// `claude --print [--model M] -- <prompt>`
    pub fn claude() -> Self {
        Self {
            kind: GeneratorKind::ClaudeCode,
            name: "Claude Code".to_string(),
            binary_path: PathBuf::from("claude"),
            base_args: vec!["--print".to_string()],
            model_flag: Some("--model".to_string()),
            model: None,
            end_of_options: true,
            timeout: None,
        }
    }

    /// `opencode run [--model M] <prompt>`
    pub fn opencode() -> Self {
        Self {
            kind: GeneratorKind::OpenCode,
            name: "OpenCode".to_string(),
            binary_path: PathBuf::from("opencode"),
            base_args: vec!["run".to_string()],
            model_flag: Some("--model".to_string()),
            model: None,
            end_of_options: false,
            timeout: None,
        }
    }

    /// Any command that prints a completion for a prompt given as its last argument
    pub fn custom(binary_path: impl Into<PathBuf>, base_args: Vec<String>) -> Self {
        let binary_path = binary_path.into();
        Self {
            kind: GeneratorKind::Custom,
            name: binary_path.display().to_string(),
            binary_path,
            base_args,
            model_flag: None,
            model: None,
            end_of_options: false,
            timeout: None,
        }
    }

    pub fn for_kind(kind: GeneratorKind) -> Self {
        match kind {
            GeneratorKind::ClaudeCode => Self::claude(),
            GeneratorKind::OpenCode => Self::opencode(),
            GeneratorKind::Custom => Self::custom("llm", Vec::new()),
        }
    }

    pub fn with_binary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary_path = path.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_model_flag(mut self, flag: impl Into<String>) -> Self {
        self.model_flag = Some(flag.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn kind(&self) -> GeneratorKind {
        self.kind
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Check if the provider CLI is installed and runnable
    pub async fn is_available(&self) -> bool {
        Command::new(&self.binary_path)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn build_args<'a>(&'a self, prompt: &'a str) -> Vec<&'a str> {
        let mut args: Vec<&str> = self.base_args.iter().map(String::as_str).collect();
        if let (Some(flag), Some(model)) = (&self.model_flag, &self.model) {
            args.push(flag);
            args.push(model);
        }
        if self.end_of_options {
            args.push("--");
        }
        args.push(prompt);
        args
    }
}

#[async_trait]
impl Generator for CommandGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation, LlmError> {
        // CLI providers expose no sampling controls; temperature is advisory here
        debug!(
            generator = self.name(),
            prompt_len = prompt.len(),
            temperature = options.temperature,
            "Invoking command generator"
        );

        let full_prompt = match &options.system {
            Some(system) => format!("{}\n\n{}", system, prompt),
            None => prompt.to_string(),
        };

        let args = self.build_args(&full_prompt);
        let output = ProcessSpawner::spawn(&self.binary_path, &args, self.timeout).await?;

        if !output.success() {
            return Err(classify_failure(&output));
        }

        let text = output.stdout.trim().to_string();
        if text.is_empty() {
            return Err(LlmError::Malformed(
                "provider exited successfully with empty output".into(),
            ));
        }

        let usage = Usage::estimate(&full_prompt, &text);
        Ok(Generation::new(text, usage, output.duration))
    }
}

/// Map a failed provider process onto the typed error taxonomy
pub fn classify_failure(output: &ProcessOutput) -> LlmError {
    let detail = if output.stderr.trim().is_empty() {
        output.stdout.trim()
    } else {
        output.stderr.trim()
    };
    let lower = detail.to_lowercase();

    if lower.contains("rate limit") || lower.contains("429") || lower.contains("too many requests")
    {
        LlmError::RateLimited {
            message: truncate(detail, 300),
            retry_after: None,
        }
    } else if lower.contains("unauthorized")
        || lower.contains("401")
        || lower.contains("api key")
        || lower.contains("authentication")
    {
        LlmError::Auth(truncate(detail, 300))
    } else {
        LlmError::Server(format!(
            "exit code {}: {}",
            output.exit_code,
            truncate(detail, 300)
        ))
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
