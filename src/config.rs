//! Client configuration
//!
//! Values are resolved in priority order: explicit builder values, then
//! environment variables, then `config/actlink.toml` (or a file given to the
//! builder), then defaults.

use crate::core::{Result, ValidationError};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const DEFAULT_BASE_URL: &str = "https://backend.composio.dev";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ENTITY_ID: &str = "default";
pub const DEFAULT_CONFIG_FILE: &str = "config/actlink.toml";

/// Default delay between run status checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How the assistant-run poller waits between status checks.
///
/// With neither `max_attempts` nor `deadline` set the loop only ends when the
/// remote run leaves the active states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
            deadline: None,
        }
    }
}

impl PollPolicy {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_bounded(&self) -> bool {
        self.max_attempts.is_some() || self.deadline.is_some()
    }

    /// Start tracking attempts against this policy
    pub fn budget(&self) -> PollBudget {
        PollBudget {
            policy: *self,
            attempts: 0,
            started: Instant::now(),
        }
    }
}

/// Attempt/deadline tracker for one polling loop
#[derive(Debug)]
pub struct PollBudget {
    policy: PollPolicy,
    attempts: u32,
    started: Instant,
}

impl PollBudget {
    /// Consume one attempt. Returns `false` once the policy is exhausted.
    pub fn try_consume(&mut self) -> bool {
        if let Some(max) = self.policy.max_attempts {
            if self.attempts >= max {
                return false;
            }
        }
        if let Some(deadline) = self.policy.deadline {
            if self.started.elapsed() >= deadline {
                return false;
            }
        }
        self.attempts += 1;
        true
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// LLM provider settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
        }
    }
}

/// Resolved configuration for the backend and LLM clients
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub entity_id: String,
    pub llm: LlmConfig,
    pub poll: PollPolicy,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Resolve from the environment and the default config file
    pub fn from_env() -> Result<Self> {
        Self::builder().build()
    }

    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    client: Option<FileClientSection>,
    llm: Option<FileLlmSection>,
    poll: Option<FilePollSection>,
}

#[derive(Debug, Default, Deserialize)]
struct FileClientSection {
    api_key: Option<String>,
    base_url: Option<String>,
    entity_id: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileLlmSection {
    api_key: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FilePollSection {
    interval_ms: Option<u64>,
    max_attempts: Option<u32>,
    deadline_secs: Option<u64>,
}

impl FileConfig {
    fn load(path: &Path, required: bool) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) if !required => return Ok(Self::default()),
            Err(e) => {
                return Err(ValidationError::single(
                    "config_file",
                    format!("cannot read {}: {}", path.display(), e),
                )
                .into())
            }
        };
        toml::from_str(&content).map_err(|e| {
            ValidationError::single("config_file", format!("{}: {}", path.display(), e)).into()
        })
    }
}

/// Builder for [`ClientConfig`]
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    entity_id: Option<String>,
    llm_api_key: Option<String>,
    llm_base_url: Option<String>,
    poll: Option<PollPolicy>,
    request_timeout: Option<Duration>,
    config_file: Option<PathBuf>,
    use_env: bool,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            entity_id: None,
            llm_api_key: None,
            llm_base_url: None,
            poll: None,
            request_timeout: None,
            config_file: None,
            use_env: true,
        }
    }
}

impl ClientConfigBuilder {
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn llm_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.llm_api_key = Some(api_key.into());
        self
    }

    pub fn llm_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.llm_base_url = Some(base_url.into());
        self
    }

    pub fn poll(mut self, poll: PollPolicy) -> Self {
        self.poll = Some(poll);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Read this file instead of `config/actlink.toml`. Unlike the default
    /// file, an explicit one must exist.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Skip environment variables entirely
    pub fn ignore_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        let file = match &self.config_file {
            Some(path) => FileConfig::load(path, true)?,
            None => FileConfig::load(Path::new(DEFAULT_CONFIG_FILE), false)?,
        };
        let client = file.client.unwrap_or_default();
        let llm = file.llm.unwrap_or_default();
        let poll_file = file.poll.unwrap_or_default();

        let env = |key: &str| -> Option<String> {
            if !self.use_env {
                return None;
            }
            std::env::var(key).ok().filter(|v| !v.is_empty())
        };

        let api_key = self
            .api_key
            .clone()
            .or_else(|| env("COMPOSIO_API_KEY"))
            .or(client.api_key);
        let base_url = self
            .base_url
            .clone()
            .or_else(|| env("COMPOSIO_BASE_URL"))
            .or(client.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let entity_id = self
            .entity_id
            .clone()
            .or_else(|| env("COMPOSIO_ENTITY_ID"))
            .or(client.entity_id)
            .unwrap_or_else(|| DEFAULT_ENTITY_ID.to_string());
        let llm_api_key = self
            .llm_api_key
            .clone()
            .or_else(|| env("OPENAI_API_KEY"))
            .or(llm.api_key);
        let llm_base_url = self
            .llm_base_url
            .clone()
            .or_else(|| env("OPENAI_BASE_URL"))
            .or(llm.base_url)
            .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string());

        let poll = self.poll.unwrap_or_else(|| {
            let mut policy = PollPolicy::default();
            if let Some(ms) = poll_file.interval_ms {
                policy.interval = Duration::from_millis(ms);
            }
            policy.max_attempts = poll_file.max_attempts;
            policy.deadline = poll_file.deadline_secs.map(Duration::from_secs);
            policy
        });
        let request_timeout = self
            .request_timeout
            .or_else(|| client.request_timeout_secs.map(Duration::from_secs))
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let mut violations = ValidationError::new();
        if api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            violations.push(
                "api_key",
                "missing; pass it explicitly or set COMPOSIO_API_KEY",
            );
        }
        if !is_http_url(&base_url) {
            violations.push("base_url", format!("not an http(s) URL: {}", base_url));
        }
        if entity_id.trim().is_empty() {
            violations.push("entity_id", "must not be empty");
        }
        if !is_http_url(&llm_base_url) {
            violations.push(
                "llm.base_url",
                format!("not an http(s) URL: {}", llm_base_url),
            );
        }
        if poll.interval.is_zero() {
            violations.push("poll.interval", "must be greater than zero");
        }
        violations.into_result()?;

        Ok(ClientConfig {
            api_key: SecretString::from(api_key.unwrap_or_default()),
            base_url: base_url.trim_end_matches('/').to_string(),
            entity_id,
            llm: LlmConfig {
                api_key: llm_api_key.map(SecretString::from),
                base_url: llm_base_url.trim_end_matches('/').to_string(),
            },
            poll,
            request_timeout,
        })
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_explicit_values_win() {
        let config = ClientConfig::builder()
            .ignore_env()
            .api_key("key-123")
            .base_url("http://localhost:9000/")
            .entity_id("alice")
            .build()
            .unwrap();

        assert_eq!(config.api_key(), "key-123");
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.entity_id, "alice");
        assert_eq!(config.poll, PollPolicy::default());
        assert_eq!(config.llm.base_url, DEFAULT_LLM_BASE_URL);
    }

    #[test]
    fn test_reports_every_invalid_field() {
        let err = ClientConfig::builder()
            .ignore_env()
            .base_url("ftp://nowhere")
            .entity_id(" ")
            .build()
            .unwrap_err();

        match err {
            crate::core::SdkError::Validation(v) => {
                assert_eq!(v.fields(), vec!["api_key", "base_url", "entity_id"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_reads_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[client]
api_key = "from-file"
entity_id = "bob"

[llm]
base_url = "http://localhost:8080/v1"

[poll]
interval_ms = 50
max_attempts = 4
"#
        )
        .unwrap();

        let config = ClientConfig::builder()
            .ignore_env()
            .config_file(file.path())
            .build()
            .unwrap();

        assert_eq!(config.api_key(), "from-file");
        assert_eq!(config.entity_id, "bob");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.llm.base_url, "http://localhost:8080/v1");
        assert_eq!(config.poll.interval, Duration::from_millis(50));
        assert_eq!(config.poll.max_attempts, Some(4));
        assert!(config.poll.deadline.is_none());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = ClientConfig::builder()
            .ignore_env()
            .api_key("k")
            .config_file("/definitely/not/here.toml")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_poll_budget_respects_max_attempts() {
        let mut budget = PollPolicy::default().with_max_attempts(2).budget();
        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert!(!budget.try_consume());
        assert_eq!(budget.attempts(), 2);
    }

    #[test]
    fn test_unbounded_policy_never_exhausts() {
        let policy = PollPolicy::default();
        assert!(!policy.is_bounded());
        let mut budget = policy.budget();
        for _ in 0..1000 {
            assert!(budget.try_consume());
        }
    }
}
