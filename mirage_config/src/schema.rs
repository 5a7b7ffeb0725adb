use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

const CONFIG_DIR_NAME: &str = "mirage";
const CONFIG_FILE_NAME: &str = "config.json";

/// Process-wide settings. Loaded once at startup, then passed by reference.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_ssh_banner")]
    pub ssh_banner: String,
    #[serde(default = "ServerConfig::default_motd")]
    pub motd: String,
    #[serde(default = "ServerConfig::default_host_key_path")]
    pub host_key_path: PathBuf,
    /// Host shown in prompts. Falls back to the address the peer connected to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ssh_banner: Self::default_ssh_banner(),
            motd: Self::default_motd(),
            host_key_path: Self::default_host_key_path(),
            hostname: None,
        }
    }
}

impl ServerConfig {
    fn default_ssh_banner() -> String {
        "SSH-2.0-OpenSSH_8.2p1 Ubuntu-4ubuntu0.5".to_string()
    }

    fn default_motd() -> String {
        "Welcome to Ubuntu 24.04.2 LTS (GNU/Linux 6.8.0-1027-generic x86_64)\r\n\
         \r\n \
         * Documentation:  https://help.ubuntu.com\r\n \
         * Management:     https://landscape.canonical.com\r\n \
         * Support:        https://ubuntu.com/pro\r\n\r\n"
            .to_string()
    }

    fn default_host_key_path() -> PathBuf {
        Config::data_dir().join("host_key")
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_password_regex")]
    pub password_regex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_regex: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password_regex: Self::default_password_regex(),
            username_regex: None,
        }
    }
}

impl AuthConfig {
    fn default_password_regex() -> String {
        "^(123456|root)$".to_string()
    }
}

/// Backend families the honeypot can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProviderKind {
    OpenAi,
    DeepSeek,
    Grok,
    Ollama,
}

impl ProviderKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
            Self::Grok => "grok",
            Self::Ollama => "ollama",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "deepseek" => Ok(Self::DeepSeek),
            "grok" => Ok(Self::Grok),
            "ollama" => Ok(Self::Ollama),
            other => Err(format!(
                "unsupported LLM provider '{other}' (expected openai, deepseek, grok or ollama)"
            )),
        }
    }
}

impl TryFrom<String> for ProviderKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProviderKind> for String {
    fn from(kind: ProviderKind) -> Self {
        kind.as_str().to_string()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Overrides the provider's default chat endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Custom system prompt template; `{username}` and `{host}` are substituted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default = "LlmConfig::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "LlmConfig::default_retry_delays_ms")]
    pub retry_delays_ms: Vec<u64>,
}

impl LlmConfig {
    #[must_use]
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            api_key: None,
            endpoint: None,
            system_prompt: None,
            request_timeout_secs: Self::default_request_timeout_secs(),
            retry_delays_ms: Self::default_retry_delays_ms(),
        }
    }

    const fn default_request_timeout_secs() -> u64 {
        30
    }

    fn default_retry_delays_ms() -> Vec<u64> {
        vec![500]
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "HistoryConfig::default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "HistoryConfig::default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "HistoryConfig::default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            database_path: Self::default_database_path(),
            ttl_secs: Self::default_ttl_secs(),
            cleanup_interval_secs: Self::default_cleanup_interval_secs(),
        }
    }
}

impl HistoryConfig {
    fn default_database_path() -> PathBuf {
        Config::data_dir().join("history.db")
    }

    const fn default_ttl_secs() -> u64 {
        3600
    }

    const fn default_cleanup_interval_secs() -> u64 {
        300
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuditConfig {
    #[serde(default = "AuditConfig::default_log_path")]
    pub log_path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: Self::default_log_path(),
        }
    }
}

impl AuditConfig {
    fn default_log_path() -> PathBuf {
        PathBuf::from("logs").join("mirage.jsonl")
    }
}

impl Config {
    /// `~/mirage`, or `./mirage` when no home directory is known.
    #[must_use]
    pub fn data_dir() -> PathBuf {
        dirs::home_dir().map_or_else(
            || PathBuf::from(CONFIG_DIR_NAME),
            |home| home.join(CONFIG_DIR_NAME),
        )
    }

    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::data_dir().join(CONFIG_FILE_NAME)
    }

    /// Load from `path` (or the default location), apply environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = path.map_or_else(Self::default_path, Path::to_path_buf);

        if !config_path.exists() {
            anyhow::bail!(
                "Config file not found at: {}. Please run 'mirage init' to create config.",
                config_path.display()
            );
        }

        let content = std::fs::read_to_string(&config_path)?;
        let mut config = Self::from_json_str(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        info!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply `LLM_PROVIDER`, `LLM_MODEL` and `API_SECRET_KEY`. Blank values
    /// are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = get("LLM_PROVIDER") {
            self.llm.provider = provider.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(model) = get("LLM_MODEL") {
            self.llm.model = model.trim().to_string();
        }
        if let Some(key) = get("API_SECRET_KEY") {
            self.llm.api_key = Some(key.trim().to_string());
        }

        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        Regex::new(&self.auth.password_regex)
            .map_err(|e| anyhow::anyhow!("Invalid auth.password_regex: {e}"))?;
        if let Some(pattern) = &self.auth.username_regex {
            Regex::new(pattern).map_err(|e| anyhow::anyhow!("Invalid auth.username_regex: {e}"))?;
        }
        if self.llm.model.trim().is_empty() {
            anyhow::bail!("llm.model must not be empty");
        }
        if self.history.ttl_secs == 0 {
            anyhow::bail!("history.ttl_secs must be greater than zero");
        }
        if self.history.cleanup_interval_secs == 0 {
            anyhow::bail!("history.cleanup_interval_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn create_config(path: Option<&Path>) -> anyhow::Result<PathBuf> {
        let config_path = path.map_or_else(Self::default_path, Path::to_path_buf);

        if config_path.exists() {
            anyhow::bail!(
                "Config file already exists at: {}. Please edit it directly.",
                config_path.display()
            );
        }
        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let config_template = r#"{
  "server": {
    "ssh_banner": "SSH-2.0-OpenSSH_8.2p1 Ubuntu-4ubuntu0.5"
  },
  "auth": {
    "password_regex": "^(123456|root)$"
  },
  "llm": {
    "provider": "openai",
    "model": "gpt-4o-mini",
    "api_key": "your-api-key-here",
    "request_timeout_secs": 30,
    "retry_delays_ms": [500]
  },
  "history": {
    "ttl_secs": 3600,
    "cleanup_interval_secs": 300
  },
  "audit": {
    "log_path": "logs/mirage.jsonl"
  }
}"#;

        std::fs::write(&config_path, config_template)?;
        info!("Created config file at {}", config_path.display());
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"{
        "auth": { "password_regex": "^(test123|admin)$" },
        "llm": { "provider": "Grok", "model": "grok-3-mini-fast-beta", "api_key": "my-key" }
    }"#;

    fn parse(content: &str) -> Config {
        Config::from_json_str(content).unwrap_or_else(|e| panic!("parse failed: {e}"))
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let config = parse(MINIMAL);

        assert_eq!(config.llm.provider, ProviderKind::Grok);
        assert_eq!(config.llm.api_key.as_deref(), Some("my-key"));
        assert_eq!(config.llm.request_timeout_secs, 30);
        assert_eq!(config.auth.password_regex, "^(test123|admin)$");
        assert_eq!(config.server.ssh_banner, "SSH-2.0-OpenSSH_8.2p1 Ubuntu-4ubuntu0.5");
        assert!(config.server.motd.starts_with("Welcome to Ubuntu"));
        assert_eq!(config.history.ttl_secs, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_replace_llm_settings() {
        let mut config = parse(MINIMAL);
        let env: HashMap<&str, &str> = [
            ("LLM_PROVIDER", "openai"),
            ("LLM_MODEL", "gpt-4o-mini"),
            ("API_SECRET_KEY", "my-env-key"),
        ]
        .into_iter()
        .collect();

        let applied = config.apply_env_overrides(|k| env.get(k).map(ToString::to_string));

        assert!(applied.is_ok());
        assert_eq!(config.llm.provider, ProviderKind::OpenAi);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.api_key.as_deref(), Some("my-env-key"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = parse(MINIMAL);

        let applied = config.apply_env_overrides(|_| Some("  ".to_string()));

        assert!(applied.is_ok());
        assert_eq!(config.llm.provider, ProviderKind::Grok);
        assert_eq!(config.llm.model, "grok-3-mini-fast-beta");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let result = Config::from_json_str(r#"{ "llm": { "provider": "gemini", "model": "x" } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_regex_fails_validation() {
        let mut config = parse(MINIMAL);
        config.auth.password_regex = "([".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn create_config_writes_loadable_template_once() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let path = dir.path().join("nested").join("config.json");

        assert!(Config::create_config(Some(&path)).is_ok());
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        let config = parse(&content);
        assert_eq!(config.llm.provider, ProviderKind::OpenAi);

        assert!(Config::create_config(Some(&path)).is_err());
    }
}
