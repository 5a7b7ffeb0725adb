use crate::Result;
use mirage_config::AuthConfig;
use regex::Regex;

/// Pattern-based password gate.
///
/// Meant to let most attackers in while still refusing some attempts, the
/// way a real box with a weak password would.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    password: Regex,
    username: Option<Regex>,
}

impl AuthPolicy {
    pub fn new(password_pattern: &str, username_pattern: Option<&str>) -> Result<Self> {
        Ok(Self {
            password: Regex::new(password_pattern)?,
            username: username_pattern.map(Regex::new).transpose()?,
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Self::new(&config.password_regex, config.username_regex.as_deref())
    }

    /// Both patterns must match when a username pattern is configured.
    #[must_use]
    pub fn allows(&self, username: &str, password: &str) -> bool {
        self.password.is_match(password)
            && self
                .username
                .as_ref()
                .is_none_or(|pattern| pattern.is_match(username))
    }
}
