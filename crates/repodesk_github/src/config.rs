use std::env;
use std::fmt;

use thiserror::Error;

/// Default GitHub REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Gateway configuration loaded from environment variables
#[derive(Clone)]
pub struct GitHubConfig {
    /// Personal access token (`GITHUB_TOKEN`, required)
    pub token: String,
    /// API base URL (`GITHUB_API_URL`, default: https://api.github.com)
    pub api_url: String,
    /// User-Agent header (`REPODESK_USER_AGENT`, default: repodesk/<version>)
    pub user_agent: String,
    /// Credential for the code assistant (`REPODESK_ASSISTANT_KEY`). Not used by
    /// the gateway; it only decides whether the workspace is ready.
    pub assistant_key: Option<String>,
}

impl GitHubConfig {
    /// A configuration for `token` with every other setting at its default.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: DEFAULT_API_URL.to_string(),
            user_agent: default_user_agent(),
            assistant_key: None,
        }
    }

    /// Load configuration from environment variables, reading `.env` first.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let token = non_empty("GITHUB_TOKEN").ok_or(ConfigError::MissingToken)?;

        let api_url = non_empty("GITHUB_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        if !(api_url.starts_with("https://") || api_url.starts_with("http://")) {
            return Err(ConfigError::InvalidApiUrl(api_url));
        }

        let user_agent = non_empty("REPODESK_USER_AGENT").unwrap_or_else(default_user_agent);
        let assistant_key = non_empty("REPODESK_ASSISTANT_KEY");

        Ok(Self {
            token,
            api_url,
            user_agent,
            assistant_key,
        })
    }

    /// Set the assistant credential (builder pattern).
    pub fn with_assistant_key(mut self, key: impl Into<String>) -> Self {
        self.assistant_key = Some(key.into());
        self
    }

    /// Set the API base URL (builder pattern).
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Both credentials are present, so the workspace can be opened.
    pub fn is_ready(&self) -> bool {
        !self.token.is_empty() && self.assistant_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("user_agent", &self.user_agent)
            .field(
                "assistant_key",
                &self.assistant_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

fn default_user_agent() -> String {
    format!("repodesk/{}", env!("CARGO_PKG_VERSION"))
}

/// Invalid or missing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `GITHUB_TOKEN` is unset or empty.
    #[error("GITHUB_TOKEN is not set")]
    MissingToken,

    /// `GITHUB_API_URL` is not an http(s) URL.
    #[error("invalid GITHUB_API_URL: {0}")]
    InvalidApiUrl(String),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}
