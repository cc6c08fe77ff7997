//! HTTP client for the triage backend
//!
//! Creates the reqwest client used to poll the backend API.

use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Backend API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL (default: http://localhost:5000)
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retries per request after the first attempt
    pub max_retries: u32,
    /// Delay added per retry, in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout_secs: 10,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl ApiConfig {
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Full URL for an API path such as `/api/victims`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Errors from data sources
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Max retries ({0}) exceeded: {1}")]
    MaxRetries(u32, String),
}

impl SourceError {
    /// Transport failures and 5xx responses may succeed on a later attempt;
    /// client errors and undecodable bodies will not
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Request(_) => true,
            SourceError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Create the backend HTTP client
pub fn create_client(config: &ApiConfig) -> Result<Client, SourceError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(concat!("rescue-triage/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SourceError::ClientBuild(e.to_string()))
}

/// Check if the backend API is reachable
pub async fn check_api_connection(config: &ApiConfig) -> Result<bool, SourceError> {
    let client = create_client(config)?;

    let result = client.get(config.endpoint("/api/stats")).send().await;

    match result {
        Ok(resp) => Ok(resp.status().is_success()),
        Err(_) => Ok(false),
    }
}
