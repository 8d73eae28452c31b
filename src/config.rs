use std::time::Duration;

/// Canonical host every recognized address is normalized to.
pub const DEFAULT_ENDPOINT: &str = "https://hf-mirror.com";

/// Hostnames treated as equivalent views of the same hub.
pub const MIRROR_HOSTS: &[&str] = &["hf-mirror.com", "huggingface.co"];

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const READ_TIMEOUT: Duration = Duration::from_secs(300);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime settings shared by the lister and the transfer engine.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL for listing and resolve requests, without trailing slash.
    pub endpoint: String,
    pub user_agent: String,
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
    /// Per-read timeout on the body stream; there is no whole-request limit.
    pub read_timeout: Duration,
    /// Timeout for the HEAD size probe.
    pub probe_timeout: Duration,
    /// Total attempts per file when the transport fails mid-transfer.
    pub max_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout: READ_TIMEOUT,
            probe_timeout: PROBE_TIMEOUT,
            max_attempts: 3,
        }
    }
}

impl Settings {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = normalize_endpoint(&endpoint.into());
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Builds the shared HTTP client.
    pub fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout);

        if let Some(proxy_url) = &self.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        builder.build()
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    endpoint.trim().trim_end_matches('/').to_string()
}
