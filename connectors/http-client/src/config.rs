use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Where the REST services live and how long to wait for them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Prefix every path is joined onto, e.g. `http://localhost:8000/api`
    pub base_url: String,
    pub timeout: Duration,
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self { Self { base_url: base_url.into(), timeout: DEFAULT_TIMEOUT } }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
