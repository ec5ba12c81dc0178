use std::time::Duration;

use storefront_http_client::HttpConfig;
use storefront_websocket_client::ChannelConfig;

pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub api: HttpConfig,
    /// Base the push endpoints are derived from, e.g. `ws://localhost:8000`
    pub ws_base: String,
    /// Period of the safety-net snapshot refresh. `None` refreshes only on (re)connect.
    pub resync_interval: Option<Duration>,
    pub channel: ChannelConfig,
}

impl SessionConfig {
    pub fn new(api_base: impl Into<String>, ws_base: impl Into<String>) -> Self {
        Self {
            api: HttpConfig::new(api_base),
            ws_base: ws_base.into(),
            resync_interval: Some(DEFAULT_RESYNC_INTERVAL),
            channel: ChannelConfig::default(),
        }
    }

    pub fn with_resync_interval(mut self, interval: Option<Duration>) -> Self {
        self.resync_interval = interval;
        self
    }

    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_api(mut self, api: HttpConfig) -> Self {
        self.api = api;
        self
    }
}
