use std::fmt;

use storefront_core::proto::OrderId;
use url::Url;

use crate::channel::ChannelError;

/// A push endpoint, normalized to a `ws://` or `wss://` URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(Url);

impl Endpoint {
    /// Accepts `ws(s)://` URLs as-is, maps `http(s)://` to the matching WebSocket scheme and treats
    /// a bare host as `wss://`.
    pub fn parse(raw: &str) -> Result<Self, ChannelError> {
        let normalized = match raw {
            u if u.starts_with("ws://") || u.starts_with("wss://") => u.to_string(),
            u if u.starts_with("http://") => format!("ws://{}", &u[7..]),
            u if u.starts_with("https://") => format!("wss://{}", &u[8..]),
            u => format!("wss://{}", u),
        };
        let url = Url::parse(&normalized).map_err(|e| ChannelError::InvalidEndpoint(format!("{raw}: {e}")))?;
        if url.host_str().is_none() {
            return Err(ChannelError::InvalidEndpoint(format!("{raw}: missing host")));
        }
        Ok(Self(url))
    }

    /// Channel carrying status updates for every order: `{base}/ws/orders`
    pub fn all_orders(base: &str) -> Result<Self, ChannelError> { Self::parse(&format!("{}/ws/orders", base.trim_end_matches('/'))) }

    /// Channel carrying status updates for one order: `{base}/ws/orders/{id}`
    pub fn order(base: &str, id: &OrderId) -> Result<Self, ChannelError> {
        Self::parse(&format!("{}/ws/orders/{}", base.trim_end_matches('/'), id))
    }

    pub fn as_str(&self) -> &str { self.0.as_str() }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.0.as_str()) }
}

impl TryFrom<&str> for Endpoint {
    type Error = ChannelError;
    fn try_from(raw: &str) -> Result<Self, Self::Error> { Self::parse(raw) }
}
