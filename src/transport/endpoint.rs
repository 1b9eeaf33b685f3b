use std::fmt;
use std::str::FromStr;

use tokio_tungstenite::tungstenite::http::Uri;

use super::TransportError;

/// Default collector address
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8765";

/// Address of the remote collector: a `ws://` or `wss://` URL whose path may
/// carry session or track identifiers. Fixed for the life of a recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
}

impl Endpoint {
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let trimmed = url.trim();
        let uri: Uri = trimmed
            .parse()
            .map_err(|e| TransportError::InvalidEndpoint(format!("{}: {}", trimmed, e)))?;

        match uri.scheme_str() {
            Some("ws") | Some("wss") => {}
            Some(other) => {
                return Err(TransportError::InvalidEndpoint(format!(
                    "{}: unsupported scheme '{}' (expected ws or wss)",
                    trimmed, other
                )))
            }
            None => {
                return Err(TransportError::InvalidEndpoint(format!(
                    "{}: missing ws:// or wss:// scheme",
                    trimmed
                )))
            }
        }

        if uri.host().map_or(true, str::is_empty) {
            return Err(TransportError::InvalidEndpoint(format!(
                "{}: missing host",
                trimmed
            )));
        }

        Ok(Self {
            url: trimmed.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn is_secure(&self) -> bool {
        self.url.starts_with("wss://")
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}
