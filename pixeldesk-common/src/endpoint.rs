//! Upstream model endpoint descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where an endpoint runs, which decides its wire format and timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Self-hosted inference server.
    Local,
    /// Hosted inference API requiring a bearer token.
    Cloud,
}

impl EndpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::Local => "local",
            EndpointKind::Cloud => "cloud",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An upstream inference endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEndpoint {
    pub url: String,
    pub kind: EndpointKind,
}

impl ModelEndpoint {
    pub fn local(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: EndpointKind::Local,
        }
    }

    pub fn cloud(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: EndpointKind::Cloud,
        }
    }
}
