//! The textual envelopes exchanged with the page context.
//!
//! Requests arrive as `{"type": "create"|"get", "request": {..}}`. Replies
//! are 3-element arrays `["success"|"error", <payload-or-message>, <type>]`
//! where the third element always echoes the originating request type so the
//! page-side hooks can route the reply to the right pending promise.

use std::fmt;

use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Name under which the message port is registered with the hosting
/// page-render surface. The injected page script posts to and listens on
/// this interface.
pub const INTERFACE_NAME: &str = "__webauthn_interface__";

/// The kind of credential operation a request asks for.
#[typeshare]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// Register a new credential.
    Create,
    /// Assert an existing credential.
    Get,
}

impl RequestKind {
    /// The wire spelling of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Get => "get",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request posted by the page.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestEnvelope {
    /// Which operation is being requested.
    #[serde(rename = "type")]
    pub kind: RequestKind,
    /// The protocol-specific options document, kept opaque until the flow
    /// engine decodes the fields it needs.
    pub request: serde_json::Value,
}

impl RequestEnvelope {
    /// Parse a raw message posted by the page.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Serialize a success reply carrying the credential or assertion document.
pub fn success_reply(payload: &serde_json::Value, kind: RequestKind) -> String {
    serde_json::json!(["success", payload, kind]).to_string()
}

/// Serialize an error reply carrying a human readable message.
pub fn error_reply(message: &str, kind: RequestKind) -> String {
    serde_json::json!(["error", message, kind]).to_string()
}
