//! The slices of the Webauthn request documents that the flow engine needs
//! to read.
//!
//! The page hands over full `publicKey` option documents. Only the fields
//! that drive the negotiation (challenge, relying party, user identity) are
//! typed here; everything else is collected into a flattened map and passed
//! through to the authenticator session untouched.

use serde::{Deserialize, Serialize};

use crate::Bytes;

/// The entry the relying party wishes to be known as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialRpEntity {
    /// The relying party identifier, a domain suffix of the caller origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Human readable name of the relying party.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The user account a credential is being registered for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialUserEntity {
    /// The user handle, opaque to the relying party's display layer.
    pub id: Bytes,
    /// Account name.
    pub name: String,
    /// Display name shown on selection surfaces.
    #[serde(default)]
    pub display_name: String,
}

/// Options for a `create` request, i.e. registering a new credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialCreationOptions {
    /// The relying party requesting the registration.
    pub rp: PublicKeyCredentialRpEntity,
    /// The account the credential will belong to.
    pub user: PublicKeyCredentialUserEntity,
    /// Relying party challenge to be signed over.
    pub challenge: Bytes,
    /// Everything else in the document, forwarded verbatim.
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

/// Options for a `get` request, i.e. asserting an existing credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequestOptions {
    /// Relying party challenge to be signed over.
    pub challenge: Bytes,
    /// The claimed relying party identifier, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rp_id: Option<String>,
    /// Everything else in the document, forwarded verbatim.
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

/// The type of Webauthn operation client data is being collected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientDataType {
    /// Registration of a new credential.
    #[serde(rename = "webauthn.create")]
    Create,
    /// Assertion over an existing credential.
    #[serde(rename = "webauthn.get")]
    Get,
}

/// The client data document signed over by the authenticator, built fresh
/// for every protocol attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    /// Operation this client data belongs to.
    #[serde(rename = "type")]
    pub ty: ClientDataType,
    /// The relying party challenge, base64url encoded.
    pub challenge: String,
    /// The fully qualified origin of the requesting page.
    pub origin: String,
    /// Whether the request came from a different origin than the top level
    /// browsing context. Always absent here since subframe requests are
    /// rejected before a flow starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_origin: Option<bool>,
}

impl CollectedClientData {
    /// Build the client data for one protocol attempt.
    pub fn new(ty: ClientDataType, challenge: &Bytes, origin: &str) -> Self {
        Self {
            ty,
            challenge: String::from(challenge),
            origin: origin.trim_end_matches('/').to_owned(),
            cross_origin: None,
        }
    }

    /// Serialize to the JSON bytes handed to the authenticator session.
    pub fn to_json_bytes(&self) -> Vec<u8> {
        // SAFETY: it is a developer error if serializing this struct fails.
        serde_json::to_vec(self).unwrap()
    }
}
