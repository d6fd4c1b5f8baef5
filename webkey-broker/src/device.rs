use std::sync::Arc;

use webkey_types::{
    Pin,
    ctap::CtapError,
    webauthn::{CredentialCreationOptions, CredentialRequestOptions},
};

/// Transport over which an authenticator is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Persistent connection, available until the key is physically
    /// detached.
    Usb,
    /// One-shot proximity session, gone once the key leaves the field.
    Nfc,
}

impl Transport {
    /// Whether a device on this transport stays available between protocol
    /// attempts and may therefore be cached.
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Usb)
    }
}

/// A connected authenticator.
///
/// Handles are cheap to clone through [`SharedDevice`] and remain valid for
/// as long as the transport reports the device present; each protocol
/// attempt opens its own short-lived [`CtapSession`].
#[cfg_attr(any(test, feature = "testable"), mockall::automock)]
#[async_trait::async_trait]
pub trait Device: Send + Sync {
    /// The transport this device is connected over.
    fn transport(&self) -> Transport;

    /// Open a CTAP session scoped to a single protocol attempt.
    async fn open(&self) -> Result<Box<dyn CtapSession>, ClientError>;
}

/// Shared handle to a connected authenticator.
pub type SharedDevice = Arc<dyn Device>;

/// Everything a session needs for one `makeCredential` attempt.
#[derive(Debug, Clone)]
pub struct MakeCredentialRequest {
    /// The decoded creation options from the page.
    pub options: CredentialCreationOptions,
    /// Serialized client data for this attempt.
    pub client_data_json: Vec<u8>,
    /// The effective relying-party domain derived from the origin.
    pub effective_domain: String,
    /// PIN collected this flow, if the authenticator asked for one.
    pub pin: Option<Pin>,
}

/// Everything a session needs for one `getAssertion` attempt.
#[derive(Debug, Clone)]
pub struct GetAssertionRequest {
    /// The decoded request options from the page.
    pub options: CredentialRequestOptions,
    /// Serialized client data for this attempt.
    pub client_data_json: Vec<u8>,
    /// The effective relying-party domain derived from the origin.
    pub effective_domain: String,
    /// PIN collected this flow, if the authenticator asked for one.
    pub pin: Option<Pin>,
}

/// A single-attempt protocol session against a connected authenticator.
#[cfg_attr(any(test, feature = "testable"), mockall::automock)]
#[async_trait::async_trait]
pub trait CtapSession: Send {
    /// Register a new credential, returning the credential document to hand
    /// back to the page.
    async fn make_credential(
        &mut self,
        request: MakeCredentialRequest,
    ) -> Result<serde_json::Value, ClientError>;

    /// Assert an existing credential.
    async fn get_assertion(&mut self, request: GetAssertionRequest)
    -> Result<Assertion, ClientError>;
}

/// Outcome of a successful assertion attempt.
pub enum Assertion {
    /// A single matching credential was used.
    Single(serde_json::Value),
    /// Several stored identities match the request; the user must pick one
    /// before the assertion can be produced.
    MultipleIdentities(Box<dyn IdentitySelection>),
}

/// A deferred choice between several stored identities.
#[async_trait::async_trait]
pub trait IdentitySelection: Send {
    /// Display labels, one per identity, in offer order.
    fn labels(&self) -> Vec<String>;

    /// Resolve the chosen index into the assertion for that identity.
    async fn select(self: Box<Self>, index: usize) -> Result<serde_json::Value, ClientError>;
}

/// Failures a protocol attempt can end with, classified for the retry loop.
///
/// The CTAP status code is a first-class field rather than a wrapped cause,
/// so classification never needs to inspect a nested error chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The authenticator requires a PIN that was not supplied.
    PinRequired,
    /// The supplied PIN was wrong; `retries_left` attempts remain before
    /// the authenticator locks.
    PinInvalid {
        /// Remaining attempts as reported by the authenticator.
        retries_left: u8,
    },
    /// The authenticator rejected the operation with a status code.
    Ctap(CtapError),
    /// The transport failed underneath the session.
    Transport(String),
    /// Anything else.
    Other(String),
}

impl ClientError {
    /// The message shown to the user when this error ends a flow.
    pub fn user_message(&self) -> String {
        match self {
            Self::PinRequired => CtapError::PinRequired.to_string(),
            Self::PinInvalid { retries_left } => {
                format!("Invalid PIN. Retries left: {retries_left}.")
            }
            Self::Ctap(code) => code.to_string(),
            Self::Transport(message) | Self::Other(message) => message.clone(),
        }
    }
}

impl From<CtapError> for ClientError {
    fn from(code: CtapError) -> Self {
        Self::Ctap(code)
    }
}
