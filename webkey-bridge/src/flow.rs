use std::sync::Arc;

use url::Url;
use webkey_broker::{
    AcquireError, Assertion, Broker, ClientError, FlowPhase, GetAssertionRequest,
    MakeCredentialRequest, SharedDevice,
};
use webkey_types::{
    Pin,
    webauthn::{
        ClientDataType, CollectedClientData, CredentialCreationOptions, CredentialRequestOptions,
    },
};

use crate::{
    origin::{self, OriginError},
    store::{CredentialStore, StoreError},
    ui::UserInterface,
};

/// Title of the device prompt during registration.
const CREATE_PROMPT: &str = "Register Security Key";
/// Title of the device prompt during authentication.
const GET_PROMPT: &str = "Security Key Authentication";
/// Title of the PIN entry prompt.
const PIN_PROMPT: &str = "Enter Security Key PIN";
/// Title of the identity selection prompt.
const SELECT_ACCOUNT_PROMPT: &str = "Select account";

/// Terminal failure of a credential flow.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowError {
    /// The user aborted, either at the device prompt or a PIN prompt.
    Cancelled,
    /// The origin could not be mapped onto a relying-party domain.
    Origin(OriginError),
    /// The request document failed to decode.
    InvalidRequest(String),
    /// The authenticator negotiation failed beyond recovery.
    Client(ClientError),
    /// The platform credential store fallback failed.
    Store(StoreError),
}

impl FlowError {
    /// The single human-readable message delivered in the error envelope.
    /// Internal detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Cancelled => "Cancelled by user".to_owned(),
            Self::Origin(err) => err.user_message().to_owned(),
            Self::InvalidRequest(_) => "The request could not be understood.".to_owned(),
            Self::Client(err) => err.user_message(),
            Self::Store(err) => err.to_string(),
        }
    }
}

impl From<OriginError> for FlowError {
    fn from(err: OriginError) -> Self {
        Self::Origin(err)
    }
}

impl From<StoreError> for FlowError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// What a device acquisition produced.
enum Acquired {
    /// A session-capable device handle.
    Device(SharedDevice),
    /// The user redirected the flow to the platform credential store.
    Fallback,
}

/// Drives the create/get negotiation against a brokered device, including
/// the PIN-retry and identity-selection state machine, with user
/// interaction and the platform-store fallback delegated to collaborators.
pub struct FlowEngine<U, C> {
    broker: Arc<Broker>,
    ui: U,
    store: C,
}

impl<U, C> FlowEngine<U, C>
where
    U: UserInterface,
    C: CredentialStore,
{
    /// A flow engine acquiring devices from `broker`, prompting through
    /// `ui` and falling back to `store` on user request.
    pub fn new(broker: Arc<Broker>, ui: U, store: C) -> Self {
        Self { broker, ui, store }
    }

    /// The broker this engine acquires devices from.
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Register a new credential for `origin`, returning the credential
    /// document to hand back to the page verbatim.
    pub async fn make_credential(
        &self,
        origin: &Url,
        request: &serde_json::Value,
    ) -> Result<serde_json::Value, FlowError> {
        let options: CredentialCreationOptions = serde_json::from_value(request.clone())
            .map_err(|err| FlowError::InvalidRequest(err.to_string()))?;
        let effective_domain = origin::assert_domain(origin, options.rp.id.as_deref())?.to_owned();
        let client_data =
            CollectedClientData::new(ClientDataType::Create, &options.challenge, origin.as_str())
                .to_json_bytes();

        let mut pin: Option<Pin> = None;
        // The loop terminates: every arm either returns, fails the flow, or
        // strictly decreases the authenticator's retry counter before the
        // next PinInvalid.
        loop {
            let phase = if pin.is_none() {
                FlowPhase::CreateBeforeDevice
            } else {
                FlowPhase::CreateAfterPin
            };
            let device = match self.acquire(CREATE_PROMPT, phase).await? {
                Acquired::Device(device) => device,
                Acquired::Fallback => {
                    log::debug!("user chose the platform store for the create request");
                    return Ok(self.store.create_credential(request).await?);
                }
            };

            let mut session = device.open().await.map_err(FlowError::Client)?;
            let attempt = session
                .make_credential(MakeCredentialRequest {
                    options: options.clone(),
                    client_data_json: client_data.clone(),
                    effective_domain: effective_domain.clone(),
                    pin: pin.clone(),
                })
                .await;

            match attempt {
                Ok(credential) => return Ok(credential),
                Err(err) => pin = Some(self.recover_with_pin(err).await?),
            }
        }
    }

    /// Produce an assertion over an existing credential for `origin`.
    pub async fn get_assertion(
        &self,
        origin: &Url,
        request: &serde_json::Value,
    ) -> Result<serde_json::Value, FlowError> {
        let options: CredentialRequestOptions = serde_json::from_value(request.clone())
            .map_err(|err| FlowError::InvalidRequest(err.to_string()))?;
        let effective_domain = origin::assert_domain(origin, options.rp_id.as_deref())?.to_owned();
        let client_data =
            CollectedClientData::new(ClientDataType::Get, &options.challenge, origin.as_str())
                .to_json_bytes();

        let mut pin: Option<Pin> = None;
        loop {
            let phase = if pin.is_none() {
                FlowPhase::GetBeforeDevice
            } else {
                FlowPhase::GetAfterPin
            };
            let device = match self.acquire(GET_PROMPT, phase).await? {
                Acquired::Device(device) => device,
                Acquired::Fallback => {
                    log::debug!("user chose the platform store for the get request");
                    return Ok(self.store.get_credential(request).await?);
                }
            };

            let mut session = device.open().await.map_err(FlowError::Client)?;
            let attempt = session
                .get_assertion(GetAssertionRequest {
                    options: options.clone(),
                    client_data_json: client_data.clone(),
                    effective_domain: effective_domain.clone(),
                    pin: pin.clone(),
                })
                .await;

            match attempt {
                Ok(Assertion::Single(assertion)) => return Ok(assertion),
                Ok(Assertion::MultipleIdentities(selection)) => {
                    let labels = selection.labels();
                    let index = self
                        .ui
                        .select_identity(SELECT_ACCOUNT_PROMPT, &labels)
                        .await
                        .ok_or(FlowError::Cancelled)?;
                    return selection.select(index).await.map_err(FlowError::Client);
                }
                Err(err) => pin = Some(self.recover_with_pin(err).await?),
            }
        }
    }

    /// Acquire a device through the broker, mapping cancellation to a
    /// terminal flow error and the fallback sentinel to a redirect.
    async fn acquire(&self, label: &str, phase: FlowPhase) -> Result<Acquired, FlowError> {
        match self.broker.request(label, phase).await {
            Ok(device) => Ok(Acquired::Device(device)),
            Err(AcquireError::Cancelled) => Err(FlowError::Cancelled),
            Err(AcquireError::FallbackRequested) => Ok(Acquired::Fallback),
        }
    }

    /// Classify a failed protocol attempt. Recoverable conditions return a
    /// freshly collected PIN for the next attempt; everything else ends the
    /// flow.
    async fn recover_with_pin(&self, err: ClientError) -> Result<Pin, FlowError> {
        match err {
            ClientError::PinRequired => self.collect_pin().await,
            ClientError::PinInvalid { retries_left } => {
                let message = format!("Invalid PIN. Retries left: {retries_left}.");
                self.ui.show_message(&message).await;
                if retries_left > 0 {
                    self.collect_pin().await
                } else {
                    Err(FlowError::Client(ClientError::PinInvalid { retries_left }))
                }
            }
            ClientError::Ctap(code) if code.needs_pin_entry() => self.collect_pin().await,
            ClientError::Ctap(code) if code.is_pin_class() => {
                self.ui.show_message(&code.to_string()).await;
                Err(FlowError::Client(ClientError::Ctap(code)))
            }
            other => {
                log::warn!("protocol attempt failed: {other:?}");
                self.ui.show_message(&other.user_message()).await;
                Err(FlowError::Client(other))
            }
        }
    }

    async fn collect_pin(&self) -> Result<Pin, FlowError> {
        self.ui
            .ask_pin(PIN_PROMPT)
            .await
            .ok_or(FlowError::Cancelled)
    }
}
