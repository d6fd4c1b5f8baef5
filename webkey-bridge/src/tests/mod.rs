//! End-to-end exercises of the bridge, flow engine and broker together,
//! driven by scripted devices and a scripted host UI.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use serde_json::{json, Value};
use tokio::sync::Notify;
use webkey_broker::{
    Assertion, Broker, ClientError, CtapSession, Device, FlowPhase, GetAssertionRequest,
    IdentitySelection, MakeCredentialRequest, PresenceObserver, SharedDevice, Transport,
};
use webkey_types::{Pin, ctap::CtapError};

use crate::{
    CredentialStore, FlowEngine, MessageBridge, ReplyChannel, StoreError, UserInterface,
};

/// One scripted protocol attempt. Sessions consume these front to back.
enum Script {
    CreateOk(Value),
    GetOk(Value),
    GetMultiple(Vec<String>, Vec<Value>),
    Fail(ClientError),
}

struct ScriptedDevice {
    transport: Transport,
    scripts: Arc<Mutex<VecDeque<Script>>>,
    pins_seen: Arc<Mutex<Vec<Option<Pin>>>>,
}

#[async_trait::async_trait]
impl Device for ScriptedDevice {
    fn transport(&self) -> Transport {
        self.transport
    }

    async fn open(&self) -> Result<Box<dyn CtapSession>, ClientError> {
        Ok(Box::new(ScriptedSession {
            scripts: Arc::clone(&self.scripts),
            pins_seen: Arc::clone(&self.pins_seen),
        }))
    }
}

struct ScriptedSession {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    pins_seen: Arc<Mutex<Vec<Option<Pin>>>>,
}

impl ScriptedSession {
    fn next(&self, pin: Option<Pin>) -> Script {
        self.pins_seen.lock().unwrap().push(pin);
        self.scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Fail(ClientError::Other("script exhausted".into())))
    }
}

#[async_trait::async_trait]
impl CtapSession for ScriptedSession {
    async fn make_credential(
        &mut self,
        request: MakeCredentialRequest,
    ) -> Result<Value, ClientError> {
        match self.next(request.pin) {
            Script::CreateOk(doc) => Ok(doc),
            Script::Fail(err) => Err(err),
            _ => Err(ClientError::Other("unexpected create script".into())),
        }
    }

    async fn get_assertion(
        &mut self,
        request: GetAssertionRequest,
    ) -> Result<Assertion, ClientError> {
        match self.next(request.pin) {
            Script::GetOk(doc) => Ok(Assertion::Single(doc)),
            Script::GetMultiple(labels, assertions) => Ok(Assertion::MultipleIdentities(
                Box::new(ScriptedSelection { labels, assertions }),
            )),
            Script::Fail(err) => Err(err),
            _ => Err(ClientError::Other("unexpected get script".into())),
        }
    }
}

struct ScriptedSelection {
    labels: Vec<String>,
    assertions: Vec<Value>,
}

#[async_trait::async_trait]
impl IdentitySelection for ScriptedSelection {
    fn labels(&self) -> Vec<String> {
        self.labels.clone()
    }

    async fn select(self: Box<Self>, index: usize) -> Result<Value, ClientError> {
        self.assertions
            .get(index)
            .cloned()
            .ok_or(ClientError::Other("selection index out of range".into()))
    }
}

fn scripted_device(
    transport: Transport,
    scripts: Vec<Script>,
) -> (SharedDevice, Arc<Mutex<Vec<Option<Pin>>>>) {
    let pins_seen = Arc::new(Mutex::new(Vec::new()));
    let device = Arc::new(ScriptedDevice {
        transport,
        scripts: Arc::new(Mutex::new(scripts.into())),
        pins_seen: Arc::clone(&pins_seen),
    });
    (device, pins_seen)
}

/// Host UI answering prompts from pre-queued responses.
#[derive(Clone, Default)]
struct ScriptedUi {
    pins: Arc<Mutex<VecDeque<Option<Pin>>>>,
    selections: Arc<Mutex<VecDeque<Option<usize>>>>,
    messages: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl UserInterface for ScriptedUi {
    async fn ask_pin(&self, _title: &str) -> Option<Pin> {
        self.pins.lock().unwrap().pop_front().flatten()
    }

    async fn show_message(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_owned());
    }

    async fn select_identity(&self, _title: &str, _labels: &[String]) -> Option<usize> {
        self.selections.lock().unwrap().pop_front().flatten()
    }
}

/// Platform store recording every request it is handed.
#[derive(Clone, Default)]
struct RecordingStore {
    seen: Arc<Mutex<Vec<Value>>>,
}

#[async_trait::async_trait]
impl CredentialStore for RecordingStore {
    async fn create_credential(&self, request: &Value) -> Result<Value, StoreError> {
        self.seen.lock().unwrap().push(request.clone());
        Ok(json!({ "source": "platform-store", "op": "create" }))
    }

    async fn get_credential(&self, request: &Value) -> Result<Value, StoreError> {
        self.seen.lock().unwrap().push(request.clone());
        Ok(json!({ "source": "platform-store", "op": "get" }))
    }
}

struct CollectingReply(Arc<Mutex<Vec<String>>>);

impl ReplyChannel for CollectingReply {
    fn send(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_owned());
    }
}

/// Records prompt openings and wakes tests when one happens.
#[derive(Default)]
struct PromptLog {
    opened: Mutex<Vec<(String, FlowPhase)>>,
    notify: Notify,
}

impl PresenceObserver for PromptLog {
    fn opened(&self, label: &str, phase: FlowPhase) {
        self.opened.lock().unwrap().push((label.to_owned(), phase));
        self.notify.notify_one();
    }

    fn closed(&self) {}
}

struct Harness {
    bridge: Arc<MessageBridge<ScriptedUi, RecordingStore>>,
    broker: Arc<Broker>,
    ui: ScriptedUi,
    store: RecordingStore,
    prompts: Arc<PromptLog>,
    replies: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn new() -> Self {
        let prompts = Arc::new(PromptLog::default());
        let observer: Arc<dyn PresenceObserver> = prompts.clone();
        let broker = Arc::new(Broker::with_observer(observer));
        let ui = ScriptedUi::default();
        let store = RecordingStore::default();
        let engine = FlowEngine::new(Arc::clone(&broker), ui.clone(), store.clone());
        Self {
            bridge: Arc::new(MessageBridge::new(engine)),
            broker,
            ui,
            store,
            prompts,
            replies: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn reply(&self) -> Box<dyn ReplyChannel> {
        Box::new(CollectingReply(Arc::clone(&self.replies)))
    }

    async fn submit(&self, raw: &str, origin: &str) {
        self.bridge.submit(raw, origin, true, self.reply()).await;
    }

    /// Run a submission concurrently so the test can drive presence events
    /// while the flow waits on the broker.
    fn submit_in_background(&self, raw: String, origin: &str) -> tokio::task::JoinHandle<()> {
        let bridge = Arc::clone(&self.bridge);
        let reply = self.reply();
        let origin = origin.to_owned();
        tokio::spawn(async move { bridge.submit(&raw, &origin, true, reply).await })
    }

    fn replies(&self) -> Vec<Value> {
        self.replies
            .lock()
            .unwrap()
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect()
    }

    fn queue_pin(&self, pin: &str) {
        self.ui.pins.lock().unwrap().push_back(Some(Pin::from(pin)));
    }
}

const ORIGIN: &str = "https://webauthn.example.com";

fn create_message() -> String {
    json!({
        "type": "create",
        "request": {
            "rp": { "id": "example.com", "name": "Example" },
            "user": { "id": "dXNlcg", "name": "wendy", "displayName": "Wendy" },
            "challenge": "Y2hhbGxlbmdl",
            "pubKeyCredParams": [{ "type": "public-key", "alg": -7 }],
        }
    })
    .to_string()
}

fn get_message() -> String {
    json!({
        "type": "get",
        "request": {
            "rpId": "example.com",
            "challenge": "Y2hhbGxlbmdl",
            "userVerification": "required",
        }
    })
    .to_string()
}

fn credential_doc() -> Value {
    json!({ "id": "Y3JlZA", "type": "public-key" })
}

fn assertion_doc() -> Value {
    json!({ "id": "Y3JlZA", "response": { "signature": "c2ln" } })
}

#[tokio::test]
async fn connected_key_creates_without_a_prompt() {
    let h = Harness::new();
    let (device, pins) = scripted_device(Transport::Usb, vec![Script::CreateOk(credential_doc())]);
    h.broker.attach(device);

    h.submit(&create_message(), ORIGIN).await;

    assert_eq!(
        h.replies(),
        vec![json!(["success", credential_doc(), "create"])]
    );
    assert!(h.prompts.opened.lock().unwrap().is_empty());
    assert_eq!(*pins.lock().unwrap(), vec![None]);
}

#[tokio::test]
async fn connected_key_asserts_without_a_prompt() {
    let h = Harness::new();
    let (device, _) = scripted_device(Transport::Usb, vec![Script::GetOk(assertion_doc())]);
    h.broker.attach(device);

    h.submit(&get_message(), ORIGIN).await;

    assert_eq!(h.replies(), vec![json!(["success", assertion_doc(), "get"])]);
    assert!(h.prompts.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tapped_key_resolves_an_open_prompt() {
    let h = Harness::new();
    let flow = h.submit_in_background(get_message(), ORIGIN);
    h.prompts.notify.notified().await;

    let (device, _) = scripted_device(Transport::Nfc, vec![Script::GetOk(assertion_doc())]);
    h.broker.present(device);
    flow.await.unwrap();

    assert_eq!(h.replies(), vec![json!(["success", assertion_doc(), "get"])]);
    let prompts = h.prompts.opened.lock().unwrap();
    assert_eq!(
        *prompts,
        vec![(
            "Security Key Authentication".to_owned(),
            FlowPhase::GetBeforeDevice
        )]
    );
    assert!(prompts[0].1.is_initial());
}

#[tokio::test]
async fn wrong_pin_retries_until_the_key_accepts() {
    let h = Harness::new();
    let (device, pins) = scripted_device(
        Transport::Usb,
        vec![
            Script::Fail(ClientError::PinRequired),
            Script::Fail(ClientError::PinInvalid { retries_left: 1 }),
            Script::CreateOk(credential_doc()),
        ],
    );
    h.broker.attach(device);
    h.queue_pin("123456");
    h.queue_pin("654321");

    h.submit(&create_message(), ORIGIN).await;

    assert_eq!(
        h.replies(),
        vec![json!(["success", credential_doc(), "create"])]
    );
    assert_eq!(
        *pins.lock().unwrap(),
        vec![None, Some(Pin::from("123456")), Some(Pin::from("654321"))]
    );
    assert_eq!(
        *h.ui.messages.lock().unwrap(),
        vec!["Invalid PIN. Retries left: 1."]
    );
    // the cached device serviced every attempt without reopening a prompt
    assert!(h.prompts.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn exhausted_retries_end_the_flow() {
    let h = Harness::new();
    let (device, _) = scripted_device(
        Transport::Usb,
        vec![
            Script::Fail(ClientError::PinRequired),
            Script::Fail(ClientError::PinInvalid { retries_left: 0 }),
        ],
    );
    h.broker.attach(device);
    h.queue_pin("123456");

    h.submit(&create_message(), ORIGIN).await;

    assert_eq!(
        h.replies(),
        vec![json!(["error", "Invalid PIN. Retries left: 0.", "create"])]
    );
    assert_eq!(
        *h.ui.messages.lock().unwrap(),
        vec!["Invalid PIN. Retries left: 0."]
    );
}

#[tokio::test]
async fn exhausted_retries_end_the_get_flow() {
    let h = Harness::new();
    let (device, _) = scripted_device(
        Transport::Usb,
        vec![
            Script::Fail(ClientError::PinRequired),
            Script::Fail(ClientError::PinInvalid { retries_left: 0 }),
        ],
    );
    h.broker.attach(device);
    h.queue_pin("123456");

    h.submit(&get_message(), ORIGIN).await;

    assert_eq!(
        h.replies(),
        vec![json!(["error", "Invalid PIN. Retries left: 0.", "get"])]
    );
    // no further PIN prompt happens after the counter hits zero
    assert!(h.ui.pins.lock().unwrap().is_empty());
}

#[tokio::test]
async fn dismissed_pin_prompt_cancels_the_flow() {
    let h = Harness::new();
    let (device, _) =
        scripted_device(Transport::Usb, vec![Script::Fail(ClientError::PinRequired)]);
    h.broker.attach(device);

    h.submit(&create_message(), ORIGIN).await;

    assert_eq!(
        h.replies(),
        vec![json!(["error", "Cancelled by user", "create"])]
    );
}

#[tokio::test]
async fn blocked_key_reports_the_code_message() {
    let h = Harness::new();
    let (device, _) = scripted_device(
        Transport::Usb,
        vec![Script::Fail(ClientError::Ctap(CtapError::PinBlocked))],
    );
    h.broker.attach(device);

    h.submit(&get_message(), ORIGIN).await;

    let message = "PIN is blocked, reset the Security Key.";
    assert_eq!(h.replies(), vec![json!(["error", message, "get"])]);
    assert_eq!(*h.ui.messages.lock().unwrap(), vec![message]);
}

#[tokio::test]
async fn transport_failure_shows_a_dialog_before_failing() {
    let h = Harness::new();
    let message = "The Security Key was removed.";
    let (device, _) = scripted_device(
        Transport::Usb,
        vec![Script::Fail(ClientError::Transport(message.to_owned()))],
    );
    h.broker.attach(device);

    h.submit(&get_message(), ORIGIN).await;

    assert_eq!(h.replies(), vec![json!(["error", message, "get"])]);
    assert_eq!(*h.ui.messages.lock().unwrap(), vec![message]);
}

#[tokio::test]
async fn identity_choice_picks_the_matching_assertion() {
    let h = Harness::new();
    let identities = vec![assertion_doc(), json!({ "id": "b3RoZXI" })];
    let (device, _) = scripted_device(
        Transport::Usb,
        vec![Script::GetMultiple(
            vec!["wendy@example.com".to_owned(), "beth@example.com".to_owned()],
            identities.clone(),
        )],
    );
    h.broker.attach(device);
    h.ui.selections.lock().unwrap().push_back(Some(1));

    h.submit(&get_message(), ORIGIN).await;

    assert_eq!(h.replies(), vec![json!(["success", identities[1], "get"])]);
}

#[tokio::test]
async fn dismissed_identity_choice_cancels_the_flow() {
    let h = Harness::new();
    let (device, _) = scripted_device(
        Transport::Usb,
        vec![Script::GetMultiple(
            vec!["wendy@example.com".to_owned()],
            vec![assertion_doc()],
        )],
    );
    h.broker.attach(device);
    h.ui.selections.lock().unwrap().push_back(None);

    h.submit(&get_message(), ORIGIN).await;

    assert_eq!(h.replies(), vec![json!(["error", "Cancelled by user", "get"])]);
}

#[tokio::test]
async fn overlapping_request_is_rejected_immediately() {
    let h = Harness::new();
    let flow = h.submit_in_background(get_message(), ORIGIN);
    h.prompts.notify.notified().await;

    h.submit(&create_message(), ORIGIN).await;
    h.broker.cancel();
    flow.await.unwrap();

    assert_eq!(
        h.replies(),
        vec![
            json!(["error", "request already in progress", "create"]),
            json!(["error", "Cancelled by user", "get"]),
        ]
    );
}

#[tokio::test]
async fn subframe_requests_are_rejected() {
    let h = Harness::new();
    h.bridge
        .submit(&get_message(), ORIGIN, false, h.reply())
        .await;

    assert_eq!(
        h.replies(),
        vec![json!([
            "error",
            "requests from subframes are not supported",
            "get"
        ])]
    );

    // the rejection freed the bridge for the next request
    let (device, _) = scripted_device(Transport::Usb, vec![Script::GetOk(assertion_doc())]);
    h.broker.attach(device);
    h.submit(&get_message(), ORIGIN).await;
    assert_eq!(h.replies().len(), 2);
    assert_eq!(h.replies()[1][0], "success");
}

#[tokio::test]
async fn insecure_origins_are_rejected() {
    let h = Harness::new();
    h.submit(&create_message(), "http://example.com").await;

    assert_eq!(
        h.replies(),
        vec![json!([
            "error",
            "WebAuthn not permitted for current URL",
            "create"
        ])]
    );
    assert!(h.prompts.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn mismatched_relying_party_is_rejected_before_device_work() {
    let h = Harness::new();
    h.submit(&create_message(), "https://webauthn.other.com").await;

    assert_eq!(
        h.replies(),
        vec![json!([
            "error",
            "The request origin does not match the relying party.",
            "create"
        ])]
    );
    assert!(h.prompts.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unintelligible_messages_get_no_reply() {
    let h = Harness::new();
    h.submit("not json at all", ORIGIN).await;
    h.submit(r#"{"type":"sign","request":{}}"#, ORIGIN).await;
    assert!(h.replies().is_empty());

    // dropped garbage never occupies the in-flight slot
    let (device, _) = scripted_device(Transport::Usb, vec![Script::CreateOk(credential_doc())]);
    h.broker.attach(device);
    h.submit(&create_message(), ORIGIN).await;
    assert_eq!(h.replies().len(), 1);
}

#[tokio::test]
async fn navigation_drops_the_reply_but_frees_the_bridge() {
    let h = Harness::new();
    let flow = h.submit_in_background(get_message(), ORIGIN);
    h.prompts.notify.notified().await;

    h.bridge.on_navigation_start();
    let (device, pins) = scripted_device(Transport::Nfc, vec![Script::GetOk(assertion_doc())]);
    h.broker.present(device);
    flow.await.unwrap();

    // the flow ran to completion but its reply was suppressed
    assert_eq!(*pins.lock().unwrap(), vec![None]);
    assert!(h.replies().is_empty());

    // the next page's request goes through normally
    let (device, _) = scripted_device(Transport::Usb, vec![Script::GetOk(assertion_doc())]);
    h.broker.attach(device);
    h.submit(&get_message(), ORIGIN).await;
    assert_eq!(h.replies(), vec![json!(["success", assertion_doc(), "get"])]);
}

#[tokio::test]
async fn fallback_hands_the_verbatim_request_to_the_store() {
    let h = Harness::new();
    let flow = h.submit_in_background(create_message(), ORIGIN);
    h.prompts.notify.notified().await;

    h.broker.request_fallback();
    flow.await.unwrap();

    let expected: Value = serde_json::from_str(&create_message()).unwrap();
    assert_eq!(*h.store.seen.lock().unwrap(), vec![expected["request"].clone()]);
    assert_eq!(
        h.replies(),
        vec![json!([
            "success",
            { "source": "platform-store", "op": "create" },
            "create"
        ])]
    );
}

#[tokio::test]
async fn pin_retry_reopens_the_prompt_for_one_shot_keys() {
    let h = Harness::new();
    h.queue_pin("123456");
    let flow = h.submit_in_background(get_message(), ORIGIN);
    h.prompts.notify.notified().await;

    let (device, _) = scripted_device(Transport::Nfc, vec![Script::Fail(ClientError::PinRequired)]);
    h.broker.present(device);

    // the key left the field, so the retry opens a second prompt
    h.prompts.notify.notified().await;
    let (device, pins) = scripted_device(Transport::Nfc, vec![Script::GetOk(assertion_doc())]);
    h.broker.present(device);
    flow.await.unwrap();

    assert_eq!(h.replies(), vec![json!(["success", assertion_doc(), "get"])]);
    assert_eq!(*pins.lock().unwrap(), vec![Some(Pin::from("123456"))]);
    let prompts = h.prompts.opened.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert_eq!(prompts[1].1, FlowPhase::GetAfterPin);
    assert!(!prompts[1].1.is_initial());
}
