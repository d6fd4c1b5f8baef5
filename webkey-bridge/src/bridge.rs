use std::sync::Mutex;

use url::Url;
use webkey_types::wire::{self, RequestEnvelope, RequestKind};

use crate::{flow::FlowEngine, store::CredentialStore, ui::UserInterface};

/// The reply path back to the page. One terminal message is delivered per
/// accepted request, or none at all when the page navigated away.
///
/// Delivery failures are the implementation's to log; they never propagate
/// into the flow.
pub trait ReplyChannel: Send {
    /// Deliver a serialized reply envelope to the page.
    fn send(&self, message: &str);
}

/// Lifecycle of the single bridge-wide request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    /// No request in flight; `submit` will accept one.
    Idle,
    /// A request is in flight and its reply will be delivered.
    Active,
    /// A request is in flight but the page has navigated since it started.
    /// The hardware negotiation cannot be cancelled mid-transceive, so the
    /// flow runs to completion and only the reply is dropped.
    Doomed,
}

/// Receives opaque textual requests from the page context, validates origin
/// and frame constraints, enforces at most one in-flight request, and
/// delivers exactly one textual reply per accepted request.
pub struct MessageBridge<U, C> {
    flow: FlowEngine<U, C>,
    state: Mutex<RequestState>,
}

impl<U, C> MessageBridge<U, C>
where
    U: UserInterface,
    C: CredentialStore,
{
    /// A bridge dispatching accepted requests into `flow`.
    pub fn new(flow: FlowEngine<U, C>) -> Self {
        Self {
            flow,
            state: Mutex::new(RequestState::Idle),
        }
    }

    /// Handle a message posted by the page.
    ///
    /// Rejections (busy, subframe, insecure origin) are answered on `reply`
    /// without ever touching the broker. An accepted request is dispatched
    /// to the flow engine and answered with exactly one envelope, unless a
    /// navigation dooms it first.
    ///
    /// Hosts drive each call as its own task; the in-flight gate makes any
    /// overlap reject immediately.
    pub async fn submit(
        &self,
        raw: &str,
        origin: &str,
        is_main_frame: bool,
        reply: Box<dyn ReplyChannel>,
    ) {
        let envelope = match RequestEnvelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                // Nothing to tag a reply with; drop it before the gate so
                // the bridge stays available.
                log::error!("unintelligible request from page: {err}");
                return;
            }
        };
        let kind = envelope.kind;
        log::debug!("incoming {kind} request from {origin}");

        {
            let mut state = self.lock();
            if *state != RequestState::Idle {
                drop(state);
                log::debug!("rejecting {kind} request: another request is in flight");
                reply.send(&wire::error_reply("request already in progress", kind));
                return;
            }
            *state = RequestState::Active;
        }

        if !is_main_frame {
            self.conclude(
                reply.as_ref(),
                kind,
                Err("requests from subframes are not supported".to_owned()),
            );
            return;
        }

        let origin = match Url::parse(origin) {
            Ok(url) if url.scheme().eq_ignore_ascii_case("https") => url,
            _ => {
                self.conclude(
                    reply.as_ref(),
                    kind,
                    Err("WebAuthn not permitted for current URL".to_owned()),
                );
                return;
            }
        };

        let result = match kind {
            RequestKind::Create => self.flow.make_credential(&origin, &envelope.request).await,
            RequestKind::Get => self.flow.get_assertion(&origin, &envelope.request).await,
        };
        let result = result.map_err(|err| {
            log::warn!("{kind} flow ended in error: {err:?}");
            err.user_message()
        });
        self.conclude(reply.as_ref(), kind, result);
    }

    /// The page started navigating. An in-flight request is doomed: its
    /// flow continues (a started hardware negotiation cannot be safely
    /// aborted) but the eventual reply is suppressed.
    pub fn on_navigation_start(&self) {
        let mut state = self.lock();
        if *state == RequestState::Active {
            log::debug!("page navigation started, dooming the in-flight request");
            *state = RequestState::Doomed;
        }
    }

    /// Deliver the terminal envelope and free the bridge for the next
    /// request. A doomed request frees the bridge without delivering.
    fn conclude(
        &self,
        reply: &dyn ReplyChannel,
        kind: RequestKind,
        result: Result<serde_json::Value, String>,
    ) {
        let doomed = {
            let mut state = self.lock();
            let was_doomed = *state == RequestState::Doomed;
            *state = RequestState::Idle;
            was_doomed
        };
        if doomed {
            log::debug!("page navigated away, dropping the {kind} reply");
            return;
        }
        match result {
            Ok(payload) => reply.send(&wire::success_reply(&payload, kind)),
            Err(message) => reply.send(&wire::error_reply(&message, kind)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RequestState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
