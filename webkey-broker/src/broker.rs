use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use crate::device::SharedDevice;

/// Which stage of a flow a device request belongs to.
///
/// This only drives prompt presentation in the hosting application (title
/// wording, whether the "other options" affordance is shown); the protocol
/// logic never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPhase {
    /// Registration, before any PIN was collected.
    CreateBeforeDevice,
    /// Registration retry after a PIN was entered.
    CreateAfterPin,
    /// Authentication, before any PIN was collected.
    GetBeforeDevice,
    /// Authentication retry after a PIN was entered.
    GetAfterPin,
}

impl FlowPhase {
    /// Whether this is the first device request of a flow. Hosting UI only
    /// offers the platform-store fallback in this phase; once a PIN has
    /// been collected, switching paths no longer makes sense.
    pub fn is_initial(&self) -> bool {
        matches!(self, Self::CreateBeforeDevice | Self::GetBeforeDevice)
    }
}

/// Why a device acquisition ended without a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    /// The user dismissed the device prompt.
    Cancelled,
    /// The user chose to service the request through the platform
    /// credential store instead. A redirect signal, not a failure.
    FallbackRequested,
}

/// Presence event from the persistent transport.
pub enum UsbEvent {
    /// A key was plugged in.
    Attached(SharedDevice),
    /// The connected key was removed.
    Detached,
}

/// Presence event from the one-shot transport.
pub enum NfcEvent {
    /// A key entered the field.
    Present(SharedDevice),
}

/// Hook for presentation code to mirror the broker's pending request, e.g.
/// by showing and dismissing an "insert or tap your key" prompt.
pub trait PresenceObserver: Send + Sync {
    /// A device request opened; a prompt should be shown.
    fn opened(&self, label: &str, phase: FlowPhase);
    /// The pending request resolved one way or another; any prompt should
    /// be dismissed.
    fn closed(&self);
}

/// The single pending "need a device" slot.
struct PendingAction {
    resolve: oneshot::Sender<Result<SharedDevice, AcquireError>>,
}

#[derive(Default)]
struct State {
    /// The currently connected persistent-transport device, if any.
    connected: Option<SharedDevice>,
    /// At most one consumer waits for a device at any time.
    pending: Option<PendingAction>,
}

/// Reconciles device-presence events with at most one pending consumer.
///
/// Discovery events and consumer-side resolution both go through one mutex,
/// so the connected-device cache and the pending slot are never mutated
/// concurrently. Exactly-once resolution falls out of the slot being
/// [`Option::take`]n and the [`oneshot::Sender`] being consumed by `send`.
#[derive(Default)]
pub struct Broker {
    state: Mutex<State>,
    observer: Option<Arc<dyn PresenceObserver>>,
}

impl Broker {
    /// A broker with no presence observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker that mirrors its pending slot to `observer`.
    pub fn with_observer(observer: Arc<dyn PresenceObserver>) -> Self {
        Self {
            state: Mutex::default(),
            observer: Some(observer),
        }
    }

    /// Wait for an authenticator to become available.
    ///
    /// Resolves immediately from the persistent-device cache when possible,
    /// without opening a prompt. Otherwise the single pending slot is
    /// created and the call suspends until a presence event, a user
    /// cancellation or a fallback choice resolves it.
    ///
    /// Callers must not have two acquisitions outstanding; the message
    /// bridge's single-in-flight gate upholds this. A violation trips a
    /// debug assertion and drops the stale slot, whose orphaned waiter then
    /// observes [`AcquireError::Cancelled`].
    pub async fn request(
        &self,
        label: &str,
        phase: FlowPhase,
    ) -> Result<SharedDevice, AcquireError> {
        let rx = {
            let mut state = self.lock();
            if let Some(device) = &state.connected {
                log::debug!("resolving device request from connected device");
                return Ok(Arc::clone(device));
            }
            debug_assert!(
                state.pending.is_none(),
                "a device request is already pending"
            );
            let (tx, rx) = oneshot::channel();
            state.pending = Some(PendingAction { resolve: tx });
            rx
        };

        log::debug!("waiting for an authenticator ({label})");
        if let Some(observer) = &self.observer {
            observer.opened(label, phase);
        }

        // An error here means the sender was dropped without resolving,
        // which only happens if the slot was displaced; treat it like a
        // cancellation.
        let result = rx.await.unwrap_or(Err(AcquireError::Cancelled));
        if let Some(observer) = &self.observer {
            observer.closed();
        }
        result
    }

    /// Persistent-transport attach: cache the device and resolve an open
    /// slot with it.
    pub fn attach(&self, device: SharedDevice) {
        let mut state = self.lock();
        log::debug!("persistent device attached");
        state.connected = Some(Arc::clone(&device));
        Self::resolve(&mut state, Ok(device));
    }

    /// Persistent-transport detach: clear the cache. An open slot stays
    /// open; the user may still tap or insert another key.
    pub fn detach(&self) {
        let mut state = self.lock();
        log::debug!("persistent device detached");
        state.connected = None;
    }

    /// One-shot presence: resolve an open slot with the device, without
    /// caching it. With no slot open the event is dropped.
    pub fn present(&self, device: SharedDevice) {
        let mut state = self.lock();
        log::debug!("one-shot device present");
        Self::resolve(&mut state, Ok(device));
    }

    /// The user dismissed the device prompt.
    pub fn cancel(&self) {
        let mut state = self.lock();
        log::debug!("device request cancelled by user");
        Self::resolve(&mut state, Err(AcquireError::Cancelled));
    }

    /// The user chose the platform credential store instead.
    pub fn request_fallback(&self) {
        let mut state = self.lock();
        log::debug!("user chose fallback over a hardware authenticator");
        Self::resolve(&mut state, Err(AcquireError::FallbackRequested));
    }

    /// The currently connected persistent-transport device, if any.
    pub fn connected_device(&self) -> Option<SharedDevice> {
        self.lock().connected.clone()
    }

    /// Consume per-transport presence streams and multiplex them into the
    /// broker until both sources close.
    ///
    /// A single closed source only disables its branch; hosts without one
    /// of the transports keep receiving events from the other.
    pub async fn drive(&self, mut usb: mpsc::Receiver<UsbEvent>, mut nfc: mpsc::Receiver<NfcEvent>) {
        let mut usb_open = true;
        let mut nfc_open = true;
        while usb_open || nfc_open {
            tokio::select! {
                event = usb.recv(), if usb_open => match event {
                    Some(UsbEvent::Attached(device)) => self.attach(device),
                    Some(UsbEvent::Detached) => self.detach(),
                    None => usb_open = false,
                },
                event = nfc.recv(), if nfc_open => match event {
                    Some(NfcEvent::Present(device)) => self.present(device),
                    None => nfc_open = false,
                },
            }
        }
    }

    /// Resolve and clear the pending slot, if one is open. First resolution
    /// wins; later events find the slot empty.
    fn resolve(state: &mut State, result: Result<SharedDevice, AcquireError>) {
        if let Some(action) = state.pending.take() {
            // The receiver may have gone away with its task; nothing to do.
            let _ = action.resolve.send(result);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
