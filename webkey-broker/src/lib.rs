//! # Webkey Broker
//!
//! This crate owns the shared mutable heart of the system: the single
//! pending "need a device" slot and the cache of the currently connected
//! persistent-transport authenticator. The [`Broker`] reconciles
//! asynchronous device-presence events (USB attach/detach, one-shot NFC
//! taps) with at most one waiting consumer, including user cancellation and
//! the "use the platform store instead" escape hatch.
//!
//! The hardware itself sits behind the [`Device`] and [`CtapSession`]
//! traits so that transports and protocol drivers vary without touching the
//! brokering logic, in the same way storage and user interaction are traits
//! in a CTAP authenticator implementation.

mod broker;
mod device;

pub use self::{
    broker::{AcquireError, Broker, FlowPhase, NfcEvent, PresenceObserver, UsbEvent},
    device::{
        Assertion, ClientError, CtapSession, Device, GetAssertionRequest, IdentitySelection,
        MakeCredentialRequest, SharedDevice, Transport,
    },
};

#[cfg(any(test, feature = "testable"))]
pub use self::device::{MockCtapSession, MockDevice};
