//! # Webkey Types
//!
//! Type definitions shared between the page-facing message bridge, the
//! authenticator broker and the flow engine:
//!
//! - [`wire`]: the textual envelopes exchanged with the page context.
//! - [`webauthn`]: the subset of the Webauthn request documents that the
//!   flow engine reads, with everything else passed through verbatim.
//! - [`ctap`]: authenticator status codes and their classification.
//! - [`Pin`]: a zeroizing container for a user-entered authenticator PIN.
//! - [`Bytes`]: base64url encoded byte strings as they appear on the wire.

mod bytes;
mod pin;

pub mod ctap;
pub mod encoding;
pub mod webauthn;
pub mod wire;

pub use bytes::{Bytes, NotBase64Encoded};
pub use pin::Pin;
