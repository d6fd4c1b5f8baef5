//! # Webkey Bridge
//!
//! [![github]](https://github.com/webkey-rs/webkey/tree/main/webkey-bridge)
//! [![version]](https://crates.io/crates/webkey-bridge)
//! [![documentation]](https://docs.rs/webkey-bridge/)
//!
//! This crate connects an embedded page-render surface to roaming security
//! keys. A [`MessageBridge`] receives the opaque messages posted by the page
//! under [`INTERFACE_NAME`], enforces a single in-flight request, and answers
//! each accepted request with exactly one reply envelope. Accepted requests
//! run through a [`FlowEngine`] which negotiates with a device obtained from
//! a [`Broker`](webkey_broker::Broker), collecting PINs and identity choices
//! through a host-provided [`UserInterface`], and hands off to a platform
//! [`CredentialStore`] when the user asks for other options.
//!
//! The bridge holds no page-render handles itself. Hosts implement
//! [`ReplyChannel`] for their message port and [`UserInterface`] for their
//! dialogs, and feed navigation starts into
//! [`MessageBridge::on_navigation_start`] so replies never land on a page
//! that has moved on.
//!
//! [github]: https://img.shields.io/badge/GitHub-webkey--rs%2Fwebkey%2Fwebkey--bridge-informational?logo=github&style=flat
//! [version]: https://img.shields.io/crates/v/webkey-bridge?logo=rust&style=flat
//! [documentation]: https://img.shields.io/docsrs/webkey-bridge/latest?logo=docs.rs&style=flat

mod bridge;
mod flow;
mod origin;
mod store;
mod ui;

#[cfg(test)]
mod tests;

pub use bridge::{MessageBridge, ReplyChannel};
pub use flow::{FlowEngine, FlowError};
pub use origin::{OriginError, assert_domain};
pub use store::{CredentialStore, StoreError};
pub use ui::UserInterface;
pub use webkey_types::wire::INTERFACE_NAME;

#[cfg(any(test, feature = "testable"))]
pub use store::MockCredentialStore;
#[cfg(any(test, feature = "testable"))]
pub use ui::MockUserInterface;
