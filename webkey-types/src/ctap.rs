//! Authenticator status codes.
//!
//! Only the PIN and user-verification class is modelled explicitly since it
//! is the class the retry loop branches on; every other code is carried
//! through as [`CtapError::Other`] so nothing is lost when surfacing a
//! failure.
//!
//! Code values are from the CTAP error-response registry:
//! <https://fidoalliance.org/specs/fido-v2.1-ps-20210615/fido-client-to-authenticator-protocol-v2.1-ps-errata-20220621.html#error-responses>

use std::fmt;

/// A CTAP status code reported by an authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtapError {
    /// PIN Invalid.
    PinInvalid,
    /// PIN Blocked.
    PinBlocked,
    /// PIN authentication (`pinUvAuthParam`) verification failed.
    PinAuthInvalid,
    /// PIN authentication blocked, requires a power cycle to reset.
    PinAuthBlocked,
    /// No PIN has been set.
    PinNotSet,
    /// A PIN/UV auth token is required for the selected operation.
    PinRequired,
    /// PIN policy violation.
    PinPolicyViolation,
    /// Built-in user verification is disabled.
    UvBlocked,
    /// Built-in user verification was unsuccessful.
    UvInvalid,
    /// Any status code outside the PIN/UV class.
    Other(u8),
}

impl From<u8> for CtapError {
    fn from(value: u8) -> Self {
        match value {
            0x31 => Self::PinInvalid,
            0x32 => Self::PinBlocked,
            0x33 => Self::PinAuthInvalid,
            0x34 => Self::PinAuthBlocked,
            0x35 => Self::PinNotSet,
            0x36 => Self::PinRequired,
            0x37 => Self::PinPolicyViolation,
            0x3C => Self::UvBlocked,
            0x3F => Self::UvInvalid,
            other => Self::Other(other),
        }
    }
}

impl From<CtapError> for u8 {
    fn from(src: CtapError) -> Self {
        match src {
            CtapError::PinInvalid => 0x31,
            CtapError::PinBlocked => 0x32,
            CtapError::PinAuthInvalid => 0x33,
            CtapError::PinAuthBlocked => 0x34,
            CtapError::PinNotSet => 0x35,
            CtapError::PinRequired => 0x36,
            CtapError::PinPolicyViolation => 0x37,
            CtapError::UvBlocked => 0x3C,
            CtapError::UvInvalid => 0x3F,
            CtapError::Other(other) => other,
        }
    }
}

impl CtapError {
    /// Whether this code belongs to the PIN/UV class.
    pub fn is_pin_class(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Whether the condition is recoverable by collecting a PIN from the
    /// user and retrying the operation.
    pub fn needs_pin_entry(&self) -> bool {
        matches!(self, Self::PinRequired | Self::UvBlocked | Self::UvInvalid)
    }
}

impl fmt::Display for CtapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PinAuthBlocked => {
                f.write_str("Too many wrong PIN attempts, reconnect the Security Key.")
            }
            Self::PinBlocked => f.write_str("PIN is blocked, reset the Security Key."),
            Self::PinAuthInvalid => f.write_str("Authentication failed, please try again."),
            Self::PinNotSet => f.write_str("PIN is not set on authenticator, cannot continue."),
            Self::PinRequired => f.write_str("PIN is required."),
            Self::UvBlocked => f.write_str("UV is blocked, PIN is required."),
            Self::UvInvalid => f.write_str("UV is invalid, PIN is required."),
            Self::PinInvalid | Self::PinPolicyViolation => {
                write!(f, "PIN error: {:#04x}.", u8::from(*self))
            }
            Self::Other(code) => write!(f, "Authenticator error: {code:#04x}."),
        }
    }
}
