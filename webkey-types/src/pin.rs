use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A user-entered authenticator PIN.
///
/// The value lives only as long as the flow that collected it: the backing
/// buffer is zeroized on drop, `Debug` is redacted, and the type is
/// deliberately not serializable.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Pin(Vec<u8>);

impl Pin {
    /// Wrap freshly collected PIN bytes.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self(value.into())
    }

    /// The raw PIN bytes, for handing to an authenticator session.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Pin {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes().to_vec())
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(..)")
    }
}
