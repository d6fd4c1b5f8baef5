use std::fmt;

/// The platform credential store, consumed as a black-box create/get
/// capability.
///
/// When the user opts out of the hardware path, the flow engine hands the
/// original, unmodified request document to this store and returns its
/// response (or failure) as the flow's terminal result.
#[cfg_attr(any(test, feature = "testable"), mockall::automock)]
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Register a credential with the platform store.
    async fn create_credential(
        &self,
        request: &serde_json::Value,
    ) -> Result<serde_json::Value, StoreError>;

    /// Look up an assertion from the platform store.
    async fn get_credential(
        &self,
        request: &serde_json::Value,
    ) -> Result<serde_json::Value, StoreError>;
}

/// A failure reported by the platform credential store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "credential store error: {}", self.0)
    }
}
