use webkey_types::Pin;

/// Prompts and messages delegated to the hosting application.
///
/// The flow engine decides *when* to prompt and what to do with the result;
/// how the prompts look is entirely up to the host. Every method is a
/// suspension point for the flow.
#[cfg_attr(any(test, feature = "testable"), mockall::automock)]
#[async_trait::async_trait]
pub trait UserInterface: Send + Sync {
    /// Ask the user for their authenticator PIN. `None` means the user
    /// cancelled the prompt.
    async fn ask_pin(&self, title: &str) -> Option<Pin>;

    /// Show a message and wait for the user to acknowledge it.
    async fn show_message(&self, message: &str);

    /// Ask the user to pick one of `labels`, returning the chosen index.
    /// `None` means the prompt was dismissed.
    async fn select_identity(&self, title: &str, labels: &[String]) -> Option<usize>;
}
