//! Error taxonomy for the sign-in flow.

use thiserror::Error;

/// Message shown for every failed code exchange, whatever the cause.
pub const SIGN_IN_FAILED_MESSAGE: &str = "Sign-in failed. Please try again.";

/// Errors surfaced by [`AuthSession`](super::AuthSession).
///
/// None of these are fatal: after any of them the session is back in a
/// resting state (`SignedOut`, or `SignedIn` if a user was already stored).
#[derive(Error, Debug)]
pub enum AuthError {
    /// The app is not configured for sign-in (placeholder client id).
    #[error("{0}")]
    Configuration(String),

    /// The provider redirected back with an error.
    #[error("{0}")]
    Provider(String),

    /// Token request, profile lookup or persisting the result failed.
    ///
    /// Displays a single retry message; the cause is kept as the source.
    #[error("Sign-in failed. Please try again.")]
    Exchange {
        #[source]
        source: anyhow::Error,
    },

    /// The signed-in record could not be removed.
    #[error("Failed to update local sign-in state")]
    Storage {
        #[source]
        source: anyhow::Error,
    },

    /// A redirect result arrived with no sign-in attempt pending.
    #[error("No sign-in is in progress")]
    NoPendingSignIn,
}

impl AuthError {
    pub(crate) fn configuration_required() -> Self {
        AuthError::Configuration(
            "Microsoft sign-in is not configured. Register an app in the Azure portal, \
             then set microsoft.client_id in config.toml (or VIBES_CLIENT_ID) to its \
             Application (client) ID."
                .to_string(),
        )
    }

    pub(crate) fn exchange(source: anyhow::Error) -> Self {
        AuthError::Exchange { source }
    }

    /// Whether retrying the same action can succeed without changing config.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Exchange { .. } | AuthError::Provider(_))
    }
}
