//! Sign in with Microsoft: authorization code + PKCE, Graph profile lookup,
//! and the persisted signed-in user.

mod error;
pub mod microsoft;
pub mod pkce;
pub mod redirect;
mod session;

use serde::{Deserialize, Serialize};

pub use error::{AuthError, SIGN_IN_FAILED_MESSAGE};
pub use redirect::{BrowserLauncher, RedirectResult, parse_authorization_input};
pub use session::AuthSession;

/// The signed-in user. Present in storage iff the user is signed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub provider: String,
    pub id: String,
}

/// Where the session is in the sign-in flow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    SignedOut,
    AwaitingProviderRedirect,
    ExchangingToken,
    SignedIn(UserProfile),
}

impl AuthState {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, AuthState::SignedIn(_))
    }

    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            AuthState::SignedIn(user) => Some(user),
            _ => None,
        }
    }

    /// Short name for logs; never includes profile data.
    pub fn label(&self) -> &'static str {
        match self {
            AuthState::SignedOut => "signed_out",
            AuthState::AwaitingProviderRedirect => "awaiting_redirect",
            AuthState::ExchangingToken => "exchanging_token",
            AuthState::SignedIn(_) => "signed_in",
        }
    }
}

/// What the browser collaborator needs to run one authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSignIn {
    /// Provider authorize URL to show the user
    pub auth_url: String,
    /// Where the provider will redirect back to
    pub redirect_uri: String,
    /// Anti-forgery value echoed back on the redirect
    pub state: String,
}
