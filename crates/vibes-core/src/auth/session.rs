//! The sign-in session coordinator.
//!
//! `AuthSession` owns the current user and the single pending authorization
//! attempt. Every state change is published on a `watch` channel so the
//! presentation layer can follow along without polling.
//!
//! ```text
//! SignedOut -> AwaitingProviderRedirect -> ExchangingToken -> SignedIn
//!                 |  cancel / error            |  failure
//!                 v                            v
//!             (resting state)             (resting state)
//! ```
//!
//! The resting state is `SignedIn` when a user is already stored, otherwise
//! `SignedOut`. Starting a new attempt while one is pending supersedes it: the
//! old verifier is dropped and a redirect carrying the old `state` is rejected.

use anyhow::Context;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::microsoft;
use super::pkce::{self, Pkce};
use super::redirect::{BrowserLauncher, RedirectResult};
use super::{AuthError, AuthState, PendingSignIn, UserProfile};
use crate::config::MicrosoftConfig;
use crate::store::{KeyValueStore, SIGNED_IN_USER_KEY};

/// Secret half of a pending attempt. Never leaves the session.
struct Attempt {
    pkce: Pkce,
    state: String,
}

pub struct AuthSession<S> {
    config: MicrosoftConfig,
    store: S,
    client: reqwest::Client,
    current_user: Option<UserProfile>,
    pending: Option<Attempt>,
    state_tx: watch::Sender<AuthState>,
}

impl<S: KeyValueStore> AuthSession<S> {
    pub fn new(config: MicrosoftConfig, store: S) -> Self {
        let (state_tx, _) = watch::channel(AuthState::SignedOut);
        Self {
            config,
            store,
            client: reqwest::Client::new(),
            current_user: None,
            pending: None,
            state_tx,
        }
    }

    /// Uses `client` for the token and profile requests.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn state(&self) -> AuthState {
        self.state_tx.borrow().clone()
    }

    pub fn current_user(&self) -> Option<&UserProfile> {
        self.current_user.as_ref()
    }

    /// Receiver that observes every state transition from now on.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state_tx.subscribe()
    }

    /// Loads the persisted user, if any.
    ///
    /// Unreadable or malformed records are logged and treated as signed out.
    pub fn restore_session(&mut self) -> Option<UserProfile> {
        self.current_user = match self.store.get(SIGNED_IN_USER_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<UserProfile>(&raw) {
                Ok(user) => Some(user),
                Err(err) => {
                    warn!(error = %err, "Ignoring malformed signed-in user record");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "Failed to read signed-in user record");
                None
            }
        };
        self.settle();
        self.current_user.clone()
    }

    /// Starts an authorization attempt and returns what the browser needs.
    ///
    /// # Errors
    /// Returns [`AuthError::Configuration`] while the client id is still a
    /// placeholder. No request is made in that case.
    pub fn begin_sign_in(&mut self) -> Result<PendingSignIn, AuthError> {
        if self.config.has_placeholder_client_id() {
            return Err(AuthError::configuration_required());
        }

        if self.pending.is_some() {
            debug!("Superseding pending sign-in attempt");
        }

        let pkce = pkce::generate_pkce();
        let state = pkce::generate_state();
        let auth_url = microsoft::build_auth_url(&self.config, &pkce, &state);
        let request = PendingSignIn {
            auth_url,
            redirect_uri: self.config.redirect_uri.clone(),
            state: state.clone(),
        };

        self.pending = Some(Attempt { pkce, state });
        self.transition(AuthState::AwaitingProviderRedirect);
        Ok(request)
    }

    /// Runs a whole attempt: begin, hand off to `launcher`, complete.
    ///
    /// Returns `Ok(None)` when the user cancels.
    ///
    /// # Errors
    /// See [`begin_sign_in`](Self::begin_sign_in) and
    /// [`complete_sign_in`](Self::complete_sign_in).
    pub async fn sign_in<L: BrowserLauncher>(
        &mut self,
        launcher: &L,
    ) -> Result<Option<UserProfile>, AuthError> {
        let request = self.begin_sign_in()?;
        let result = launcher.authorize(&request).await;
        self.complete_sign_in(result).await
    }

    /// Consumes the redirect result of the pending attempt.
    ///
    /// # Errors
    /// - [`AuthError::NoPendingSignIn`] if no attempt was started
    /// - [`AuthError::Provider`] for provider errors and `state` mismatches
    /// - [`AuthError::Exchange`] if the code exchange fails
    pub async fn complete_sign_in(
        &mut self,
        result: RedirectResult,
    ) -> Result<Option<UserProfile>, AuthError> {
        let Some(expected_state) = self.pending.as_ref().map(|a| a.state.clone()) else {
            return Err(AuthError::NoPendingSignIn);
        };

        match result {
            RedirectResult::Cancelled => {
                debug!("Sign-in cancelled by user");
                self.abandon_attempt();
                Ok(None)
            }
            RedirectResult::Error { code, message } => {
                warn!(%code, "Provider returned an authorization error");
                self.abandon_attempt();
                Err(AuthError::Provider(message))
            }
            RedirectResult::Success { state, .. }
                if state.as_ref().is_some_and(|s| *s != expected_state) =>
            {
                warn!("Redirect state does not match the pending attempt");
                self.abandon_attempt();
                Err(AuthError::Provider("state mismatch".to_string()))
            }
            RedirectResult::Success { code, .. } => self.exchange_code(&code).await.map(Some),
        }
    }

    /// Exchanges `code` using the pending attempt's verifier, fetches the
    /// profile and persists it, replacing any previous user.
    ///
    /// Each request is attempted once. On failure nothing is persisted.
    ///
    /// # Errors
    /// [`AuthError::NoPendingSignIn`] without a pending attempt, otherwise
    /// [`AuthError::Exchange`] for any network, parse or storage failure.
    pub async fn exchange_code(&mut self, code: &str) -> Result<UserProfile, AuthError> {
        let attempt = self.pending.take().ok_or(AuthError::NoPendingSignIn)?;
        self.transition(AuthState::ExchangingToken);

        match self.fetch_and_persist(code, &attempt.pkce.verifier).await {
            Ok(user) => {
                info!(provider = %user.provider, "Signed in");
                self.current_user = Some(user.clone());
                self.transition(AuthState::SignedIn(user.clone()));
                Ok(user)
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "Sign-in exchange failed");
                self.settle();
                Err(AuthError::exchange(err))
            }
        }
    }

    /// Forgets the signed-in user. Succeeds when nobody is signed in.
    ///
    /// # Errors
    /// Returns [`AuthError::Storage`] if the stored record cannot be removed;
    /// the session then stays signed in.
    pub fn sign_out(&mut self) -> Result<(), AuthError> {
        let removed = self
            .store
            .remove(SIGNED_IN_USER_KEY)
            .map_err(|source| AuthError::Storage { source })?;
        if removed {
            info!("Signed out");
        }

        self.pending = None;
        self.current_user = None;
        self.transition(AuthState::SignedOut);
        Ok(())
    }

    async fn fetch_and_persist(&self, code: &str, verifier: &str) -> anyhow::Result<UserProfile> {
        let access_token =
            microsoft::request_token(&self.client, &self.config, code, verifier).await?;
        debug!("Received access token");

        let user = microsoft::fetch_profile(&self.client, &self.config, &access_token).await?;
        debug!("Fetched profile");

        let record = serde_json::to_string(&user).context("Failed to serialize user profile")?;
        self.store
            .set(SIGNED_IN_USER_KEY, &record)
            .context("Failed to persist signed-in user")?;
        Ok(user)
    }

    fn abandon_attempt(&mut self) {
        self.pending = None;
        self.settle();
    }

    /// Returns to the resting state implied by the stored user.
    fn settle(&self) {
        let next = match &self.current_user {
            Some(user) => AuthState::SignedIn(user.clone()),
            None => AuthState::SignedOut,
        };
        self.transition(next);
    }

    fn transition(&self, next: AuthState) {
        debug!(
            from = self.state_tx.borrow().label(),
            to = next.label(),
            "Auth state transition"
        );
        self.state_tx.send_replace(next);
    }
}
