//! Microsoft identity platform (v2.0 endpoints) and Microsoft Graph helpers.

use anyhow::{Context, Result};
use serde::Deserialize;

use super::UserProfile;
use super::pkce::Pkce;
use crate::config::MicrosoftConfig;

/// Provider literal stored on every profile issued through this module.
pub const PROVIDER_NAME: &str = "Microsoft";

/// Longest error body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Resolved endpoint URLs for one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicrosoftEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub profile_url: String,
}

impl MicrosoftEndpoints {
    pub fn from_config(config: &MicrosoftConfig) -> Self {
        let authority = config.authority_url.trim_end_matches('/');
        let tenant = config.tenant.trim_matches('/');
        let graph = config.graph_url.trim_end_matches('/');
        Self {
            authorize_url: format!("{authority}/{tenant}/oauth2/v2.0/authorize"),
            token_url: format!("{authority}/{tenant}/oauth2/v2.0/token"),
            profile_url: format!("{graph}/v1.0/me"),
        }
    }
}

/// Builds the authorization URL for the code + PKCE flow.
pub fn build_auth_url(config: &MicrosoftConfig, pkce: &Pkce, state: &str) -> String {
    let endpoints = MicrosoftEndpoints::from_config(config);
    let scope = config.scope_string();
    let params = [
        ("client_id", config.client_id.as_str()),
        ("response_type", "code"),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("response_mode", "query"),
        ("scope", scope.as_str()),
        ("code_challenge", pkce.challenge.as_str()),
        ("code_challenge_method", Pkce::METHOD),
        ("state", state),
        ("prompt", "select_account"),
    ];

    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();

    format!("{}?{query}", endpoints.authorize_url)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Exchanges an authorization code for an access token.
///
/// # Errors
/// Returns an error on transport failure, a non-success status, an
/// unparsable body, or a body without `access_token`.
pub async fn request_token(
    client: &reqwest::Client,
    config: &MicrosoftConfig,
    code: &str,
    verifier: &str,
) -> Result<String> {
    let endpoints = MicrosoftEndpoints::from_config(config);
    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("client_id", &config.client_id)
        .append_pair("scope", &config.scope_string())
        .append_pair("code", code)
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("grant_type", "authorization_code")
        .append_pair("code_verifier", verifier)
        .finish();

    let response = client
        .post(&endpoints.token_url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .header("Accept", "application/json")
        .body(body)
        .send()
        .await
        .context("Failed to send token exchange request")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!(
            "Token exchange failed (HTTP {status}): {}",
            truncate(&body, MAX_ERROR_BODY_CHARS)
        );
    }

    let token: TokenResponse = response
        .json()
        .await
        .context("Failed to parse token response")?;

    token
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| anyhow::anyhow!("no access token received"))
}

/// The `/me` fields we read.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    id: Option<String>,
    display_name: Option<String>,
    user_principal_name: Option<String>,
    mail: Option<String>,
}

impl GraphUser {
    fn into_profile(self) -> Result<UserProfile> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let id = non_empty(self.id).context("Profile response has no id")?;
        let principal = non_empty(self.user_principal_name);
        let name = non_empty(self.display_name)
            .or_else(|| principal.clone())
            .unwrap_or_default();
        let email = non_empty(self.mail).or(principal).unwrap_or_default();

        Ok(UserProfile {
            name,
            email,
            provider: PROVIDER_NAME.to_string(),
            id,
        })
    }
}

/// Fetches the signed-in user's profile from Microsoft Graph.
///
/// # Errors
/// Returns an error on transport failure, a non-success status, or an
/// unparsable/incomplete body.
pub async fn fetch_profile(
    client: &reqwest::Client,
    config: &MicrosoftConfig,
    access_token: &str,
) -> Result<UserProfile> {
    let endpoints = MicrosoftEndpoints::from_config(config);
    let response = client
        .get(&endpoints.profile_url)
        .bearer_auth(access_token)
        .header("Accept", "application/json")
        .send()
        .await
        .context("Failed to send profile request")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!(
            "Profile request failed (HTTP {status}): {}",
            truncate(&body, MAX_ERROR_BODY_CHARS)
        );
    }

    let user: GraphUser = response
        .json()
        .await
        .context("Failed to parse profile response")?;
    user.into_profile()
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
