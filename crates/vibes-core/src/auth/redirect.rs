//! Redirect results and the browser collaborator that produces them.

use std::future::Future;

use url::Url;

use super::PendingSignIn;

/// Outcome of the interactive step of a sign-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectResult {
    /// The provider redirected back with an authorization code.
    Success { code: String, state: Option<String> },
    /// The provider redirected back with an error.
    Error { code: String, message: String },
    /// The user dismissed the browser or supplied nothing.
    Cancelled,
}

impl RedirectResult {
    /// Parses the query of a redirect URL (`?code=..&state=..` or
    /// `?error=..&error_description=..`).
    pub fn from_redirect_url(url: &Url) -> Self {
        Self::from_pairs(url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())))
    }

    fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut description = None;
        for (key, value) in pairs {
            match key.as_str() {
                "code" => code = Some(value),
                "state" => state = Some(value),
                "error" => error = Some(value),
                "error_description" => description = Some(value),
                _ => {}
            }
        }

        if let Some(error) = error {
            let message = description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| error.clone());
            return RedirectResult::Error {
                code: error,
                message,
            };
        }

        match code.filter(|c| !c.is_empty()) {
            Some(code) => RedirectResult::Success { code, state },
            None => RedirectResult::Error {
                code: "invalid_request".to_string(),
                message: "Redirect did not include an authorization code".to_string(),
            },
        }
    }
}

/// Parses a pasted authorization input.
///
/// Accepts a full redirect URL, a `code=..&state=..` query string, a
/// `code#state` pair, or a bare code. Empty input cancels.
pub fn parse_authorization_input(input: &str) -> RedirectResult {
    let value = input.trim();
    if value.is_empty() {
        return RedirectResult::Cancelled;
    }

    if let Ok(url) = Url::parse(value)
        && url.has_host()
    {
        return RedirectResult::from_redirect_url(&url);
    }

    let query = value.trim_start_matches('?');
    if query.contains("code=") || query.contains("error=") {
        let pairs = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()));
        return RedirectResult::from_pairs(pairs);
    }

    if let Some((code, state)) = value.split_once('#') {
        return RedirectResult::Success {
            code: code.to_string(),
            state: Some(state.to_string()).filter(|s| !s.is_empty()),
        };
    }

    RedirectResult::Success {
        code: value.to_string(),
        state: None,
    }
}

/// Drives the user-facing part of a sign-in: shows `request.auth_url` and
/// resolves once the provider redirects to `request.redirect_uri` or the user
/// gives up.
pub trait BrowserLauncher {
    fn authorize(&self, request: &PendingSignIn) -> impl Future<Output = RedirectResult>;
}
