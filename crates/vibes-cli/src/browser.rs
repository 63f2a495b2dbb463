//! System browser launcher with a loopback redirect listener.
//!
//! Opens the authorize URL, then waits for the provider to redirect to the
//! local `redirect_uri`. Falls back to a pasted redirect URL or code when
//! stdin is not a terminal, the port is taken, or the wait times out.

use std::io::{self, BufRead, IsTerminal, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;
use vibes_core::auth::{BrowserLauncher, PendingSignIn, RedirectResult, parse_authorization_input};

pub struct SystemBrowser {
    open_browser: bool,
    timeout: Duration,
}

impl SystemBrowser {
    pub fn new(open_browser: bool, timeout: Duration) -> Self {
        Self {
            open_browser,
            timeout,
        }
    }
}

impl BrowserLauncher for SystemBrowser {
    async fn authorize(&self, request: &PendingSignIn) -> RedirectResult {
        println!("To sign in with Microsoft:");
        println!();
        println!("  1. A browser window will open (or visit the URL below)");
        println!("  2. Sign in with your Microsoft account and approve access");
        println!("  3. If redirected to localhost, return here to continue");
        println!("  4. Otherwise, paste the redirect URL or authorization code");
        println!();
        println!("Authorization URL:");
        println!("  {}", request.auth_url);
        println!();

        // Best effort; the URL is printed either way.
        if self.open_browser
            && let Err(err) = open::that(&request.auth_url)
        {
            debug!(error = %err, "Could not open browser");
        }

        // Prefer local callback in interactive sessions, fall back to manual paste.
        if io::stdin().is_terminal() {
            match wait_for_redirect(&request.redirect_uri, &request.state, self.timeout).await {
                Ok(Some(result)) => return result,
                Ok(None) => println!("No redirect received within {}s.", self.timeout.as_secs()),
                Err(err) => debug!(error = %format!("{err:#}"), "Local callback unavailable"),
            }
        }

        prompt_for_redirect()
    }
}

fn prompt_for_redirect() -> RedirectResult {
    print!("Paste the redirect URL or authorization code (empty to cancel): ");
    let _ = io::stdout().flush();

    let mut input = String::new();
    match io::stdin().lock().read_line(&mut input) {
        Ok(_) => parse_authorization_input(&input),
        Err(err) => {
            warn!(error = %err, "Failed to read authorization input");
            RedirectResult::Cancelled
        }
    }
}

/// Binds the loopback port named by `redirect_uri` and waits for the redirect.
///
/// Returns `Ok(None)` on timeout.
async fn wait_for_redirect(
    redirect_uri: &str,
    expected_state: &str,
    timeout: Duration,
) -> Result<Option<RedirectResult>> {
    let uri = Url::parse(redirect_uri).with_context(|| format!("Invalid redirect URI {redirect_uri}"))?;
    match uri.host_str() {
        Some("localhost" | "127.0.0.1") => {}
        _ => anyhow::bail!("Redirect URI {redirect_uri} is not a loopback address"),
    }
    let port = uri
        .port_or_known_default()
        .with_context(|| format!("Redirect URI {redirect_uri} has no port"))?;

    let deadline = Instant::now()
        .checked_add(timeout)
        .with_context(|| format!("Callback timeout of {}s is too large", timeout.as_secs()))?;

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("Failed to listen on 127.0.0.1:{port}"))?;

    serve_redirect(listener, uri.path(), expected_state, deadline).await
}

/// Answers requests on `listener` until one carries a redirect for
/// `callback_path` with the expected state, or `deadline` passes.
async fn serve_redirect(
    listener: TcpListener,
    callback_path: &str,
    expected_state: &str,
    deadline: Instant,
) -> Result<Option<RedirectResult>> {
    loop {
        let Ok(accepted) = tokio::time::timeout_at(deadline, listener.accept()).await else {
            return Ok(None);
        };
        let (mut stream, _) = accepted.context("Failed to accept callback connection")?;

        let request = tokio::time::timeout_at(deadline, read_request_line(&mut stream))
            .await
            .unwrap_or_default();
        let result = extract_redirect_from_request(&request, callback_path, expected_state);

        let response = match &result {
            Some(RedirectResult::Success { .. }) => success_response(),
            Some(_) => failure_response(),
            // Browsers also ask for /favicon.ico and the like.
            None => not_found_response(),
        };
        if let Err(err) = stream.write_all(response.as_bytes()).await {
            debug!(error = %err, "Failed to answer callback request");
        }
        let _ = stream.shutdown().await;

        if result.is_some() {
            return Ok(result);
        }
    }
}

/// Reads until the request line is complete, the peer stops, or 4 KiB.
async fn read_request_line(stream: &mut TcpStream) -> String {
    let mut buffer = [0u8; 4096];
    let mut filled = 0;
    while filled < buffer.len() {
        match stream.read(&mut buffer[filled..]).await {
            Ok(0) | Err(_) => break,
            Ok(read) => filled += read,
        }
        if buffer[..filled].windows(2).any(|pair| pair == b"\r\n") {
            break;
        }
    }
    String::from_utf8_lossy(&buffer[..filled]).into_owned()
}

fn extract_redirect_from_request(
    request: &str,
    callback_path: &str,
    expected_state: &str,
) -> Option<RedirectResult> {
    let request_line = request.lines().next()?;
    let mut parts = request_line.split_whitespace();
    let _method = parts.next()?;
    let path = parts.next()?;

    let url = Url::parse(&format!("http://localhost{path}")).ok()?;
    if url.path() != callback_path {
        return None;
    }

    // Successes and errors alike must carry our state.
    let state = url
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned());
    if state.as_deref() != Some(expected_state) {
        return None;
    }

    Some(RedirectResult::from_redirect_url(&url))
}

fn success_response() -> String {
    html_response(
        "200 OK",
        "Signed in",
        "Sign-in complete. You can close this window and return to your terminal.",
    )
}

fn failure_response() -> String {
    html_response(
        "400 Bad Request",
        "Sign-in failed",
        "Sign-in did not complete. Return to your terminal for details.",
    )
}

fn not_found_response() -> String {
    let body = "Not found";
    format!(
        "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

fn html_response(status: &str, title: &str, message: &str) -> String {
    let body = format!(
        "<!doctype html><html><head><meta charset=\"utf-8\" /><title>{title}</title></head><body><h3>{title}</h3><p>{message}</p></body></html>"
    );
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}
