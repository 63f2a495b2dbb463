//! Auth command handlers.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use vibes_core::auth::AuthSession;
use vibes_core::config::Config;
use vibes_core::store::{FileStore, SIGNED_IN_USER_KEY};

use crate::browser::SystemBrowser;
use crate::presenter::Presenter;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn open_session(config: &Config) -> AuthSession<FileStore> {
    AuthSession::new(config.microsoft.clone(), FileStore::in_vibes_home())
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("vibes/", env!("CARGO_PKG_VERSION")))
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("build HTTP client")
}

pub async fn login(config: &Config, no_browser: bool) -> Result<()> {
    let presenter = Presenter::detect();
    let mut session = open_session(config).with_client(http_client()?);

    // Check if already signed in
    if let Some(existing) = session.restore_session() {
        presenter.already_signed_in(&existing);
        print!("Do you want to sign in with a different account? [y/N] ");
        io::stdout().flush()?;

        let mut response = String::new();
        io::stdin().lock().read_line(&mut response)?;
        if !response.trim().eq_ignore_ascii_case("y") {
            println!("Login cancelled.");
            return Ok(());
        }
    }

    let open_browser = !no_browser && std::env::var_os("VIBES_NO_BROWSER").is_none();
    let browser = SystemBrowser::new(open_browser, config.callback_timeout());
    let record_path = session.store().path_for(SIGNED_IN_USER_KEY);

    let progress = tokio::spawn(presenter.follow(session.subscribe()));
    let outcome = session.sign_in(&browser).await;
    // Dropping the session closes the channel so the progress task finishes.
    drop(session);
    let _ = progress.await;

    match outcome {
        Ok(Some(user)) => {
            presenter.signed_in(&user, &record_path);
            Ok(())
        }
        Ok(None) => {
            println!("Sign-in cancelled.");
            Ok(())
        }
        // Details are already in the log; show only the user-facing message.
        Err(err) if err.is_retryable() => {
            Err(anyhow::anyhow!("{err}\nRun `vibes login` to try again."))
        }
        Err(err) => Err(anyhow::anyhow!("{err}")),
    }
}

pub fn logout(config: &Config) -> Result<()> {
    let presenter = Presenter::detect();
    let mut session = open_session(config);
    let previous = session.restore_session();
    session.sign_out()?;

    match previous {
        Some(user) => presenter.signed_out(&user, &session.store().path_for(SIGNED_IN_USER_KEY)),
        None => println!("Not signed in (no saved user found)."),
    }
    Ok(())
}

pub fn whoami(config: &Config) -> Result<()> {
    let presenter = Presenter::detect();
    let mut session = open_session(config);
    match session.restore_session() {
        Some(user) => presenter.profile(&user),
        None => println!("Not signed in. Run `vibes login` to sign in with Microsoft."),
    }
    Ok(())
}
