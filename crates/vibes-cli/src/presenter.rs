//! Terminal rendering of sign-in state.
//!
//! `Interactive` is used when stdout is a terminal; `Plain` keeps output
//! free of symbols for pipes and logs.

use std::io::{self, IsTerminal};
use std::path::Path;

use tokio::sync::watch;
use vibes_core::auth::{AuthState, UserProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presenter {
    Interactive,
    Plain,
}

impl Presenter {
    pub fn detect() -> Self {
        if io::stdout().is_terminal() {
            Presenter::Interactive
        } else {
            Presenter::Plain
        }
    }

    /// Prints progress for each transition until the session goes away.
    pub async fn follow(self, mut rx: watch::Receiver<AuthState>) {
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            if let Some(line) = self.progress_line(&state) {
                println!("{line}");
            }
        }
    }

    fn progress_line(self, state: &AuthState) -> Option<&'static str> {
        match (self, state) {
            (Presenter::Interactive, AuthState::ExchangingToken) => {
                Some("⏳ Exchanging code for tokens...")
            }
            (Presenter::Plain, AuthState::ExchangingToken) => Some("Exchanging code for tokens..."),
            _ => None,
        }
    }

    pub fn signed_in(self, user: &UserProfile, record_path: &Path) {
        println!();
        println!("{}", self.headline(&format!("Signed in as {}", user.name)));
        println!("  Email:    {}", user.email);
        println!("  Provider: {}", user.provider);
        println!("  Saved to: {}", record_path.display());
        if self == Presenter::Interactive {
            println!();
            println!("Hello {} 👋", first_name(&user.name));
        }
    }

    pub fn signed_out(self, user: &UserProfile, record_path: &Path) {
        println!(
            "{}",
            self.headline(&format!("Signed out {} ({})", user.name, user.email))
        );
        println!("  Removed: {}", record_path.display());
    }

    pub fn already_signed_in(self, user: &UserProfile) {
        println!("Already signed in as {} <{}>", user.name, user.email);
    }

    pub fn profile(self, user: &UserProfile) {
        println!("{}", self.headline(&user.name));
        println!("  Email:    {}", user.email);
        println!("  Provider: {}", user.provider);
        println!("  Id:       {}", user.id);
    }

    fn headline(self, text: &str) -> String {
        match self {
            Presenter::Interactive => format!("✓ {text}"),
            Presenter::Plain => text.to_string(),
        }
    }
}

fn first_name(name: &str) -> &str {
    name.split_whitespace().next().unwrap_or(name)
}
