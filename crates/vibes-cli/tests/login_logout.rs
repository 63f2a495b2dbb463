//! Integration tests for login/logout/whoami commands.

use std::fs;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;
use wiremock::matchers::{any, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JANE: &str = r#"{"name":"Jane Doe","email":"jane@x.com","provider":"Microsoft","id":"42"}"#;

/// Base command isolated from the caller's environment.
fn vibes(home: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("vibes");
    cmd.env("VIBES_HOME", home)
        .env("VIBES_NO_BROWSER", "1")
        .env_remove("VIBES_CLIENT_ID")
        .env_remove("VIBES_TENANT")
        .env_remove("VIBES_REDIRECT_URI")
        .env_remove("VIBES_AUTHORITY_URL")
        .env_remove("VIBES_GRAPH_URL")
        .env_remove("VIBES_LOG");
    cmd
}

/// Login command pointed at a mock identity provider.
fn login_against(home: &Path, server: &MockServer) -> Command {
    let mut cmd = vibes(home);
    cmd.env("VIBES_CLIENT_ID", "test-client")
        .env("VIBES_AUTHORITY_URL", server.uri())
        .env("VIBES_GRAPH_URL", server.uri())
        .arg("login");
    cmd
}

async fn mount_jane(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/token"))
        .and(body_string_contains("code=the-code"))
        .and(body_string_contains("client_id=test-client"))
        .and(body_string_contains("code_verifier="))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "abc"})),
        )
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .and(header("authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "displayName": "Jane Doe",
            "mail": "jane@x.com",
            "id": "42"
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[test]
fn test_whoami_when_not_signed_in() {
    let temp = tempdir().unwrap();

    vibes(temp.path())
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not signed in"));
}

#[test]
fn test_whoami_shows_saved_user() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("user.json"), JANE).unwrap();

    vibes(temp.path())
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("Jane Doe"))
        .stdout(predicate::str::contains("jane@x.com"))
        .stdout(predicate::str::contains("Microsoft"));
}

#[test]
fn test_whoami_treats_corrupt_record_as_signed_out() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("user.json"), "{not json").unwrap();

    vibes(temp.path())
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not signed in"));
}

#[test]
fn test_logout_when_not_signed_in() {
    let temp = tempdir().unwrap();

    vibes(temp.path())
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not signed in"));
}

#[test]
fn test_logout_removes_saved_user() {
    let temp = tempdir().unwrap();
    let record = temp.path().join("user.json");
    fs::write(&record, JANE).unwrap();

    vibes(temp.path())
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Signed out Jane Doe"));

    assert!(!record.exists(), "user.json should be removed");

    vibes(temp.path())
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not signed in"));
}

#[tokio::test]
async fn test_login_with_placeholder_client_id_makes_no_requests() {
    let temp = tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    vibes(temp.path())
        .env("VIBES_AUTHORITY_URL", server.uri())
        .env("VIBES_GRAPH_URL", server.uri())
        .arg("login")
        .write_stdin("the-code\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("client_id"));

    assert!(!temp.path().join("user.json").exists());
}

#[tokio::test]
async fn test_login_exchanges_pasted_code_and_saves_user() {
    let temp = tempdir().unwrap();
    let server = MockServer::start().await;
    mount_jane(&server).await;

    login_against(temp.path(), &server)
        .write_stdin("the-code\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("login.microsoftonline.com").not())
        .stdout(predicate::str::contains("code_challenge_method=S256"))
        .stdout(predicate::str::contains("Signed in as Jane Doe"));

    let contents = fs::read_to_string(temp.path().join("user.json")).unwrap();
    let saved: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(saved, serde_json::from_str::<serde_json::Value>(JANE).unwrap());
    assert!(!contents.contains("abc"), "access token must not be persisted");
}

#[tokio::test]
async fn test_login_accepts_pasted_redirect_url() {
    let temp = tempdir().unwrap();
    let server = MockServer::start().await;
    mount_jane(&server).await;

    login_against(temp.path(), &server)
        .write_stdin("http://localhost:8400/auth/callback?code=the-code\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Signed in as Jane Doe"));
}

#[tokio::test]
async fn test_login_surfaces_provider_error() {
    let temp = tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    login_against(temp.path(), &server)
        .write_stdin("error=access_denied\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("access_denied"));

    assert!(!temp.path().join("user.json").exists());
}

#[tokio::test]
async fn test_login_without_access_token_fails_generically() {
    let temp = tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    login_against(temp.path(), &server)
        .write_stdin("the-code\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Sign-in failed. Please try again."));

    assert!(!temp.path().join("user.json").exists());
}

#[tokio::test]
async fn test_login_empty_input_cancels() {
    let temp = tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    login_against(temp.path(), &server)
        .write_stdin("\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Sign-in cancelled."));
}

#[tokio::test]
async fn test_login_when_signed_in_can_be_declined() {
    let temp = tempdir().unwrap();
    let record = temp.path().join("user.json");
    fs::write(&record, JANE).unwrap();
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    login_against(temp.path(), &server)
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Already signed in as Jane Doe"))
        .stdout(predicate::str::contains("Login cancelled."));

    assert_eq!(fs::read_to_string(&record).unwrap(), JANE);
}
