mod common;

use chrono::Utc;
use spotdeck::{
    config::{Config, Settings},
    error::Error,
    management::TokenStore,
    types::Credentials,
};
use tempfile::TempDir;

use common::valid_token;

#[tokio::test]
async fn load_returns_none_without_cache_file() {
    let dir = TempDir::new().unwrap();
    let store = TokenStore::new(dir.path().join(".cache"));

    assert!(!store.exists().await);
    assert!(store.load().await.is_none());
}

#[tokio::test]
async fn load_returns_none_for_malformed_cache_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".cache");
    std::fs::write(&path, "{ not json").unwrap();
    let store = TokenStore::new(&path);

    assert!(store.exists().await);
    assert!(store.load().await.is_none());
}

#[tokio::test]
async fn save_overwrites_and_clear_removes() {
    let dir = TempDir::new().unwrap();
    let store = TokenStore::new(dir.path().join("nested").join(".cache"));

    let first = valid_token();
    store.save(&first).await.unwrap();
    assert_eq!(store.load().await, Some(first.clone()));

    let second = spotdeck::types::Token {
        access_token: "second".to_string(),
        ..first
    };
    store.save(&second).await.unwrap();
    assert_eq!(store.load().await.unwrap().access_token, "second");
    assert!(!store.path().with_extension("tmp").exists());

    store.clear().await.unwrap();
    assert!(!store.exists().await);
    // Clearing twice is fine
    store.clear().await.unwrap();
}

#[test]
fn valid_token_passes() {
    assert!(TokenStore::is_valid(&valid_token()));
}

#[test]
fn missing_scope_is_invalid() {
    let token = spotdeck::types::Token {
        scope: "user-read-playback-state user-modify-playback-state".to_string(),
        ..valid_token()
    };
    assert!(!TokenStore::has_required_scopes(&token));
    assert!(!TokenStore::is_valid(&token));
}

#[test]
fn empty_access_token_is_invalid() {
    let token = spotdeck::types::Token {
        access_token: String::new(),
        ..valid_token()
    };
    assert!(!TokenStore::is_valid(&token));
}

#[test]
fn expired_token_needs_refresh_token() {
    let expired = spotdeck::types::Token {
        expires_at: Utc::now().timestamp() - 10,
        ..valid_token()
    };
    assert!(TokenStore::is_expired(&expired));
    // Still usable: it is refreshed before the next call
    assert!(TokenStore::is_valid(&expired));

    let dead = spotdeck::types::Token {
        refresh_token: String::new(),
        ..expired
    };
    assert!(!TokenStore::is_valid(&dead));
}

#[test]
fn token_close_to_expiry_counts_as_expired() {
    let token = spotdeck::types::Token {
        expires_at: Utc::now().timestamp() + 30,
        ..valid_token()
    };
    assert!(TokenStore::is_expired(&token));
}

#[test]
fn credentials_validation() {
    let creds = Credentials::new(" abc ", "8080").unwrap();
    assert_eq!(creds.client_id, "abc");
    assert_eq!(creds.redirect_port, 8080);
    assert_eq!(creds.redirect_uri(), "http://127.0.0.1:8080");

    for (id, port) in [("", "8080"), ("   ", "8080"), ("abc", ""), ("abc", "0"), ("abc", "http"), ("abc", "70000")] {
        assert!(
            matches!(Credentials::new(id, port), Err(Error::InvalidCredentials(_))),
            "accepted {id:?}/{port:?}"
        );
    }
}

#[tokio::test]
async fn settings_default_when_missing() {
    let dir = TempDir::new().unwrap();
    let config = Config::with_data_dir(dir.path());

    let settings = Settings::load(&config).await;
    assert_eq!(settings, Settings::default());
    assert!(settings.credentials().is_none());
}

#[tokio::test]
async fn settings_persist_credentials() {
    let dir = TempDir::new().unwrap();
    let config = Config::with_data_dir(dir.path());

    let mut settings = Settings::default();
    settings.set_credentials(&Credentials::new("abc", "8080").unwrap());
    settings.persist(&config).await.unwrap();

    let loaded = Settings::load(&config).await;
    assert_eq!(loaded.credentials(), Some(Credentials::new("abc", "8080").unwrap()));
}

#[tokio::test]
async fn settings_without_version_are_upgraded() {
    let dir = TempDir::new().unwrap();
    let config = Config::with_data_dir(dir.path());
    std::fs::write(config.settings_path(), r#"{"client_id": "  ", "redirect_port": 8080}"#).unwrap();

    let loaded = Settings::load(&config).await;
    assert_eq!(loaded.version, spotdeck::config::SETTINGS_VERSION);
    assert_eq!(loaded.client_id, None);
    assert_eq!(loaded.redirect_port, Some(8080));
    assert!(loaded.credentials().is_none());
}
