use std::time::Duration;

use spotdeck::types::{Device, RepeatState};
use spotdeck::utils::*;

fn create_test_device(id: &str, active: bool) -> Device {
    Device {
        id: Some(id.to_string()),
        name: format!("{} device", id),
        is_active: active,
        supports_volume: true,
        volume_percent: Some(40),
    }
}

#[test]
fn test_generate_code_verifier() {
    let verifier = generate_code_verifier();

    // Should be exactly 128 characters
    assert_eq!(verifier.len(), 128);

    // Should contain only alphanumeric characters
    assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric()));

    // Every attempt gets its own verifier
    let verifier2 = generate_code_verifier();
    assert_ne!(verifier, verifier2);
}

#[test]
fn test_generate_code_challenge() {
    let verifier = "test_verifier_123";
    let challenge = generate_code_challenge(verifier);

    // Same input produces same output
    assert_eq!(challenge, generate_code_challenge(verifier));
    assert_ne!(challenge, generate_code_challenge("different_verifier"));

    // SHA-256 digest, base64 URL-safe without padding
    assert_eq!(challenge.len(), 43);
    assert!(
        challenge
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    );
}

#[test]
fn test_generate_code_challenge_known_vector() {
    // RFC 7636 appendix B
    let challenge = generate_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
    assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
}

#[test]
fn test_generate_state() {
    let state = generate_state();
    assert_eq!(state.len(), 32);
    assert_ne!(state, generate_state());
}

#[test]
fn test_parse_retry_after() {
    assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
    assert_eq!(parse_retry_after(" 10 "), Some(Duration::from_secs(10)));
    assert_eq!(parse_retry_after("soon"), None);
    assert_eq!(parse_retry_after(""), None);
}

#[test]
fn test_active_device() {
    let devices = vec![
        create_test_device("a", false),
        create_test_device("b", true),
        create_test_device("c", false),
    ];
    assert_eq!(active_device(&devices).and_then(|d| d.id.as_deref()), Some("b"));

    let idle = vec![create_test_device("a", false)];
    assert!(active_device(&idle).is_none());
    assert!(active_device(&[]).is_none());
}

#[test]
fn test_clamp_volume() {
    assert_eq!(clamp_volume(-5), 0);
    assert_eq!(clamp_volume(55), 55);
    assert_eq!(clamp_volume(130), 100);
}

#[test]
fn test_repeat_state_parsing() {
    assert_eq!("off".parse::<RepeatState>().unwrap(), RepeatState::Off);
    assert_eq!("Track".parse::<RepeatState>().unwrap(), RepeatState::Track);
    assert_eq!(" context ".parse::<RepeatState>().unwrap(), RepeatState::Context);

    for invalid in ["", "all", "one", "loop"] {
        assert!(invalid.parse::<RepeatState>().is_err(), "{invalid:?} accepted");
    }
}

#[test]
fn test_repeat_state_cycle() {
    assert_eq!(RepeatState::Off.cycle(), RepeatState::Context);
    assert_eq!(RepeatState::Context.cycle(), RepeatState::Track);
    assert_eq!(RepeatState::Track.cycle(), RepeatState::Off);
}
