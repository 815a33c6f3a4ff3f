use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};

use crate::types::Device;

pub fn generate_code_verifier() -> String {
    random_string(128)
}

pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Opaque value echoed back by the authorization server on redirect.
pub fn generate_state() -> String {
    random_string(32)
}

fn random_string(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Parses a `Retry-After` header value given in delta seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

pub fn active_device(devices: &[Device]) -> Option<&Device> {
    devices.iter().find(|d| d.is_active)
}

pub fn clamp_volume(volume: i32) -> u8 {
    volume.clamp(0, 100) as u8
}
