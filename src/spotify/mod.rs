//! # Spotify Integration Module
//!
//! Everything that talks to Spotify over the network.
//!
//! - [`auth`] - OAuth 2.0 authorization code flow with PKCE: authorize URL,
//!   browser launch, redirect wait, code exchange and token refresh.
//! - [`player`] - the [`player::PlaybackApi`] seam and its Web API
//!   implementation for devices, playback state and player commands.
//!
//! Neither module retries. Recovery policy lives in [`crate::backend`].

pub mod auth;
pub mod player;
