//! # API Module
//!
//! HTTP handlers served by the local redirect listener during an OAuth PKCE
//! authorization attempt.
//!
//! - [`callback`] - receives Spotify's redirect on `GET /` and hands the
//!   authorization code to the waiting [`crate::spotify::auth::AuthFlow`].
//!
//! The listener itself lives in [`crate::server`].

mod callback;

pub use callback::CallbackState;
pub use callback::callback;
