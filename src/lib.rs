//! spotdeck library
//!
//! Keeps an authenticated Spotify Web API session alive for a stream deck and
//! exposes always-fresh playback state to its buttons. It includes the OAuth
//! PKCE flow with its local redirect listener, the token store, a background
//! poller that caches playback and devices, and the command methods the
//! buttons call.
//!
//! # Modules
//!
//! - `api` - HTTP handlers for the local redirect listener
//! - `backend` - The facade consumed by deck actions, plus the poller
//! - `config` - Typed configuration and persisted user settings
//! - `error` - Error taxonomy
//! - `management` - Token store and state cache
//! - `server` - Local HTTP listener for OAuth redirects
//! - `spotify` - Spotify authorization and Web API client
//! - `types` - Data structures and type definitions
//! - `utils` - Utility functions and helpers
//!
//! # Example
//!
//! ```
//! use spotdeck::{backend::{Backend, Poller}, config::Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = Backend::from_config(Config::from_env()).await;
//!     let _poller = Poller::new(backend.clone()).start();
//!     backend.set_action_active();
//! }
//! ```

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod management;
pub mod server;
pub mod spotify;
pub mod types;
pub mod utils;

/// Boxed error alias for binary level plumbing where the concrete
/// [`error::Error`] is not needed.
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Prints a status line with a blue bullet.
///
/// ```
/// info!("Waiting for {} devices", count);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a confirmation line with a green checkmark.
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a red error line to stderr and exits with status 1.
///
/// Only for the binary: the library reports errors through
/// [`error::Error`] and never terminates the process.
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a yellow warning line to stderr.
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
