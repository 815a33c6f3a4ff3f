use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::{
    config::{Config, REQUIRED_SCOPES},
    error::Error,
    types::{Token, TokenResponse},
};

/// Seconds before `expires_at` at which a token counts as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// File backed holder of the single OAuth token set.
///
/// Nothing else reads or writes the token cache file.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.token_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        async_fs::metadata(&self.path)
            .await
            .is_ok_and(|meta| meta.is_file())
    }

    /// Reads the cache file. Absent or malformed files yield `None`.
    pub async fn load(&self) -> Option<Token> {
        let content = async_fs::read_to_string(&self.path).await.ok()?;
        match serde_json::from_str::<Token>(&content) {
            Ok(token) => Some(token),
            Err(e) => {
                log::debug!("ignoring malformed token cache {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Replaces the cache file atomically: the token is written to a sibling
    /// temp file which is then renamed over the old one.
    pub async fn save(&self, token: &Token) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(token)?;
        let tmp = self.path.with_extension("tmp");
        async_fs::write(&tmp, json).await?;
        async_fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), Error> {
        match async_fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Offline validity check.
    ///
    /// An expired access token still counts as valid while a refresh token is
    /// present, since it is refreshed transparently before the next call.
    pub fn is_valid(token: &Token) -> bool {
        if token.access_token.is_empty() || !Self::has_required_scopes(token) {
            return false;
        }
        !Self::is_expired(token) || !token.refresh_token.is_empty()
    }

    pub fn is_expired(token: &Token) -> bool {
        Utc::now().timestamp() >= token.expires_at - EXPIRY_MARGIN_SECS
    }

    pub fn has_required_scopes(token: &Token) -> bool {
        REQUIRED_SCOPES
            .iter()
            .all(|required| token.scopes().any(|granted| granted == *required))
    }
}

/// Turns a token endpoint response into a storable token set.
///
/// Refresh responses may omit the refresh token and the scope, in which case
/// the previous values are kept.
pub fn token_from_response(response: TokenResponse, previous: Option<&Token>) -> Token {
    Token {
        access_token: response.access_token,
        refresh_token: response
            .refresh_token
            .or_else(|| previous.map(|t| t.refresh_token.clone()))
            .unwrap_or_default(),
        expires_at: Utc::now().timestamp() + response.expires_in,
        scope: response
            .scope
            .or_else(|| previous.map(|t| t.scope.clone()))
            .unwrap_or_default(),
    }
}
