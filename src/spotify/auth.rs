use std::sync::{Arc, Mutex, PoisonError};

use reqwest::{Client, StatusCode, Url};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::{
    api::CallbackState,
    config::Config,
    error::Error,
    management::{TokenStore, token_from_response},
    server::start_callback_server,
    types::{Credentials, PkceToken, Token, TokenResponse},
    utils,
};

/// Where an authorization attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    AwaitingRedirect,
    Exchanging,
    Authenticated,
}

/// Something that can show the authorize URL to the user.
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<(), String>;
}

/// Opens URLs in the default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl UrlOpener for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), String> {
        webbrowser::open(url).map_err(|e| e.to_string())
    }
}

/// OAuth 2.0 authorization code flow with PKCE against Spotify accounts.
///
/// One attempt at a time: a second [`AuthFlow::authorize`] while another is
/// waiting fails with [`Error::AuthorizationInProgress`] instead of binding
/// the redirect port twice.
pub struct AuthFlow {
    config: Arc<Config>,
    http: Client,
    opener: Arc<dyn UrlOpener>,
    state: Mutex<AuthState>,
    attempt: tokio::sync::Mutex<()>,
}

impl AuthFlow {
    pub fn new(config: Arc<Config>, opener: Arc<dyn UrlOpener>) -> Self {
        Self {
            config,
            http: Client::new(),
            opener,
            state: Mutex::new(AuthState::Idle),
            attempt: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> AuthState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: AuthState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            log::debug!("authorization state {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    /// Builds the Spotify authorize URL for one attempt.
    pub fn authorize_url(&self, credentials: &Credentials, pkce: &PkceToken) -> Result<Url, Error> {
        let challenge = utils::generate_code_challenge(&pkce.code_verifier);
        Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("client_id", credentials.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", credentials.redirect_uri().as_str()),
                ("code_challenge_method", "S256"),
                ("code_challenge", challenge.as_str()),
                ("state", pkce.state.as_str()),
                ("scope", self.config.scope().as_str()),
            ],
        )
        .map_err(|e| Error::InvalidCredentials(format!("cannot build authorize url: {e}")))
    }

    /// Runs a full interactive attempt and persists the resulting token.
    ///
    /// 1. Generate a fresh code verifier, challenge and state
    /// 2. Bind the redirect listener on `127.0.0.1:<redirect_port>`
    /// 3. Open the authorize URL in the browser
    /// 4. Wait for the redirect, bounded by `auth_timeout` and `cancel`
    /// 5. Exchange the code and save the token through `store`
    ///
    /// The listener is closed on every exit path. On failure the flow is back
    /// in [`AuthState::Idle`] and nothing has been written.
    pub async fn authorize(
        &self,
        credentials: &Credentials,
        store: &TokenStore,
        cancel: &CancellationToken,
    ) -> Result<Token, Error> {
        let Ok(_attempt) = self.attempt.try_lock() else {
            return Err(Error::AuthorizationInProgress);
        };

        let result = self.run_attempt(credentials, store, cancel).await;
        match &result {
            Ok(_) => self.set_state(AuthState::Authenticated),
            Err(e) => {
                log::warn!("authorization failed: {e}");
                self.set_state(AuthState::Idle);
            }
        }
        result
    }

    async fn run_attempt(
        &self,
        credentials: &Credentials,
        store: &TokenStore,
        cancel: &CancellationToken,
    ) -> Result<Token, Error> {
        let pkce = PkceToken {
            code_verifier: utils::generate_code_verifier(),
            state: utils::generate_state(),
        };
        let auth_url = self.authorize_url(credentials, &pkce)?;

        let (tx, rx) = oneshot::channel();
        let server = start_callback_server(
            credentials.redirect_port,
            CallbackState::new(pkce.state.clone(), tx),
        )
        .await?;
        self.set_state(AuthState::AwaitingRedirect);

        if let Err(e) = self.opener.open(auth_url.as_str()) {
            log::warn!("failed to open browser ({e}), navigate to {auth_url} manually");
        }

        let timeout = self.config.auth_timeout;
        let code = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(Error::AuthorizationDenied("attempt cancelled".into()));
            }
            received = tokio::time::timeout(timeout, rx) => match received {
                Ok(Ok(code)) => code,
                Ok(Err(_)) => {
                    return Err(Error::AuthorizationDenied("redirect listener stopped".into()));
                }
                Err(_) => {
                    return Err(Error::AuthorizationDenied(format!(
                        "no redirect received within {}s",
                        timeout.as_secs()
                    )));
                }
            },
        };

        self.set_state(AuthState::Exchanging);
        let token = self
            .exchange_code(credentials, &code, &pkce.code_verifier)
            .await?;
        store.save(&token).await?;
        server.shutdown().await;

        Ok(token)
    }

    /// Exchanges an authorization code for a token set.
    pub async fn exchange_code(
        &self,
        credentials: &Credentials,
        code: &str,
        verifier: &str,
    ) -> Result<Token, Error> {
        let redirect_uri = credentials.redirect_uri();
        let res = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", credentials.client_id.as_str()),
                ("code", code),
                ("code_verifier", verifier),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::TokenExchangeFailed(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(Error::TokenExchangeFailed(format!("{status}: {body}")));
        }

        let response: TokenResponse = res
            .json()
            .await
            .map_err(|e| Error::TokenExchangeFailed(e.to_string()))?;
        Ok(token_from_response(response, None))
    }

    /// Exchanges the refresh token of `token` for a new access token.
    ///
    /// A rejected refresh token maps to [`Error::TokenExpiredOrRevoked`].
    pub async fn refresh(&self, client_id: &str, token: &Token) -> Result<Token, Error> {
        let res = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", token.refresh_token.as_str()),
                ("client_id", client_id),
            ])
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable(e.to_string()))?;

        let status = res.status();
        if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED) {
            return Err(Error::TokenExpiredOrRevoked);
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(Error::TokenExchangeFailed(format!("{status}: {body}")));
        }

        let response: TokenResponse = res
            .json()
            .await
            .map_err(|e| Error::TokenExchangeFailed(e.to_string()))?;
        log::debug!("access token refreshed");
        Ok(token_from_response(response, Some(token)))
    }
}
