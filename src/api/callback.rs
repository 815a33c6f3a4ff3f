use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
};
use tokio::sync::{Mutex, oneshot};

const SUCCESS_PAGE: &str =
    "<h2>Authentication successful.</h2><p>You can now close this browser tab and continue on your deck.</p>";
const MISSING_CODE_PAGE: &str = "<h4>Missing authorization code.</h4>";
const STATE_MISMATCH_PAGE: &str = "<h4>Authorization response does not match this login attempt.</h4>";
const DENIED_PAGE: &str = "<h4>Authorization was not granted.</h4><p>Retry from the settings panel.</p>";

/// Shared state of the redirect route for one authorization attempt.
#[derive(Clone)]
pub struct CallbackState {
    expected_state: Arc<str>,
    sender: Arc<Mutex<Option<oneshot::Sender<String>>>>,
}

impl CallbackState {
    pub fn new(expected_state: String, sender: oneshot::Sender<String>) -> Self {
        Self {
            expected_state: expected_state.into(),
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }
}

/// `GET /?code=...&state=...`
///
/// The first request carrying a code hands it to the waiting authorization
/// flow, unless it echoes a `state` other than the one this attempt sent.
/// Anything else gets an error page and the listener keeps waiting.
pub async fn callback(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<CallbackState>,
) -> (StatusCode, Html<&'static str>) {
    if let Some(error) = params.get("error") {
        log::warn!("authorization redirect carried error {error:?}");
        return (StatusCode::BAD_REQUEST, Html(DENIED_PAGE));
    }

    let Some(code) = params.get("code").filter(|c| !c.is_empty()) else {
        return (StatusCode::BAD_REQUEST, Html(MISSING_CODE_PAGE));
    };

    // Only a state that is present and wrong disqualifies the redirect.
    if params
        .get("state")
        .is_some_and(|received| received.as_str() != &*state.expected_state)
    {
        log::warn!("ignoring redirect with unexpected state parameter");
        return (StatusCode::BAD_REQUEST, Html(STATE_MISMATCH_PAGE));
    }

    let mut sender = state.sender.lock().await;
    match sender.take() {
        Some(tx) => {
            if tx.send(code.clone()).is_err() {
                log::warn!("authorization code arrived after the attempt was abandoned");
                return (StatusCode::GONE, Html(DENIED_PAGE));
            }
            log::debug!("authorization code captured");
        }
        None => log::debug!("authorization code already captured, ignoring repeat"),
    }

    (StatusCode::OK, Html(SUCCESS_PAGE))
}
