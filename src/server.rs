use std::{net::SocketAddr, time::Duration};

use axum::{Router, routing::get};
use tokio::{sync::oneshot, task::JoinHandle};

use crate::{
    api::{self, CallbackState},
    error::Error,
};

const GRACEFUL_SHUTDOWN: Duration = Duration::from_secs(2);

/// Local redirect listener for one authorization attempt.
///
/// Dropping the handle force-closes the socket; [`CallbackServer::shutdown`]
/// lets in-flight responses finish first.
pub struct CallbackServer {
    port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

/// Binds `127.0.0.1:<port>` and serves the redirect route in the background.
pub async fn start_callback_server(port: u16, state: CallbackState) -> Result<CallbackServer, Error> {
    let app = Router::new()
        .route("/", get(api::callback))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| Error::ListenerBind { port, source })?;
    log::debug!("redirect listener bound to {addr}");

    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = rx.await;
        });
        if let Err(e) = server.await {
            log::warn!("redirect listener on port {port} failed: {e}");
        }
    });

    Ok(CallbackServer {
        port,
        shutdown: Some(tx),
        handle: Some(handle),
    })
}

impl CallbackServer {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(GRACEFUL_SHUTDOWN, &mut handle).await.is_err() {
                handle.abort();
            }
        }
        log::debug!("redirect listener on port {} stopped", self.port);
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
            log::debug!("redirect listener on port {} closed", self.port);
        }
    }
}
