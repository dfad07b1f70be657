//! Shared helpers: spawn a gateway on an ephemeral port and drive
//! WebSocket clients against it.

#![allow(dead_code, clippy::panic)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use relay_gateway::app_state::AppState;
use relay_gateway::server;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const WAIT: Duration = Duration::from_secs(5);

/// A gateway node serving on a local port.
pub struct TestNode {
    pub addr: SocketAddr,
    pub state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestNode {
    pub async fn spawn(state: AppState) -> Self {
        let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        let (tx, rx) = oneshot::channel::<()>();
        let serving = state.clone();
        let handle = tokio::spawn(async move {
            let _ = server::serve(listener, serving, async move {
                let _ = rx.await;
            })
            .await;
        });
        Self {
            addr,
            state,
            shutdown: Some(tx),
            handle,
        }
    }

    pub fn ws_url(&self, path_and_query: &str) -> String {
        format!("ws://{}{}", self.addr, path_and_query)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn connect(&self, path_and_query: &str) -> Client {
        match connect_async(self.ws_url(path_and_query)).await {
            Ok((client, _response)) => client,
            Err(err) => panic!("connect to {path_and_query} failed: {err}"),
        }
    }

    /// Polls until `path` has `expected` local sessions.
    pub async fn wait_for_sessions(&self, path: &str, expected: usize) {
        let dispatcher = self.state.dispatcher.clone();
        let path = path.to_string();
        wait_until(move || dispatcher.session_count(&path) == expected).await;
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}

/// Polls `condition` every 10 ms until it holds, panicking after [`WAIT`].
pub async fn wait_until<F>(condition: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within {WAIT:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Returns the next text frame, skipping control frames.
pub async fn recv_text(client: &mut Client) -> String {
    loop {
        match tokio::time::timeout(WAIT, client.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return text.as_str().to_owned(),
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
            Ok(other) => panic!("expected text frame, got {other:?}"),
            Err(_) => panic!("no frame within {WAIT:?}"),
        }
    }
}

/// Asserts that no data frame arrives within `window`.
pub async fn assert_silent(client: &mut Client, window: Duration) {
    if let Ok(Some(Ok(frame))) = tokio::time::timeout(window, client.next()).await {
        panic!("unexpected frame: {frame:?}");
    }
}

pub async fn send_text(client: &mut Client, text: &str) {
    if client.send(Message::text(text.to_owned())).await.is_err() {
        panic!("send failed");
    }
}
