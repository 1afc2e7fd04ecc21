//! The per-connection duplex session.
//!
//! A session is a pure I/O adaptor between one WebSocket and the director: a
//! reader task that decodes inbound frames into typed messages and posts them
//! as director events, and a writer task that drains the outbound mailbox and
//! keeps the connection alive with periodic pings. All game state stays with
//! the director; the director's side of a session is the [`SessionHandle`] it
//! keeps in its client map.

use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::http::{HeaderMap, HeaderValue, header};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use protocol::cards::SetCard;
use protocol::message::Message;
use protocol::{CLIENT_MAILBOX_SIZE, COOKIE_MAX_AGE, DRAFT_COOKIE_NAME, PING_PERIOD, PONG_WAIT, WRITE_WAIT};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};

use crate::director::{DirectorError, DirectorHandle};

/// The director's grip on one connected client: the outbound mailbox, the
/// done signal that tears the wire down, and the player's accumulated pool.
/// Only the director touches the pool.
pub struct SessionHandle {
    pub id: String,
    /// Distinguishes wires across reconnects of the same client id, so a
    /// stale wire's departure cannot evict its successor.
    pub generation: u64,
    outbox: mpsc::Sender<Message>,
    done: watch::Sender<bool>,
    pub pool: Vec<SetCard>,
}

impl SessionHandle {
    /// Builds a handle plus the receiving ends its I/O tasks run on.
    pub fn create(
        id: String,
        generation: u64,
    ) -> (SessionHandle, mpsc::Receiver<Message>, watch::Receiver<bool>) {
        let (outbox, outbox_rx) = mpsc::channel(CLIENT_MAILBOX_SIZE);
        let (done, done_rx) = watch::channel(false);
        let handle = SessionHandle {
            id,
            generation,
            outbox,
            done,
            pool: Vec::new(),
        };
        (handle, outbox_rx, done_rx)
    }

    /// Non-blocking enqueue. A client whose mailbox is full gets dropped
    /// instead of stalling the director.
    pub fn write(&self, msg: &Message) {
        if self.outbox.try_send(msg.clone()).is_err() {
            tracing::debug!(client = %self.id, "mailbox unavailable, dropping session");
            self.shutdown();
        }
    }

    /// Fires the done signal; both I/O tasks exit on their next suspension.
    pub fn shutdown(&self) {
        let _ = self.done.send(true);
    }
}

/// Runs one session to completion and reports the departure to the director.
/// Whichever I/O task fails first takes the other one down with it.
pub async fn run(
    socket: WebSocket,
    director: DirectorHandle,
    id: String,
    generation: u64,
    outbox: mpsc::Receiver<Message>,
    done: watch::Receiver<bool>,
) {
    let (sink, stream) = socket.split();

    let mut write_task = tokio::spawn(write_loop(sink, outbox, done.clone()));
    let mut read_task = tokio::spawn(read_loop(stream, director.clone(), id.clone(), done));

    tokio::select! {
        _ = &mut write_task => read_task.abort(),
        _ = &mut read_task => write_task.abort(),
    }

    director.delete_client(id, generation).await;
}

/// Decodes inbound frames and posts them to the director. Every received
/// frame (pongs included) refreshes the read deadline; a deadline miss, a
/// transport error or a decode failure ends the session.
async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    director: DirectorHandle,
    id: String,
    mut done: watch::Receiver<bool>,
) {
    loop {
        let frame = tokio::select! {
            _ = done_signal(&mut done) => return,
            frame = time::timeout(PONG_WAIT, stream.next()) => frame,
        };
        let Ok(frame) = frame else {
            tracing::debug!(client = %id, "read deadline expired");
            return;
        };

        let decoded = match frame {
            Some(Ok(WsMessage::Text(text))) => serde_json::from_str::<Message>(text.as_str()),
            Some(Ok(WsMessage::Binary(data))) => serde_json::from_slice::<Message>(&data),
            // Control frames only refresh the deadline.
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
            Some(Ok(WsMessage::Close(_))) | None => return,
            Some(Err(err)) => {
                director.error(DirectorError::Transport(err.to_string())).await;
                return;
            }
        };

        match decoded {
            Ok(msg) => director.client_message(id.clone(), msg).await,
            Err(err) => {
                director.error(DirectorError::Malformed(err)).await;
                return;
            }
        }
    }
}

/// Drains the mailbox onto the wire and pings the peer once per period. Any
/// write failure ends the session; there are no retries.
async fn write_loop(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut outbox: mpsc::Receiver<Message>,
    mut done: watch::Receiver<bool>,
) {
    let mut ping = time::interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);
    loop {
        tokio::select! {
            _ = done_signal(&mut done) => {
                // Flush what the director already enqueued, then say goodbye.
                while let Ok(msg) = outbox.try_recv() {
                    if send_frame(&mut sink, &msg).await.is_err() {
                        return;
                    }
                }
                let _ = sink.send(WsMessage::Close(None)).await;
                return;
            }
            msg = outbox.recv() => {
                let Some(msg) = msg else { return };
                if let Err(err) = send_frame(&mut sink, &msg).await {
                    tracing::debug!(error = %err, "write failed, closing session");
                    return;
                }
            }
            _ = ping.tick() => {
                match time::timeout(WRITE_WAIT, sink.send(WsMessage::Ping(Bytes::new()))).await {
                    Ok(Ok(())) => {}
                    _ => return,
                }
            }
        }
    }
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    msg: &Message,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(msg).map_err(axum::Error::new)?;
    match time::timeout(WRITE_WAIT, sink.send(WsMessage::Text(text.into()))).await {
        Ok(result) => result,
        Err(elapsed) => Err(axum::Error::new(elapsed)),
    }
}

/// Resolves when the done signal fires. A dropped sender counts as done: the
/// director has forgotten this session.
async fn done_signal(done: &mut watch::Receiver<bool>) {
    let _ = done.wait_for(|flag| *flag).await;
}

/// Extracts the draft cookie from a request, if the client carries one.
pub fn draft_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == DRAFT_COOKIE_NAME).then(|| value.to_string())
    })
}

/// Builds the `Set-Cookie` value that lets this client resume its seat.
pub fn draft_cookie_header(client_id: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{DRAFT_COOKIE_NAME}={client_id}; Path=/; Max-Age={}",
        COOKIE_MAX_AGE.as_secs()
    ))
    .ok()
}
