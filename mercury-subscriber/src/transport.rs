//! Push-stream transport: the trait the session layer consumes and the
//! default Server-Sent Events implementation.

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;
/// Error data reported when the server ends an open stream.
pub const STREAM_ENDED: &str = "stream ended";

/// What a push stream reports to its consumer, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The connection is established and frames may follow.
    Open,
    /// One message frame; `data` is the raw payload text.
    Message { data: String },
    /// A stream-level failure. The stream may keep going afterwards; a
    /// transport that gives up reports one of these before ending.
    Error {
        status: Option<u16>,
        data: Option<String>,
    },
}

/// Closes the underlying connection. Must be safe to call more than once.
pub trait StreamCloser: Send + Sync {
    fn close(&self);
}

/// A connection attempt in progress.
///
/// `events` yields [`StreamEvent::Open`] once the connection is usable and
/// ends when the transport gives up or is closed.
pub struct PushConnection {
    pub events: mpsc::Receiver<StreamEvent>,
    pub closer: Box<dyn StreamCloser>,
}

/// A persistent push-stream client.
///
/// `connect` starts connecting in the background and returns immediately;
/// readiness is reported through the event channel.
pub trait PushStreamClient: Send + Sync {
    fn connect(&self, url: Url, headers: HeaderMap) -> PushConnection;
}

/// Server-Sent Events over a streaming `reqwest` GET.
///
/// Does not reconnect: a failed or finished response ends the event channel.
#[derive(Debug, Clone)]
pub struct SseClient {
    http: reqwest::Client,
    capacity: usize,
}

impl SseClient {
    /// `http` must not carry a total request timeout, or long-lived streams
    /// get cut off.
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl PushStreamClient for SseClient {
    fn connect(&self, url: Url, headers: HeaderMap) -> PushConnection {
        let (tx, rx) = mpsc::channel(self.capacity);
        let cancel = CancellationToken::new();
        let request = self
            .http
            .get(url)
            .headers(headers)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"));

        tokio::spawn(run_sse(request, tx, cancel.clone()));

        PushConnection {
            events: rx,
            closer: Box::new(CancelCloser(cancel)),
        }
    }
}

struct CancelCloser(CancellationToken);

impl StreamCloser for CancelCloser {
    fn close(&self) {
        self.0.cancel();
    }
}

// An abandoned connect must not keep the request running.
impl Drop for CancelCloser {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

async fn run_sse(
    request: reqwest::RequestBuilder,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::debug!("SSE stream closed");
        }
        _ = read_sse(request, &tx) => {}
    }
}

async fn read_sse(request: reqwest::RequestBuilder, tx: &mpsc::Sender<StreamEvent>) {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("SSE connect failed: {e}");
            let _ = tx
                .send(StreamEvent::Error {
                    status: e.status().map(|s| s.as_u16()),
                    data: Some(e.to_string()),
                })
                .await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.ok();
        tracing::debug!(status = status.as_u16(), "SSE request rejected");
        let _ = tx
            .send(StreamEvent::Error {
                status: Some(status.as_u16()),
                data: body,
            })
            .await;
        return;
    }

    if tx.send(StreamEvent::Open).await.is_err() {
        return;
    }

    let mut events = response.bytes_stream().eventsource();
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                // Named events are not message frames.
                if !event.event.is_empty() && event.event != "message" {
                    tracing::debug!(event = %event.event, "Ignoring named SSE event");
                    continue;
                }
                // An empty data buffer dispatches nothing (keep-alive frames).
                if event.data.is_empty() {
                    continue;
                }
                if tx
                    .send(StreamEvent::Message { data: event.data })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => {
                tracing::debug!("SSE stream error: {e}");
                let _ = tx
                    .send(StreamEvent::Error {
                        status: None,
                        data: Some(e.to_string()),
                    })
                    .await;
                return;
            }
        }
    }
    tracing::debug!("SSE stream ended");
    let _ = tx
        .send(StreamEvent::Error {
            status: None,
            data: Some(STREAM_ENDED.to_string()),
        })
        .await;
}
