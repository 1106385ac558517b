//! Subscribe sessions: readiness handshake, frame dispatch, and teardown.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::transport::{PushConnection, StreamCloser, StreamEvent};
use crate::types::{Error, SubscriberError};

/// Where stream-level errors go.
pub(crate) enum ErrorSink {
    Surfaced(Box<dyn FnMut(SubscriberError) + Send>),
    Silent,
}

/// Decodes frames into `T` and hands them to the caller's callbacks.
pub(crate) struct Dispatcher<T, M> {
    channel: String,
    on_message: M,
    on_error: ErrorSink,
    _payload: PhantomData<fn() -> T>,
}

impl<T, M> Dispatcher<T, M>
where
    T: DeserializeOwned,
    M: FnMut(T) + Send,
{
    pub(crate) fn new(channel: String, on_message: M, on_error: ErrorSink) -> Self {
        Self {
            channel,
            on_message,
            on_error,
            _payload: PhantomData,
        }
    }

    fn deliver(&mut self, data: &str) -> Result<(), Error> {
        let payload = serde_json::from_str::<T>(data).map_err(|e| {
            tracing::error!(channel = %self.channel, "Failed to decode message: {e}");
            Error::Decode(e)
        })?;
        (self.on_message)(payload);
        Ok(())
    }

    fn surface(&mut self, error: SubscriberError) {
        match &mut self.on_error {
            ErrorSink::Surfaced(on_error) => on_error(error),
            ErrorSink::Silent => {
                tracing::debug!(channel = %self.channel, status = ?error.status, "Stream error without handler");
            }
        }
    }
}

/// Handle to an open subscription.
///
/// [`close`](Session::close) stops delivery and closes the connection. It is
/// guarded: the first call closes, later calls do nothing. Dropping the
/// session closes it as well.
pub struct Session {
    channel: String,
    closer: Option<Box<dyn StreamCloser>>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), Error>>>,
}

impl Session {
    /// The channel this session delivers.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_none()
    }

    /// Close the stream. Safe to call more than once.
    pub fn close(&mut self) {
        let Some(closer) = self.closer.take() else {
            return;
        };
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        closer.close();
        tracing::debug!(channel = %self.channel, "Session closed");
    }

    /// Wait for dispatch to finish.
    ///
    /// Returns once the session is closed or the stream ends. A frame that
    /// fails to decode stops dispatch and is returned as [`Error::Decode`].
    /// A panic in a callback is resumed here.
    pub async fn join(&mut self) -> Result<(), Error> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Ok(()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("channel", &self.channel)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Wait for the connection to open, then spawn the dispatch task.
///
/// Frames and errors arriving before `Open` are dispatched as usual. If the
/// transport gives up before opening, the last error it reported is returned.
pub(crate) async fn establish<T, M>(
    connection: PushConnection,
    mut dispatcher: Dispatcher<T, M>,
) -> Result<Session, Error>
where
    T: DeserializeOwned + 'static,
    M: FnMut(T) + Send + 'static,
{
    let PushConnection { mut events, closer } = connection;
    let mut last_error: Option<SubscriberError> = None;

    loop {
        let outcome = match events.recv().await {
            Some(StreamEvent::Open) => break,
            Some(StreamEvent::Message { data }) => dispatcher.deliver(&data),
            Some(StreamEvent::Error { status, data }) => {
                let error = SubscriberError::new(status, data);
                last_error = Some(error.clone());
                dispatcher.surface(error);
                Ok(())
            }
            None => Err(Error::Remote(last_error.take().unwrap_or_else(|| {
                SubscriberError::new(None, Some("stream closed before open".to_string()))
            }))),
        };
        if let Err(e) = outcome {
            closer.close();
            return Err(e);
        }
    }

    tracing::debug!(channel = %dispatcher.channel, "Session open");

    let channel = dispatcher.channel.clone();
    let (stop_tx, stop_rx) = oneshot::channel();
    let task = tokio::spawn(run_dispatch(events, stop_rx, dispatcher));

    Ok(Session {
        channel,
        closer: Some(closer),
        stop_tx: Some(stop_tx),
        task: Some(task),
    })
}

async fn run_dispatch<T, M>(
    mut events: mpsc::Receiver<StreamEvent>,
    mut stop_rx: oneshot::Receiver<()>,
    mut dispatcher: Dispatcher<T, M>,
) -> Result<(), Error>
where
    T: DeserializeOwned,
    M: FnMut(T) + Send,
{
    loop {
        tokio::select! {
            biased;

            _ = &mut stop_rx => return Ok(()),

            event = events.recv() => match event {
                Some(StreamEvent::Message { data }) => dispatcher.deliver(&data)?,
                Some(StreamEvent::Error { status, data }) => {
                    dispatcher.surface(SubscriberError::new(status, data));
                }
                Some(StreamEvent::Open) => {}
                None => {
                    tracing::debug!(channel = %dispatcher.channel, "Push stream ended");
                    return Ok(());
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::Value;

    use super::*;

    struct CountingCloser(Arc<AtomicUsize>);

    impl StreamCloser for CountingCloser {
        fn close(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn connection() -> (
        mpsc::Sender<StreamEvent>,
        PushConnection,
        Arc<AtomicUsize>,
    ) {
        let (tx, rx) = mpsc::channel(8);
        let closes = Arc::new(AtomicUsize::new(0));
        let conn = PushConnection {
            events: rx,
            closer: Box::new(CountingCloser(closes.clone())),
        };
        (tx, conn, closes)
    }

    fn message(data: &str) -> StreamEvent {
        StreamEvent::Message {
            data: data.to_string(),
        }
    }

    #[tokio::test]
    async fn dispatches_in_order_after_open() {
        let (tx, conn, _closes) = connection();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(
            "orders".into(),
            move |v: Value| {
                let _ = seen_tx.send(v);
            },
            ErrorSink::Silent,
        );

        tx.send(StreamEvent::Open).await.unwrap();
        let mut session = establish(conn, dispatcher).await.unwrap();
        assert_eq!(session.channel(), "orders");

        for i in 0..5 {
            tx.send(message(&format!("{{\"n\":{i}}}"))).await.unwrap();
        }
        drop(tx);
        session.join().await.unwrap();

        for i in 0..5 {
            assert_eq!(seen_rx.recv().await.unwrap()["n"], i);
        }
    }

    #[tokio::test]
    async fn ends_before_open_with_last_error() {
        let (tx, conn, closes) = connection();
        let dispatcher = Dispatcher::new("orders".into(), |_: Value| {}, ErrorSink::Silent);

        tx.send(StreamEvent::Error {
            status: Some(401),
            data: Some("unauthorized".into()),
        })
        .await
        .unwrap();
        drop(tx);

        let err = establish(conn, dispatcher).await.unwrap_err();
        let remote = err.as_remote().unwrap();
        assert_eq!(remote.status, Some(401));
        assert_eq!(remote.message.as_deref(), Some("unauthorized"));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ends_before_open_without_error() {
        let (tx, conn, _closes) = connection();
        let dispatcher = Dispatcher::new("orders".into(), |_: Value| {}, ErrorSink::Silent);
        drop(tx);

        let err = establish(conn, dispatcher).await.unwrap_err();
        assert_eq!(err.as_remote().unwrap().status, None);
    }

    #[tokio::test]
    async fn decode_failure_faults_session() {
        let (tx, conn, closes) = connection();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(
            "orders".into(),
            move |v: Value| {
                let _ = seen_tx.send(v);
            },
            ErrorSink::Silent,
        );

        tx.send(StreamEvent::Open).await.unwrap();
        let mut session = establish(conn, dispatcher).await.unwrap();
        tx.send(message("{not json")).await.unwrap();

        let err = session.join().await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        // Later frames go nowhere.
        let _ = tx.send(message("{\"n\":1}")).await;
        assert!(seen_rx.try_recv().is_err());
        // Faulted, not closed: teardown is still the caller's.
        assert!(!session.is_closed());
        assert_eq!(closes.load(Ordering::SeqCst), 0);
        session.close();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_is_guarded() {
        let (tx, conn, closes) = connection();
        let dispatcher = Dispatcher::new("orders".into(), |_: Value| {}, ErrorSink::Silent);
        tx.send(StreamEvent::Open).await.unwrap();

        let mut session = establish(conn, dispatcher).await.unwrap();
        session.close();
        session.close();
        assert!(session.is_closed());
        session.join().await.unwrap();
        drop(session);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drop_closes() {
        let (tx, conn, closes) = connection();
        let dispatcher = Dispatcher::new("orders".into(), |_: Value| {}, ErrorSink::Silent);
        tx.send(StreamEvent::Open).await.unwrap();

        let session = establish(conn, dispatcher).await.unwrap();
        drop(session);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
