//! i3 event subscriptions
//!
//! A subscribed channel carries nothing but event frames, so it is moved out
//! of its `Connection` and owned by an `EventStream`. `Subscription` runs an
//! `EventStream` on a tokio task and feeds each event to an `EventHandler`.
//!
//! ## Protocol
//!
//! 1. Send a `Subscribe` message whose payload is a JSON list of event names
//! 2. Receive the `{"success": true}` reply
//! 3. Continuously receive event frames (type with bit 31 set)
//!
//! ## Listener lifecycle
//!
//! The listener runs until one of:
//! - The subscription is cancelled (`Subscription::cancel` / `stop`)
//! - The channel reaches EOF between frames, which ends it with `Ok(())`
//! - A frame or payload error, including a truncated frame, which ends it
//!   with that error
//! - The handler panics, which ends it with `I3Error::ListenerFailed`
//!
//! Errors are never retried; they are logged and returned from `join`.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::I3Error;
use crate::protocol::EventKind;
use crate::reply::Reply;
use crate::transport::read_frame;

/// Pull-based reader for one event category
///
/// # Example
///
/// ```ignore
/// let mut events = connection.event_stream("window").await?;
/// loop {
///     match events.next_event().await {
///         Ok(event) => println!("window {}", event["change"]),
///         Err(I3Error::ConnectionClosed) => break,
///         Err(e) => return Err(e),
///     }
/// }
/// ```
#[derive(Debug)]
pub struct EventStream<S> {
    stream: S,
    kind: EventKind,
    max_payload: usize,
}

impl<S> EventStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(stream: S, kind: EventKind, max_payload: usize) -> Self {
        Self {
            stream,
            kind,
            max_payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Read and parse the next event.
    ///
    /// # Errors
    ///
    /// Returns `I3Error::ConnectionClosed` when the channel reaches EOF
    /// between frames, and `I3Error::ReceiveFailed` when it ends mid-frame.
    /// Returns `I3Error::WrongType` if the event belongs to another category.
    /// Returns `I3Error::ParseError` if the payload is not JSON.
    pub async fn next_event(&mut self) -> Result<Reply, I3Error> {
        let frame = read_frame(
            &mut self.stream,
            Some(self.kind.code()),
            true,
            self.max_payload,
        )
        .await?;
        Reply::parse(&frame.payload)
    }

    /// Shut the channel down.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "error shutting down i3 event channel");
        }
    }
}

/// Receives the events of a `Subscription`
///
/// Handlers run one event at a time, in arrival order, on tokio's blocking
/// pool. A handler may block without stalling the caller's runtime; events
/// that arrive meanwhile are queued.
pub trait EventHandler: Send + 'static {
    fn handle(&mut self, event: Reply);
}

impl<F> EventHandler for F
where
    F: FnMut(Reply) + Send + 'static,
{
    fn handle(&mut self, event: Reply) {
        self(event)
    }
}

/// Handle to a running event listener
///
/// Dropping the handle detaches the listener, which then runs until its
/// channel closes.
#[derive(Debug)]
pub struct Subscription {
    kind: EventKind,
    token: CancellationToken,
    handle: JoinHandle<Result<(), I3Error>>,
}

impl Subscription {
    /// Spawn a listener task for `events`.
    pub(crate) fn spawn<S, H>(events: EventStream<S>, handler: H) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        H: EventHandler,
    {
        Self::spawn_with_token(events, handler, CancellationToken::new())
    }

    /// Spawn a listener stopped by `token`, which the handler may also hold.
    pub(crate) fn spawn_with_token<S, H>(
        events: EventStream<S>,
        handler: H,
        token: CancellationToken,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        H: EventHandler,
    {
        let kind = events.kind();
        let handle = tokio::spawn(run_listener(events, handler, token.clone()));

        Self {
            kind,
            token,
            handle,
        }
    }

    pub fn event(&self) -> EventKind {
        self.kind
    }

    /// Ask the listener to stop. It exits before handling another event.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the listener to end and return how it ended.
    pub async fn join(self) -> Result<(), I3Error> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(I3Error::ListenerFailed(e.to_string())),
        }
    }

    /// Cancel the listener and wait for it.
    pub async fn stop(self) -> Result<(), I3Error> {
        self.cancel();
        self.join().await
    }
}

/// Read events on this task and hand them to the handler on the blocking pool.
async fn run_listener<S, H>(
    events: EventStream<S>,
    handler: H,
    token: CancellationToken,
) -> Result<(), I3Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    H: EventHandler,
{
    let kind = events.kind();
    debug!(event = %kind, "event listener started");

    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = tokio::task::spawn_blocking({
        let token = token.clone();
        move || dispatch(rx, handler, token)
    });

    let result = read_events(events, tx, &token).await;

    match dispatcher.await {
        Ok(()) => result,
        Err(e) => {
            warn!(event = %kind, error = %e, "event handler failed");
            Err(I3Error::ListenerFailed(e.to_string()))
        }
    }
}

async fn read_events<S>(
    mut events: EventStream<S>,
    tx: mpsc::UnboundedSender<Reply>,
    token: &CancellationToken,
) -> Result<(), I3Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let kind = events.kind();

    loop {
        // A closed queue means the handler is gone; the dispatcher reports why
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            _ = tx.closed() => None,
            next = events.next_event() => Some(next),
        };

        let Some(next) = next else {
            debug!(event = %kind, "event listener stopping");
            events.close().await;
            return Ok(());
        };

        match next {
            Ok(event) => {
                if tx.send(event).is_err() {
                    events.close().await;
                    return Ok(());
                }
            }
            Err(I3Error::ConnectionClosed) => {
                debug!(event = %kind, "i3 event channel closed");
                return Ok(());
            }
            Err(e) => {
                warn!(event = %kind, error = %e, "event listener stopped");
                return Err(e);
            }
        }
    }
}

fn dispatch<H: EventHandler>(
    mut rx: mpsc::UnboundedReceiver<Reply>,
    mut handler: H,
    token: CancellationToken,
) {
    while let Some(event) = rx.blocking_recv() {
        if token.is_cancelled() {
            break;
        }
        handler.handle(event);
    }
}
