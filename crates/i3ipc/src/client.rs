//! i3 IPC session
//!
//! `Connection` speaks request/reply over one command channel and turns that
//! channel into an event channel on `subscribe`.
//!
//! ## Event channels
//!
//! Once subscribed, i3 pushes event frames at any moment, so a subscribed
//! channel can no longer carry requests. `subscribe` hands the channel to
//! the listener and leaves the `Connection` disconnected; the next `connect`
//! dials a fresh command channel.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use i3ipc_config::{Config, ConnectionConfig};

use crate::error::I3Error;
use crate::events::{EventHandler, EventStream, Subscription};
use crate::protocol::{EventKind, MessageType};
use crate::reply::Reply;
use crate::transport::{Connector, Transport, UnixConnector};

/// Backoff settings for `Connection::connect_with_retry`
///
/// The delay starts at `initial_delay` and doubles after every failed
/// attempt, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one (0 means try once)
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ConnectionConfig::default())
    }
}

impl From<&ConnectionConfig> for RetryPolicy {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            max_retries: config.connect_retries,
            initial_delay: Duration::from_millis(config.retry_delay_ms),
            max_delay: Duration::from_millis(config.max_retry_delay_ms),
        }
    }
}

/// Client session with i3
///
/// # Example
///
/// ```ignore
/// let mut i3 = Connection::open("/run/user/1000/i3/ipc-socket.1234").await?;
/// let reply = i3.command("workspace 2").await?;
/// if !reply.at(0)?.is_successful() {
///     eprintln!("i3 refused: {}", reply[0]["error"]);
/// }
///
/// let subscription = i3
///     .subscribe("window", |event: Reply| println!("{}", event["change"]))
///     .await?;
/// ```
#[derive(Debug)]
pub struct Connection<C: Connector = UnixConnector> {
    transport: Transport<C>,
    retry: RetryPolicy,
}

impl Connection<UnixConnector> {
    /// Create a disconnected session for the socket at `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self::with_connector(UnixConnector::new(socket_path))
    }

    /// Create a session and connect it right away.
    pub async fn open(socket_path: impl Into<PathBuf>) -> Result<Self, I3Error> {
        let mut connection = Self::new(socket_path);
        connection.connect().await?;
        Ok(connection)
    }

    /// Create a disconnected session from a parsed configuration.
    ///
    /// # Errors
    ///
    /// Returns `I3Error::SocketNotConfigured` if the configuration names no
    /// socket path.
    pub fn from_config(config: &Config) -> Result<Self, I3Error> {
        let connection = &config.connection;
        let socket_path = connection
            .socket_path
            .clone()
            .ok_or(I3Error::SocketNotConfigured)?;

        let transport = Transport::new(UnixConnector::new(socket_path))
            .with_max_payload(connection.max_payload_size);

        Ok(Self {
            transport,
            retry: RetryPolicy::from(connection),
        })
    }
}

impl<C: Connector> Connection<C> {
    /// Create a disconnected session that dials through `connector`.
    pub fn with_connector(connector: C) -> Self {
        Self {
            transport: Transport::new(connector),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Limit the payload size accepted from i3.
    pub fn with_max_payload(self, max_payload: usize) -> Self {
        Self {
            transport: self.transport.with_max_payload(max_payload),
            retry: self.retry,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn connector(&self) -> &C {
        self.transport.connector()
    }

    pub fn max_payload(&self) -> usize {
        self.transport.max_payload()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Open the command channel. Does nothing if it is already open.
    pub async fn connect(&mut self) -> Result<(), I3Error> {
        self.transport.connect().await
    }

    /// Close the command channel. Does nothing if it is already closed.
    pub async fn disconnect(&mut self) {
        self.transport.disconnect().await
    }

    /// Connect, retrying with exponential backoff.
    ///
    /// Only `I3Error::ConnectionFailed` is retried. Other errors - propagate
    /// without retry.
    ///
    /// # Backoff Strategy
    ///
    /// - First delay: `RetryPolicy::initial_delay` (100ms by default)
    /// - Each retry: delay *= 2
    /// - Maximum delay: `RetryPolicy::max_delay` (1 second by default)
    ///
    /// # Errors
    ///
    /// Returns `I3Error::MaxRetriesExceeded` if all attempts fail.
    /// The error contains the total number of attempts made.
    pub async fn connect_with_retry(&mut self) -> Result<(), I3Error> {
        let RetryPolicy {
            max_retries,
            initial_delay,
            max_delay,
        } = self.retry;

        let mut attempt = 0;
        let mut delay = initial_delay;
        let mut last_error: Option<I3Error> = None;

        loop {
            attempt += 1;

            match self.transport.connect().await {
                Ok(()) => {
                    debug!(attempt = attempt, "i3 IPC connection established");
                    return Ok(());
                }
                Err(e @ I3Error::ConnectionFailed { .. }) => {
                    last_error = Some(e);

                    if attempt > max_retries {
                        break;
                    }

                    warn!(
                        attempt = attempt,
                        max_retries = max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "i3 IPC connection failed, retrying..."
                    );

                    sleep(delay).await;
                    delay = (delay * 2).min(max_delay);
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            attempts = attempt,
            last_error = ?last_error,
            "Failed to connect to i3 after all retry attempts"
        );

        Err(I3Error::MaxRetriesExceeded { attempts: attempt })
    }

    /// Send one request and wait for its reply.
    ///
    /// # Cancellation
    ///
    /// Dropping the returned future before it completes (for example under
    /// `tokio::time::timeout`) closes the command channel, since its reply
    /// may still arrive. Later requests fail with `I3Error::NotConnected`
    /// until `connect` dials a new channel. A reply therefore never answers
    /// a request other than its own.
    ///
    /// # Errors
    ///
    /// Returns `I3Error::NotConnected` if the command channel is closed.
    /// Returns `I3Error::WrongType` if i3 answers with another message type.
    /// Returns `I3Error::ParseError` if the reply is not JSON.
    /// A failed read other than `WrongType` also closes the channel.
    pub async fn request(
        &mut self,
        message_type: MessageType,
        payload: &str,
    ) -> Result<Reply, I3Error> {
        debug!(?message_type, length = payload.len(), "sending i3 request");

        self.transport
            .send(message_type.code(), payload.as_bytes())
            .await?;
        let reply = self.transport.receive(Some(message_type.code())).await?;

        Reply::parse(&reply)
    }

    /// Run i3 commands. The reply holds one result object per command.
    pub async fn command(&mut self, commands: &str) -> Result<Reply, I3Error> {
        self.request(MessageType::RunCommand, commands).await
    }

    pub async fn workspaces(&mut self) -> Result<Reply, I3Error> {
        self.request(MessageType::GetWorkspaces, "").await
    }

    pub async fn outputs(&mut self) -> Result<Reply, I3Error> {
        self.request(MessageType::GetOutputs, "").await
    }

    pub async fn tree(&mut self) -> Result<Reply, I3Error> {
        self.request(MessageType::GetTree, "").await
    }

    pub async fn marks(&mut self) -> Result<Reply, I3Error> {
        self.request(MessageType::GetMarks, "").await
    }

    /// Without an id i3 lists the configured bar ids; with one it returns
    /// that bar's configuration.
    pub async fn bar_config(&mut self, id: Option<&str>) -> Result<Reply, I3Error> {
        self.request(MessageType::GetBarConfig, id.unwrap_or_default())
            .await
    }

    pub async fn version(&mut self) -> Result<Reply, I3Error> {
        self.request(MessageType::GetVersion, "").await
    }

    /// Subscribe to one event category and deliver its events to `handler`
    /// on a background task.
    ///
    /// The command channel becomes the event channel, so this session is
    /// disconnected afterwards.
    ///
    /// # Errors
    ///
    /// Returns `I3Error::WrongEvent` for an unknown category before any I/O,
    /// or when i3 refuses the subscription.
    pub async fn subscribe<H>(&mut self, event: &str, handler: H) -> Result<Subscription, I3Error>
    where
        H: EventHandler,
    {
        let events = self.event_stream(event).await?;
        Ok(Subscription::spawn(events, handler))
    }

    /// Subscribe and forward the events into a channel.
    ///
    /// The listener cancels itself at the first event after the receiver is
    /// dropped.
    pub async fn subscribe_channel(
        &mut self,
        event: &str,
    ) -> Result<(Subscription, mpsc::UnboundedReceiver<Reply>), I3Error> {
        let events = self.event_stream(event).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let handler = {
            let token = token.clone();
            move |reply: Reply| {
                if tx.send(reply).is_err() {
                    debug!("event receiver dropped, cancelling subscription");
                    token.cancel();
                }
            }
        };

        Ok((Subscription::spawn_with_token(events, handler, token), rx))
    }

    /// Subscribe and take the event channel for pulling events directly.
    pub async fn event_stream(&mut self, event: &str) -> Result<EventStream<C::Stream>, I3Error> {
        let kind: EventKind = event.parse()?;
        let payload = serde_json::to_string(&[kind.name()]).map_err(I3Error::SerializeFailed)?;

        let reply = self.request(MessageType::Subscribe, &payload).await?;
        if !reply.is_successful() {
            return Err(I3Error::WrongEvent {
                event: event.to_string(),
            });
        }

        let stream = self.transport.take_stream()?;
        info!(event = %kind, "subscribed to i3 events");

        Ok(EventStream::new(stream, kind, self.transport.max_payload()))
    }
}
