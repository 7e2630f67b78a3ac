//! Framed byte-stream channel to i3
//!
//! `Transport` owns at most one open stream. It writes request frames and
//! reads reply or event frames, one whole frame per call.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, info, trace, warn};

use crate::error::I3Error;
use crate::protocol::{self, Frame, Header, HEADER_SIZE};

/// Default upper bound on a single payload: 64 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = i3ipc_config::DEFAULT_MAX_PAYLOAD_SIZE;

/// Dials the byte-stream channel a `Transport` talks over
///
/// The connection target is injected here; nothing in this crate goes
/// looking for the i3 socket on its own.
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a new channel.
    fn connect(&self) -> impl Future<Output = Result<Self::Stream, I3Error>> + Send;

    /// Human-readable description of the target, for logs and errors
    fn target(&self) -> String;
}

/// Connects to i3 over a Unix domain socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixConnector {
    socket_path: PathBuf,
}

impl UnixConnector {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Connector for UnixConnector {
    type Stream = UnixStream;

    fn connect(&self) -> impl Future<Output = Result<UnixStream, I3Error>> + Send {
        let socket_path = self.socket_path.clone();
        async move {
            UnixStream::connect(&socket_path)
                .await
                .map_err(|e| I3Error::ConnectionFailed {
                    target: socket_path.display().to_string(),
                    source: e,
                })
        }
    }

    fn target(&self) -> String {
        self.socket_path.display().to_string()
    }
}

/// A single framed channel to i3
///
/// Starts out disconnected. `connect` and `disconnect` are idempotent, and
/// every send or receive on a closed transport fails with
/// `I3Error::NotConnected`.
///
/// # Example
///
/// ```ignore
/// let mut transport = Transport::new(UnixConnector::new("/run/user/1000/i3/ipc-socket"));
/// transport.connect().await?;
/// transport.send(7, b"").await?;
/// let payload = transport.receive(Some(7)).await?;
/// transport.disconnect().await;
/// ```
pub struct Transport<C: Connector> {
    connector: C,
    stream: Option<C::Stream>,
    max_payload: usize,
}

impl<C: Connector + fmt::Debug> fmt::Debug for Transport<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("connector", &self.connector)
            .field("connected", &self.stream.is_some())
            .field("max_payload", &self.max_payload)
            .finish()
    }
}

impl<C: Connector> Transport<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            stream: None,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Limit the payload size accepted from i3.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Open the channel. Does nothing if it is already open.
    pub async fn connect(&mut self) -> Result<(), I3Error> {
        if self.stream.is_some() {
            trace!(socket = %self.connector.target(), "already connected to i3");
            return Ok(());
        }

        let stream = self.connector.connect().await?;
        info!(socket = %self.connector.target(), "connected to i3");
        self.stream = Some(stream);
        Ok(())
    }

    /// Close the channel. Does nothing if it is already closed.
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(error = %e, "error shutting down i3 channel");
            }
            info!(socket = %self.connector.target(), "disconnected from i3");
        }
    }

    /// Hand the open stream over to the caller, leaving this transport closed.
    pub(crate) fn take_stream(&mut self) -> Result<C::Stream, I3Error> {
        self.stream.take().ok_or(I3Error::NotConnected)
    }

    /// Send one message. An empty payload is sent with length 0.
    ///
    /// The stream is held outside the transport while the frame is written.
    /// If the write fails or the future is dropped, the transport is left
    /// disconnected.
    pub async fn send(&mut self, message_type: u32, payload: &[u8]) -> Result<(), I3Error> {
        if self.stream.is_none() {
            return Err(I3Error::NotConnected);
        }
        let frame = protocol::pack(message_type, payload)?;
        let mut stream = self.take_stream()?;

        stream.write_all(&frame).await.map_err(I3Error::SendFailed)?;
        stream.flush().await.map_err(I3Error::SendFailed)?;
        self.stream = Some(stream);

        trace!(message_type, length = payload.len(), "sent frame");
        Ok(())
    }

    /// Receive one reply frame and return its payload verbatim.
    ///
    /// # Errors
    ///
    /// Returns `I3Error::NotConnected` if the transport is closed.
    /// Returns `I3Error::WrongMagicString` if the header marker is not `i3-ipc`.
    /// Returns `I3Error::WrongType` if `expected` is given and differs from the frame type.
    /// Returns `I3Error::ConnectionClosed` if the channel hits EOF before a frame.
    /// Returns `I3Error::ReceiveFailed` if the channel hits EOF mid-frame.
    ///
    /// Only `WrongType` keeps the channel open, since that frame was read
    /// whole. Any other failure, or dropping the future before it completes,
    /// leaves the transport disconnected.
    pub async fn receive(&mut self, expected: Option<u32>) -> Result<Bytes, I3Error> {
        self.read(expected, false).await.map(|frame| frame.payload)
    }

    /// Receive one event frame.
    ///
    /// Same as `receive`, except the event bit is cleared from the type
    /// before it is compared with `expected` and reported in the frame.
    pub async fn receive_event(&mut self, expected: Option<u32>) -> Result<Frame, I3Error> {
        self.read(expected, true).await
    }

    async fn read(&mut self, expected: Option<u32>, event: bool) -> Result<Frame, I3Error> {
        let mut stream = self.take_stream()?;
        let result = read_frame(&mut stream, expected, event, self.max_payload).await;

        match &result {
            Ok(_) | Err(I3Error::WrongType { .. }) => self.stream = Some(stream),
            Err(e) => {
                warn!(
                    socket = %self.connector.target(),
                    error = %e,
                    "dropping i3 channel after a failed read"
                );
            }
        }
        result
    }
}

/// Read exactly one frame from `reader`.
///
/// The payload is always consumed before the type check, so a `WrongType`
/// failure leaves the stream at the next frame boundary. EOF before the
/// first header byte is `ConnectionClosed`; EOF anywhere later is a
/// truncated frame and fails with `ReceiveFailed`.
pub(crate) async fn read_frame<R>(
    reader: &mut R,
    expected: Option<u32>,
    event: bool,
    max_payload: usize,
) -> Result<Frame, I3Error>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; HEADER_SIZE];
    let first = reader.read(&mut raw).await.map_err(I3Error::ReceiveFailed)?;
    if first == 0 {
        return Err(I3Error::ConnectionClosed);
    }
    reader
        .read_exact(&mut raw[first..])
        .await
        .map_err(I3Error::ReceiveFailed)?;

    let header = Header::unpack(&raw);
    header.validate()?;

    let length = header.length as usize;
    if length > max_payload {
        return Err(I3Error::PayloadTooLarge {
            size: length,
            max: max_payload,
        });
    }

    let mut payload = BytesMut::zeroed(length);
    reader
        .read_exact(&mut payload)
        .await
        .map_err(I3Error::ReceiveFailed)?;

    let message_type = if event {
        header.event_code()
    } else {
        header.message_type
    };

    trace!(
        message_type,
        is_event = header.is_event(),
        length,
        "received frame"
    );

    if let Some(expected) = expected {
        if expected != message_type {
            return Err(I3Error::WrongType {
                expected,
                actual: message_type,
            });
        }
    }

    Ok(Frame {
        message_type,
        is_event: header.is_event(),
        payload: payload.freeze(),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory channels standing in for the i3 socket.

    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    use super::{read_frame, Connector, DEFAULT_MAX_PAYLOAD};
    use crate::error::I3Error;
    use crate::protocol::{self, Frame};

    /// Hands out pre-made duplex streams and counts how often it was dialed
    #[derive(Debug, Clone)]
    pub(crate) struct MemoryConnector {
        streams: Arc<Mutex<VecDeque<DuplexStream>>>,
        dials: Arc<AtomicUsize>,
    }

    impl MemoryConnector {
        /// Create a connector for `count` channels and return their server ends.
        pub(crate) fn with_channels(count: usize) -> (Self, Vec<DuplexStream>) {
            let mut clients = VecDeque::with_capacity(count);
            let mut servers = Vec::with_capacity(count);
            for _ in 0..count {
                let (client, server) = duplex(64 * 1024);
                clients.push_back(client);
                servers.push(server);
            }

            let connector = Self {
                streams: Arc::new(Mutex::new(clients)),
                dials: Arc::new(AtomicUsize::new(0)),
            };
            (connector, servers)
        }

        pub(crate) fn dials(&self) -> usize {
            self.dials.load(Ordering::SeqCst)
        }
    }

    impl Connector for MemoryConnector {
        type Stream = DuplexStream;

        fn connect(&self) -> impl Future<Output = Result<DuplexStream, I3Error>> + Send {
            self.dials.fetch_add(1, Ordering::SeqCst);
            let next = self.streams.lock().unwrap().pop_front();
            async move {
                next.ok_or_else(|| I3Error::ConnectionFailed {
                    target: "memory".to_string(),
                    source: std::io::ErrorKind::ConnectionRefused.into(),
                })
            }
        }

        fn target(&self) -> String {
            "memory".to_string()
        }
    }

    /// Write a frame from the server side.
    pub(crate) async fn server_send(server: &mut DuplexStream, message_type: u32, payload: &str) {
        let frame = protocol::pack(message_type, payload.as_bytes()).unwrap();
        server.write_all(&frame).await.unwrap();
    }

    /// Read a frame the client sent.
    pub(crate) async fn server_receive(server: &mut DuplexStream) -> Frame {
        read_frame(server, None, false, DEFAULT_MAX_PAYLOAD).await.unwrap()
    }
}
