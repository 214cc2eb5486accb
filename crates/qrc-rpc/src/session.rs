//! Transport session: one short-lived connection to the Core.
//!
//! A session walks `Disconnected -> Connecting -> Authenticating -> Ready ->
//! Busy -> ... -> Closing -> Closed`, or drops into `Failed` on any fatal
//! error. It carries at most one outstanding request and releases its socket
//! exactly once, whichever way the operation ends.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::future::Future;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::codec::{Decoder, Framed};
use tracing::{debug, info, trace, warn};

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::protocol::{Message, Request, RequestId, Response, select_response};
use crate::transport::FrameCodec;

/// Id of the `StatusGet` authentication probe
pub const AUTH_PROBE_ID: u64 = 1;

/// Opens the byte stream a session runs over.
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Plain TCP to the Core
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    /// A request is outstanding
    Busy,
    Closing,
    Closed,
    Failed,
}

/// How a request is considered complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Done once the request is written
    FireAndForget,
    /// Done on the first response echoing the request id
    #[default]
    AwaitId,
    /// Done when the settle window (measured from connect) elapses; the
    /// connection is then closed and everything received is returned
    AwaitQuiescence,
}

#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: Option<RequestId>,
    pub issued_at: Instant,
    pub mode: CompletionMode,
}

/// What a completed request produced, per completion mode.
#[derive(Debug)]
pub enum Reply {
    Sent,
    Response(Response),
    Settled(Vec<Message>),
}

impl Reply {
    /// The `result` payload for `id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` if the response carried an error, and
    /// `Error::UnexpectedResponse` if no response was collected.
    pub fn into_result(self, id: &RequestId) -> Result<Value> {
        let response = match self {
            Reply::Sent => return Ok(Value::Null),
            Reply::Response(response) => response,
            Reply::Settled(messages) => {
                select_response(messages, id).ok_or(Error::UnexpectedResponse)?
            }
        };
        Ok(response.into_result()?)
    }
}

pub struct Session<'a, C: Connector> {
    config: &'a ConnectionConfig,
    connector: &'a C,
    state: SessionState,
    framed: Option<Framed<C::Stream, FrameCodec>>,
    pending: Option<PendingRequest>,
    authenticated: bool,
    connected_at: Option<Instant>,
}

impl<'a, C: Connector> Session<'a, C> {
    #[must_use]
    pub fn new(config: &'a ConnectionConfig, connector: &'a C) -> Self {
        Self {
            config,
            connector,
            state: SessionState::Disconnected,
            framed: None,
            pending: None,
            authenticated: false,
            connected_at: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    #[must_use]
    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    fn transition(&mut self, next: SessionState) {
        debug!(
            host = %self.config.host,
            from = ?self.state,
            to = ?next,
            "Session state change"
        );
        self.state = next;
    }

    /// Release the socket and mark the session failed.
    fn fail(&mut self, err: Error) -> Error {
        warn!(host = %self.config.host, error = %err, "Session failed");
        self.pending = None;
        self.release();
        self.transition(SessionState::Failed);
        err
    }

    /// Drop the socket if still held. Only the first call does anything.
    fn release(&mut self) -> Option<Framed<C::Stream, FrameCodec>> {
        let framed = self.framed.take();
        if framed.is_some() {
            trace!(host = %self.config.host, "Releasing socket");
        }
        framed
    }

    /// Close the connection after normal completion.
    pub fn close(&mut self) {
        if matches!(self.state, SessionState::Closed | SessionState::Failed) {
            return;
        }
        self.transition(SessionState::Closing);
        drop(self.release());
        self.pending = None;
        self.transition(SessionState::Closed);
    }

    /// Open the connection and authenticate if credentials are configured.
    ///
    /// # Errors
    ///
    /// Returns `ConnectTimeout`, `Connection` or `Authentication`; the
    /// session is `Failed` afterwards.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != SessionState::Disconnected {
            return Err(Error::InvalidState(self.state));
        }

        self.transition(SessionState::Connecting);
        let connector = self.connector;
        let host = self.config.host.clone();
        let connect_timeout = self.config.connect_timeout;

        let attempt = timeout(connect_timeout, connector.connect(&host, self.config.port)).await;
        let stream = match attempt {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(self.fail(Error::Connection { host, source })),
            Err(_) => {
                return Err(self.fail(Error::ConnectTimeout {
                    host,
                    timeout: connect_timeout,
                }));
            }
        };

        debug!(address = %self.config.address(), "Connected");
        self.framed = Some(Framed::new(stream, FrameCodec::new()));
        self.connected_at = Some(Instant::now());

        self.authenticate().await
    }

    async fn authenticate(&mut self) -> Result<()> {
        let Some(credentials) = self.config.credentials.clone() else {
            debug!("No credentials given, continuing unauthenticated");
            self.transition(SessionState::Ready);
            return Ok(());
        };

        self.transition(SessionState::Authenticating);
        debug!(user = %credentials.username, "Trying credentials");

        let probe_id = RequestId::Number(AUTH_PROBE_ID);
        let probe = async {
            self.write(Request::logon(&credentials.username, &credentials.password))
                .await?;
            self.write(Request::status_get(probe_id.clone())).await?;
            self.await_response(&probe_id).await
        };

        let response = match probe.await {
            Ok(response) => response,
            Err(err) => return Err(self.fail(err)),
        };

        if let Some(error) = response.error {
            let reason = if error.is_logon_required() {
                "Logon required".to_string()
            } else {
                error.to_string()
            };
            return Err(self.fail(Error::Authentication {
                user: credentials.username,
                reason,
            }));
        }

        self.authenticated = true;
        debug!(user = %credentials.username, "Authenticated");
        self.transition(SessionState::Ready);
        Ok(())
    }

    async fn write(&mut self, request: Request) -> Result<()> {
        let framed = self.framed.as_mut().ok_or(Error::Disconnected)?;
        trace!(method = %request.method, "Writing request");
        framed.send(request).await?;
        Ok(())
    }

    fn log_frame(&self, value: &Value) {
        if self.config.verbose {
            info!(frame = %value, "Received data from Core");
        } else {
            trace!(frame = %value, "Received frame");
        }
    }

    /// Read until a response echoing `id` arrives; other frames are discarded.
    async fn await_response(&mut self, id: &RequestId) -> Result<Response> {
        loop {
            let next = self
                .framed
                .as_mut()
                .ok_or(Error::Disconnected)?
                .next()
                .await;

            let value = match next {
                Some(Ok(value)) => value,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(Error::Disconnected),
            };
            self.log_frame(&value);

            match Message::from(value) {
                Message::Response(response) if response.matches(id) => return Ok(response),
                other => trace!(?other, "Discarding unmatched frame"),
            }
        }
    }

    /// Collect frames until the settle window after connecting has elapsed,
    /// then close and parse whatever is still buffered.
    async fn await_quiescence(&mut self) -> Result<Vec<Message>> {
        let connected_at = self.connected_at.unwrap_or_else(Instant::now);
        let deadline = connected_at + self.config.settle_window;
        let mut messages = Vec::new();

        loop {
            let framed = self.framed.as_mut().ok_or(Error::Disconnected)?;
            let next = tokio::select! {
                () = sleep_until(deadline) => None,
                next = framed.next() => Some(next),
            };

            match next {
                None => break,
                Some(Some(Ok(value))) => {
                    self.log_frame(&value);
                    messages.push(Message::from(value));
                }
                Some(Some(Err(e))) => return Err(e.into()),
                Some(None) => {
                    debug!("Core closed the connection before the settle window elapsed");
                    break;
                }
            }
        }

        self.transition(SessionState::Closing);
        if let Some(framed) = self.release() {
            let parts = framed.into_parts();
            let mut codec = parts.codec;
            let mut rest = parts.read_buf;
            while let Some(value) = codec.decode_eof(&mut rest)? {
                self.log_frame(&value);
                messages.push(Message::from(value));
            }
        }
        self.transition(SessionState::Closed);

        Ok(messages)
    }

    /// Submit one request on a `Ready` session.
    ///
    /// # Errors
    ///
    /// Returns `SessionBusy` if a previous request never resolved and
    /// `InvalidState` if the session is not ready; neither tears the session
    /// down. Transport failures fail the session.
    pub async fn send(&mut self, request: Request, mode: CompletionMode) -> Result<Reply> {
        match self.state {
            SessionState::Ready => {}
            SessionState::Busy => return Err(Error::SessionBusy),
            other => return Err(Error::InvalidState(other)),
        }

        let id = request.id.clone();
        self.pending = Some(PendingRequest {
            id: id.clone(),
            issued_at: Instant::now(),
            mode,
        });
        self.transition(SessionState::Busy);

        let outcome = match (mode, id) {
            (CompletionMode::FireAndForget, _) => self.write(request).await.map(|()| Reply::Sent),
            (CompletionMode::AwaitId, Some(id)) => match self.write(request).await {
                Ok(()) => self.await_response(&id).await.map(Reply::Response),
                Err(e) => Err(e),
            },
            (CompletionMode::AwaitId, None) => Err(Error::UnexpectedResponse),
            (CompletionMode::AwaitQuiescence, _) => match self.write(request).await {
                Ok(()) => self.await_quiescence().await.map(Reply::Settled),
                Err(e) => Err(e),
            },
        };

        match outcome {
            Ok(reply) => {
                if let Some(pending) = self.pending.take() {
                    trace!(
                        elapsed_ms = pending.issued_at.elapsed().as_millis(),
                        "Request resolved"
                    );
                }
                if self.state == SessionState::Busy {
                    self.transition(SessionState::Ready);
                }
                Ok(reply)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Connect, send one request and close, all under the operation deadline.
    ///
    /// # Errors
    ///
    /// Returns `OperationTimeout` if the whole exchange outlives
    /// `operation_timeout`, otherwise whatever connecting or sending failed with.
    pub async fn execute(&mut self, request: Request, mode: CompletionMode) -> Result<Reply> {
        let deadline = self.config.operation_timeout;
        let work = async {
            if self.state == SessionState::Disconnected {
                self.connect().await?;
            }
            let reply = self.send(request, mode).await?;
            self.close();
            Ok::<_, Error>(reply)
        };

        let outcome = timeout(deadline, work).await;
        match outcome {
            Ok(result) => result,
            Err(_) => Err(self.fail(Error::OperationTimeout(deadline))),
        }
    }
}

/// Run one request on a fresh session.
///
/// # Errors
///
/// See [`Session::execute`].
pub async fn exchange<C: Connector>(
    config: &ConnectionConfig,
    connector: &C,
    request: Request,
    mode: CompletionMode,
) -> Result<Reply> {
    Session::new(config, connector).execute(request, mode).await
}
