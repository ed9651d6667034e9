//! Subscriber connection
//!
//! One live subscriber is two concurrent duties bound to a hub mailbox:
//!
//! - **inbound**: reads client frames, a pong pushes the read deadline out
//!   by `pong_wait`; close, end of stream, a read error or deadline expiry
//!   ends the connection
//! - **outbound**: writes mailbox payloads as JSON text and pings every
//!   `ping_period` while idle, every write bounded by `write_timeout`
//!
//! Whichever duty stops first cancels the other. Once both have stopped the
//! subscriber is unregistered. The transport is anything that is a
//! `Sink<Frame>` plus a `Stream` of `Result<Frame, E>`, which keeps the
//! lifecycle testable without sockets.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::actors::hub::{HubHandle, Subscription};
use crate::actors::messages::Payload;
use crate::config::ConnectionConfig;

/// Transport-level frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    /// Client sent a close frame
    ClientClosed,

    /// Inbound stream ended without a close frame
    StreamEnded,

    ReadError(String),

    /// No pong within `pong_wait`
    PongTimeout,

    WriteFailed(String),

    WriteTimeout,

    /// Mailbox closed by the hub (evicted, unregistered or hub stopped)
    MailboxClosed,

    /// Server-side shutdown
    Shutdown,
}

impl fmt::Display for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disconnect::ClientClosed => write!(f, "client closed the connection"),
            Disconnect::StreamEnded => write!(f, "inbound stream ended"),
            Disconnect::ReadError(e) => write!(f, "read error: {e}"),
            Disconnect::PongTimeout => write!(f, "no pong within deadline"),
            Disconnect::WriteFailed(e) => write!(f, "write failed: {e}"),
            Disconnect::WriteTimeout => write!(f, "write timed out"),
            Disconnect::MailboxClosed => write!(f, "mailbox closed by hub"),
            Disconnect::Shutdown => write!(f, "server shutting down"),
        }
    }
}

/// Liveness settings of one connection
#[derive(Debug, Clone, Copy)]
struct Deadlines {
    write_timeout: Duration,
    pong_wait: Duration,
    ping_period: Duration,
}

impl From<&ConnectionConfig> for Deadlines {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            write_timeout: Duration::from_secs(config.write_timeout_secs),
            pong_wait: Duration::from_secs(config.pong_wait_secs),
            ping_period: Duration::from_secs(config.ping_period_secs),
        }
    }
}

pub struct Connection {
    hub: HubHandle,
    deadlines: Deadlines,
    cancel: CancellationToken,
}

impl Connection {
    pub fn new(hub: HubHandle, config: &ConnectionConfig) -> Self {
        Self {
            hub,
            deadlines: config.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop this connection when `parent` is cancelled
    pub fn with_shutdown(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    #[cfg(test)]
    fn with_deadlines(
        mut self,
        write_timeout: Duration,
        pong_wait: Duration,
        ping_period: Duration,
    ) -> Self {
        self.deadlines = Deadlines {
            write_timeout,
            pong_wait,
            ping_period,
        };
        self
    }

    /// Register with the hub and pump frames until either side gives up
    #[instrument(skip_all)]
    pub async fn serve<Si, St, E>(self, sink: Si, stream: St) -> Disconnect
    where
        Si: Sink<Frame> + Unpin,
        Si::Error: fmt::Display,
        St: Stream<Item = Result<Frame, E>> + Unpin,
        E: fmt::Display,
    {
        let Subscription { id, mailbox } = self.hub.subscribe().await;
        info!("subscriber {id} connected");

        let (inbound, outbound) = tokio::join!(
            read_pump(stream, self.deadlines, self.cancel.clone()),
            write_pump(sink, mailbox, self.deadlines, self.cancel.clone()),
        );

        // both duties are done, nothing can touch the mailbox anymore
        self.hub.unregister(id).await;

        let reason = inbound.or(outbound).unwrap_or(Disconnect::Shutdown);
        info!("subscriber {id} disconnected: {reason}");
        reason
    }
}

async fn read_pump<St, E>(
    mut stream: St,
    deadlines: Deadlines,
    cancel: CancellationToken,
) -> Option<Disconnect>
where
    St: Stream<Item = Result<Frame, E>> + Unpin,
    E: fmt::Display,
{
    let mut deadline = Instant::now() + deadlines.pong_wait;

    let reason = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break None,

            _ = time::sleep_until(deadline) => break Some(Disconnect::PongTimeout),

            frame = stream.next() => match frame {
                Some(Ok(Frame::Pong(_))) => {
                    trace!("pong received");
                    deadline = Instant::now() + deadlines.pong_wait;
                }
                Some(Ok(Frame::Close)) => break Some(Disconnect::ClientClosed),
                Some(Ok(_)) => trace!("ignoring inbound frame"),
                Some(Err(e)) => break Some(Disconnect::ReadError(e.to_string())),
                None => break Some(Disconnect::StreamEnded),
            },
        }
    };

    cancel.cancel();
    reason
}

async fn write_pump<Si>(
    mut sink: Si,
    mut mailbox: mpsc::Receiver<Arc<Payload>>,
    deadlines: Deadlines,
    cancel: CancellationToken,
) -> Option<Disconnect>
where
    Si: Sink<Frame> + Unpin,
    Si::Error: fmt::Display,
{
    let Deadlines {
        write_timeout,
        ping_period,
        ..
    } = deadlines;
    let mut ticker = time::interval_at(Instant::now() + ping_period, ping_period);

    let reason = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break None,

            payload = mailbox.recv() => {
                let Some(payload) = payload else {
                    debug!("mailbox closed, sending close frame");
                    let _ = time::timeout(write_timeout, sink.send(Frame::Close)).await;
                    break Some(Disconnect::MailboxClosed);
                };

                let text = match serde_json::to_string(payload.as_ref()) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("failed to serialize {} payload: {e}", payload.kind());
                        continue;
                    }
                };

                if let Err(reason) = write(&mut sink, Frame::Text(text), write_timeout).await {
                    break Some(reason);
                }
            }

            _ = ticker.tick() => {
                if mailbox.is_empty() {
                    let ping = Frame::Ping(Vec::new());
                    if let Err(reason) = write(&mut sink, ping, write_timeout).await {
                        break Some(reason);
                    }
                }
            }
        }
    };

    cancel.cancel();
    let _ = time::timeout(write_timeout, sink.close()).await;
    reason
}

async fn write<Si>(sink: &mut Si, frame: Frame, timeout: Duration) -> Result<(), Disconnect>
where
    Si: Sink<Frame> + Unpin,
    Si::Error: fmt::Display,
{
    match time::timeout(timeout, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Disconnect::WriteFailed(e.to_string())),
        Err(_) => Err(Disconnect::WriteTimeout),
    }
}
