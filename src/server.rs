//! Connection supervisor: accept loop, per-connection workers, graceful
//! shutdown.
//!
//! One worker task per live connection, spawned on a `TaskTracker`.
//! Cancellation flows through a single token: the accept loop stops, each
//! worker closes its connection at the next suspension point, the tracker
//! drains, and only then does the draw coordinator shut down.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::monitor::{DrawMonitor, MonitorHandle};
use crate::store::BetStore;
use crate::wire::{DecodeError, LineCodec, Reply, Request};

/// Per-connection identifier for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(uuid::Uuid);

impl ConnId {
    fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct Server {
    listener: TcpListener,
    monitor: DrawMonitor,
    cancel: CancellationToken,
}

impl Server {
    /// Bind the listening socket with the configured backlog and spawn
    /// the draw coordinator.
    pub async fn bind(config: &Config, store: Arc<dyn BetStore>) -> anyhow::Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .context("invalid listen address")?;

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(config.listen_backlog)?;

        let monitor = DrawMonitor::spawn(store, config.agencies);

        Ok(Self {
            listener,
            monitor,
            cancel: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Token that stops the server when cancelled. Cancelling twice is
    /// harmless, so signal handlers need no coordination.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Accept connections until cancelled, then drain every worker and
    /// shut the coordinator down.
    pub async fn run(self) -> anyhow::Result<()> {
        let Server {
            listener,
            monitor,
            cancel,
        } = self;
        let tracker = TaskTracker::new();
        let handle = monitor.handle();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let session = Session::new(stream, handle.clone(), cancel.child_token());
                        debug!(conn = %session.id, %peer, "connection accepted");
                        tracker.spawn(session.run());
                    }
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                },
            }
        }

        info!("shutting down: draining connections");
        drop(listener);
        tracker.close();
        tracker.wait().await;
        monitor.shutdown().await;
        info!("shutdown complete");
        Ok(())
    }
}

enum Flow {
    Continue,
    Close,
}

/// One connection's worker: read a frame, dispatch, reply, repeat.
struct Session {
    id: ConnId,
    framed: Framed<TcpStream, LineCodec>,
    monitor: MonitorHandle,
    cancel: CancellationToken,
}

impl Session {
    fn new(stream: TcpStream, monitor: MonitorHandle, cancel: CancellationToken) -> Self {
        Self {
            id: ConnId::new(),
            framed: Framed::new(stream, LineCodec::new()),
            monitor,
            cancel,
        }
    }

    async fn run(mut self) {
        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(conn = %self.id, "closing connection for shutdown");
                    break;
                }
                frame = self.framed.next() => frame,
            };

            match frame {
                None => {
                    debug!(conn = %self.id, "peer closed the session");
                    break;
                }
                Some(Err(e)) => {
                    warn!(conn = %self.id, error = %e, "framing error, closing");
                    break;
                }
                Some(Ok(line)) => match self.dispatch(&line).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Close) => break,
                    Err(e) => {
                        warn!(conn = %self.id, error = %e, "failed to write reply, closing");
                        break;
                    }
                },
            }
        }
    }

    /// Handle one decoded message. Per-message failures reply and keep
    /// the session alive; only transport errors (returned as `Err`) and
    /// session end close it.
    async fn dispatch(&mut self, line: &str) -> io::Result<Flow> {
        let request = match Request::decode(line) {
            Ok(request) => request,
            Err(e) => return self.reject(e).await,
        };

        match request {
            Request::SubmitBets(batch) => {
                let count = batch.len();
                if self.monitor.submit_bets(batch).is_err() {
                    debug!(conn = %self.id, "coordinator closed, ending session");
                    return Ok(Flow::Close);
                }
                info!(conn = %self.id, count, "bet batch accepted");
                self.reply(Reply::BetOk).await?;
                Ok(Flow::Continue)
            }
            Request::ConfirmDraw(agency) => {
                if self.monitor.register_ready(agency).is_err() {
                    debug!(conn = %self.id, "coordinator closed, ending session");
                    return Ok(Flow::Close);
                }
                info!(conn = %self.id, agency, "draw confirmation accepted");
                self.reply(Reply::DrawOk).await?;
                Ok(Flow::Continue)
            }
            Request::RequestResults(agency) => {
                match self.monitor.request_winners(agency) {
                    Ok(winners) => {
                        info!(
                            conn = %self.id,
                            agency,
                            winners = winners.len(),
                            "winners delivered"
                        );
                        let documents = winners.into_iter().map(|bet| bet.document).collect();
                        self.reply(Reply::ResultsOk(documents)).await?;
                    }
                    Err(e) => {
                        warn!(conn = %self.id, agency, error = %e, "winners request rejected");
                        self.reply(Reply::ResultsFail).await?;
                    }
                }
                Ok(Flow::Continue)
            }
            Request::EndSession => {
                self.reply(Reply::SessionEnd).await?;
                debug!(conn = %self.id, "session ended by client");
                Ok(Flow::Close)
            }
        }
    }

    async fn reject(&mut self, error: DecodeError) -> io::Result<Flow> {
        match error {
            // Header-level problems get no reply; the session continues.
            DecodeError::UnknownHeader(_) | DecodeError::MissingPayload(_) => {
                warn!(conn = %self.id, error = %error, "unintelligible message");
            }
            DecodeError::BadBatch { entries } => {
                warn!(conn = %self.id, entries, "rejected malformed bet batch");
                self.reply(Reply::BetFail).await?;
            }
            DecodeError::BadAgencyId { request } => {
                warn!(
                    conn = %self.id,
                    header = request.header(),
                    "rejected malformed agency id"
                );
                self.reply(request.fail_reply()).await?;
            }
        }
        Ok(Flow::Continue)
    }

    async fn reply(&mut self, reply: Reply) -> io::Result<()> {
        self.framed.send(reply.encode()).await
    }
}
