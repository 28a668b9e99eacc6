//! Readiness loop over the listener and every live connection.
//!
//! One tick:
//! 1. wait (bounded by the tick wait) until a connection arrives, an idle
//!    connection has buffered a whole request frame, a response write
//!    completes, or the wait expires;
//! 2. accept every pending connection;
//! 3. collect the ready set and hand it to the worker pool, which returns once
//!    each ready connection's buffered request has been executed;
//! 4. prune connections found closed since the last tick.

use super::arena::{ConnectionArena, ConnectionEntry, Readiness};
use super::dispatcher::{ServerState, WorkerPool};
use crate::core::Result;
use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub struct Multiplexer {
    listener: TcpListener,
    arena: ConnectionArena,
    pool: WorkerPool,
    state: Arc<ServerState>,
    tick_wait: Duration,
}

enum Tick {
    Continue,
    Stop,
}

impl Multiplexer {
    pub fn new(
        listener: TcpListener,
        pool: WorkerPool,
        state: Arc<ServerState>,
        tick_wait: Duration,
    ) -> Self {
        Self {
            listener,
            arena: ConnectionArena::new(),
            pool,
            state,
            tick_wait,
        }
    }

    /// Runs ticks until `stop` fires (or its sender is dropped).
    pub async fn run(mut self, mut stop: oneshot::Receiver<()>) -> Result<()> {
        info!(workers = self.pool.size(), "multiplexer running");
        loop {
            match self.tick(&mut stop).await? {
                Tick::Continue => {}
                Tick::Stop => break,
            }
        }

        info!(connections = self.arena.len(), "multiplexer stopping");
        self.arena.clear();
        self.pool.shutdown().await;
        Ok(())
    }

    async fn tick(&mut self, stop: &mut oneshot::Receiver<()>) -> Result<Tick> {
        let mut ready = Vec::new();
        {
            let mut waiting: FuturesUnordered<_> = self
                .arena
                .idle()
                .into_iter()
                .map(ConnectionEntry::await_frame)
                .collect();

            tokio::select! {
                _ = &mut *stop => return Ok(Tick::Stop),
                accepted = self.listener.accept() => self.on_accept(accepted),
                Some(arrived) = waiting.next(), if !waiting.is_empty() => classify(arrived, &mut ready),
                _ = self.state.released.notified() => {}
                _ = sleep(self.tick_wait) => {}
            }

            while let Some(Some(arrived)) = waiting.next().now_or_never() {
                classify(arrived, &mut ready);
            }
        }

        while let Some(accepted) = self.listener.accept().now_or_never() {
            self.on_accept(accepted);
        }

        if !ready.is_empty() {
            let submitted = self.pool.dispatch(ready).await?;
            debug!(submitted, "tick dispatched");
        }

        self.prune();
        Ok(Tick::Continue)
    }

    fn on_accept(&mut self, accepted: io::Result<(TcpStream, SocketAddr)>) {
        match accepted {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%peer, error = %e, "set_nodelay failed");
                }
                let entry = self.arena.register(stream, peer);
                let total = self.state.metrics.on_connection();
                info!(conn_id = entry.id(), %peer, total, "connection accepted");
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }

    fn prune(&mut self) {
        let pruned = self.arena.prune();
        if pruned.is_empty() {
            return;
        }
        for entry in &pruned {
            self.state.metrics.on_prune();
            info!(conn_id = entry.id(), peer = %entry.peer(), "connection closed");
        }
        let metrics = self.state.metrics.snapshot();
        debug!(
            live = metrics.live_connections(),
            tracked = self.arena.len(),
            accepted = metrics.connections_accepted,
            requests = metrics.requests_handled,
            protocol_failures = metrics.protocol_failures,
            execution_faults = metrics.execution_faults,
            "connections pruned"
        );
    }
}

fn classify(arrived: (Arc<ConnectionEntry>, Readiness), ready: &mut Vec<Arc<ConnectionEntry>>) {
    match arrived {
        (entry, Readiness::Readable) => ready.push(entry),
        (entry, Readiness::Closed) => entry.mark_closed(),
    }
}
