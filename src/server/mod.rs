//! TCP server: connection arena, readiness multiplexer and worker pool.

pub mod arena;
pub mod dispatcher;
pub mod metrics;
pub mod multiplexer;

pub use arena::{ConnectionArena, ConnectionEntry, ConnectionId};
pub use metrics::{MetricsSnapshot, ServerMetrics};

use crate::connection::ServerConfig;
use crate::core::{MarineError, Result};
use crate::storage::{PersistenceGateway, SharedStore};
use dispatcher::{ServerState, WorkerPool};
use multiplexer::Multiplexer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

/// A bound listener that is not serving yet.
///
/// Binding happens before the store is loaded so the port is claimed (and
/// clients queue in the backlog) while the gateway is still coming up.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| MarineError::Connection(format!("cannot listen on {}: {}", addr, e)))?;
        info!(addr = %listener.local_addr()?, "server listening");
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Starts the multiplexer and the worker pool on the current runtime.
    pub fn start(
        self,
        store: Arc<SharedStore>,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Result<ServerHandle> {
        let local_addr = self.listener.local_addr()?;
        let metrics = Arc::new(ServerMetrics::default());
        let state = Arc::new(ServerState::new(store, gateway, Arc::clone(&metrics)));

        let pool = WorkerPool::start(self.config.workers, Arc::clone(&state));
        let multiplexer = Multiplexer::new(self.listener, pool, state, self.config.tick_wait);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let join_handle = tokio::spawn(multiplexer.run(stop_rx));

        Ok(ServerHandle {
            local_addr,
            metrics,
            stop_tx: Some(stop_tx),
            join_handle,
        })
    }
}

/// Running server. Dropping the handle stops the server at its next tick.
pub struct ServerHandle {
    local_addr: SocketAddr,
    metrics: Arc<ServerMetrics>,
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: JoinHandle<Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stops accepting, lets the workers drain and waits for the loop to end.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        self.join_handle
            .await
            .map_err(|e| MarineError::Execution(format!("server task failed: {}", e)))?
    }
}
