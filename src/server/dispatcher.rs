//! Request dispatcher: a fixed pool of workers draining a queue of ready
//! connections.
//!
//! Each job reads exactly one frame from its connection, runs it through the
//! session manager and the executor, and hands the reply to a separately
//! spawned writer. [`WorkerPool::dispatch`] returns once every job of the batch
//! has been read and executed; writes may still be in flight.

use super::arena::ConnectionEntry;
use super::metrics::ServerMetrics;
use crate::connection::AuthManager;
use crate::core::{MarineError, Result};
use crate::executor::{self, ExecutionContext};
use crate::protocol::{Envelope, Reply, decode, encode, write_frame};
use crate::storage::{PersistenceGateway, SharedStore};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Everything a worker needs to serve a request.
pub struct ServerState {
    pub store: Arc<SharedStore>,
    pub gateway: Arc<dyn PersistenceGateway>,
    pub auth: AuthManager,
    pub metrics: Arc<ServerMetrics>,
    /// Signalled whenever a connection finishes writing its response.
    pub released: Notify,
}

impl ServerState {
    pub fn new(
        store: Arc<SharedStore>,
        gateway: Arc<dyn PersistenceGateway>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            store,
            auth: AuthManager::new(Arc::clone(&gateway)),
            gateway,
            metrics,
            released: Notify::new(),
        }
    }
}

struct Job {
    entry: Arc<ConnectionEntry>,
    // Dropped once the request is executed; the batch waits for all of them.
    done: mpsc::Sender<()>,
}

pub struct WorkerPool {
    jobs: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(size: usize, state: Arc<ServerState>) -> Self {
        let size = size.max(1);
        let (jobs, receiver) = mpsc::channel::<Job>(size * 4);
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size)
            .map(|index| {
                let receiver = Arc::clone(&receiver);
                let state = Arc::clone(&state);
                tokio::spawn(worker_loop(index, receiver, state))
            })
            .collect();

        Self { jobs, workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Processes each ready connection once and waits until all of them have
    /// been read and executed. Connections that already have a request in
    /// flight are skipped. Returns the number of jobs submitted.
    pub async fn dispatch(&self, ready: Vec<Arc<ConnectionEntry>>) -> Result<usize> {
        let (done, mut all_done) = mpsc::channel::<()>(1);
        let mut submitted = 0;

        for entry in ready {
            if !entry.try_acquire() {
                continue;
            }
            let job = Job {
                entry,
                done: done.clone(),
            };
            self.jobs
                .send(job)
                .await
                .map_err(|_| MarineError::Execution("worker pool is stopped".into()))?;
            submitted += 1;
        }

        drop(done);
        // Nothing is ever sent; this resolves when the last job drops its sender.
        let _ = all_done.recv().await;
        Ok(submitted)
    }

    /// Stops accepting jobs and waits for the workers to finish.
    pub async fn shutdown(self) {
        drop(self.jobs);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "worker task failed");
            }
        }
    }
}

async fn worker_loop(index: usize, jobs: Arc<Mutex<mpsc::Receiver<Job>>>, state: Arc<ServerState>) {
    debug!(worker = index, "worker started");
    loop {
        let job = jobs.lock().await.recv().await;
        let Some(Job { entry, done }) = job else {
            break;
        };

        match serve_request(&state, &entry).await {
            Some(reply) => {
                drop(done);
                spawn_write(Arc::clone(&state), entry, reply);
            }
            None => {
                entry.release();
                drop(done);
                state.released.notify_one();
            }
        }
    }
    debug!(worker = index, "worker stopped");
}

/// Takes one buffered request and answers it. `None` means no response is sent.
async fn serve_request(state: &ServerState, entry: &ConnectionEntry) -> Option<Reply> {
    let conn_id = entry.id();
    let (frame, buffered) = {
        let mut side = entry.reader().lock().await;
        (side.next_frame(), side.buffered())
    };

    let payload = match frame {
        Ok(Some(payload)) => payload,
        Ok(None) => {
            debug!(conn_id, buffered, "no whole frame buffered");
            return None;
        }
        Err(e) => {
            // The stream can no longer be split into frames.
            state.metrics.on_protocol_failure();
            warn!(conn_id, error = %e, "unreadable frame, closing connection");
            entry.mark_closed();
            return None;
        }
    };

    let envelope: Envelope = match decode(&payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            state.metrics.on_protocol_failure();
            warn!(conn_id, bytes = payload.len(), error = %e, "undecodable request dropped");
            return None;
        }
    };

    Some(respond(state, entry, envelope).await)
}

async fn respond(state: &ServerState, entry: &ConnectionEntry, envelope: Envelope) -> Reply {
    let conn_id = entry.id();
    let Envelope {
        command,
        login,
        password,
    } = envelope;

    let mut auth = entry.auth().lock().await;
    let Some(command) = command else {
        return match state.auth.handshake(&mut auth, &login, password.as_deref()).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(conn_id, login = %login, error = %e, "handshake failed");
                Reply::Fault(e.to_string())
            }
        };
    };

    if let Err(e) = state.auth.authorize(&mut auth, &login, password.as_deref()).await {
        state.metrics.on_auth_failure();
        warn!(conn_id, login = %login, command = command.name(), error = %e, "command refused");
        return Reply::Fault(e.to_string());
    }
    drop(auth);

    let name = command.name();
    debug!(
        conn_id,
        login = %login,
        command = name,
        mutation = command.is_mutation(),
        "executing"
    );
    let ctx = ExecutionContext::new(&login, &state.store, state.gateway.as_ref());
    match executor::execute(&ctx, command).await {
        Ok(reply) => {
            state.metrics.on_request();
            reply
        }
        Err(e) => {
            state.metrics.on_execution_fault();
            error!(conn_id, login = %login, command = name, error = %e, "command failed");
            Reply::Fault(e.to_string())
        }
    }
}

fn spawn_write(state: Arc<ServerState>, entry: Arc<ConnectionEntry>, reply: Reply) {
    tokio::spawn(async move {
        if let Err(e) = write_reply(&entry, &reply).await {
            warn!(conn_id = entry.id(), reply = reply.kind(), error = %e, "failed to write response");
            entry.mark_closed();
        }
        entry.release();
        state.released.notify_one();
    });
}

async fn write_reply(entry: &ConnectionEntry, reply: &Reply) -> Result<()> {
    let frame = match encode(reply) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(conn_id = entry.id(), error = %e, "reply cannot be encoded, sending a fault");
            encode(&Reply::Fault(e.to_string()))?
        }
    };
    let mut writer = entry.writer().lock().await;
    write_frame(&mut *writer, &frame).await
}
