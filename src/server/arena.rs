use crate::connection::AuthState;
use crate::core::Result;
use crate::protocol::codec::RECEIVE_BUFFER_CAPACITY;
use crate::protocol::{has_frame, take_frame};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc};

/// Stable id of a live connection, assigned in accept order.
pub type ConnectionId = u64;

/// What waiting on a connection found on a connection.
#[derive(Debug)]
pub enum Readiness {
    /// A whole request frame is buffered.
    Readable,
    Closed,
}

/// Read half of a connection plus the bytes received but not yet taken as a
/// frame.
pub struct ReadSide {
    half: OwnedReadHalf,
    inbox: Vec<u8>,
}

impl ReadSide {
    /// Takes the next buffered request payload. Never touches the socket.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        take_frame(&mut self.inbox)
    }

    pub fn buffered(&self) -> usize {
        self.inbox.len()
    }
}

/// One accepted client connection.
///
/// The read side is only touched by the multiplexer's readiness wait or by the single
/// worker handling the connection's current request; `busy` keeps the two
/// apart. The write half is used by the spawned response writer.
pub struct ConnectionEntry {
    id: ConnectionId,
    peer: SocketAddr,
    reader: Mutex<ReadSide>,
    writer: Mutex<OwnedWriteHalf>,
    auth: Mutex<AuthState>,
    busy: AtomicBool,
    closed: AtomicBool,
    closed_tx: mpsc::UnboundedSender<ConnectionId>,
}

impl ConnectionEntry {
    fn new(
        id: ConnectionId,
        peer: SocketAddr,
        stream: TcpStream,
        closed_tx: mpsc::UnboundedSender<ConnectionId>,
    ) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            id,
            peer,
            reader: Mutex::new(ReadSide {
                half: reader,
                inbox: Vec::new(),
            }),
            writer: Mutex::new(writer),
            auth: Mutex::new(AuthState::default()),
            busy: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            closed_tx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn reader(&self) -> &Mutex<ReadSide> {
        &self.reader
    }

    pub fn writer(&self) -> &Mutex<OwnedWriteHalf> {
        &self.writer
    }

    pub fn auth(&self) -> &Mutex<AuthState> {
        &self.auth
    }

    /// Marks the connection as having a request in flight. Returns false if it
    /// already had one.
    pub fn try_acquire(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// The response has been written; the next request may be read.
    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Flags the connection and queues it for the arena's next prune.
    pub fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            // Fails only once the arena itself is gone.
            let _ = self.closed_tx.send(self.id);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Buffers incoming bytes until a whole frame has arrived or the peer goes
    /// away. Dropping the future loses nothing: bytes already read stay in the
    /// inbox for the next wait.
    pub async fn await_frame(self: Arc<Self>) -> (Arc<Self>, Readiness) {
        let readiness = {
            let mut side = self.reader.lock().await;
            let ReadSide { half, inbox } = &mut *side;
            loop {
                if has_frame(inbox) {
                    break Readiness::Readable;
                }
                inbox.reserve(RECEIVE_BUFFER_CAPACITY);
                match half.read_buf(inbox).await {
                    Ok(0) | Err(_) => break Readiness::Closed,
                    Ok(_) => {}
                }
            }
        };
        (self, readiness)
    }
}

/// Live connections keyed by id. Owned and mutated by the multiplexer only.
pub struct ConnectionArena {
    next_id: ConnectionId,
    entries: HashMap<ConnectionId, Arc<ConnectionEntry>>,
    closed_tx: mpsc::UnboundedSender<ConnectionId>,
    closed_rx: mpsc::UnboundedReceiver<ConnectionId>,
}

impl Default for ConnectionArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionArena {
    pub fn new() -> Self {
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        Self {
            next_id: 0,
            entries: HashMap::new(),
            closed_tx,
            closed_rx,
        }
    }

    pub fn register(&mut self, stream: TcpStream, peer: SocketAddr) -> Arc<ConnectionEntry> {
        self.next_id += 1;
        let entry = Arc::new(ConnectionEntry::new(
            self.next_id,
            peer,
            stream,
            self.closed_tx.clone(),
        ));
        self.entries.insert(entry.id, Arc::clone(&entry));
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Arc<ConnectionEntry>> {
        self.entries.get(&id)
    }

    /// Connections that are open and have no request in flight.
    pub fn idle(&self) -> Vec<Arc<ConnectionEntry>> {
        self.entries
            .values()
            .filter(|e| !e.is_closed() && !e.is_busy())
            .cloned()
            .collect()
    }

    /// Removes the connections closed since the last prune and returns them.
    pub fn prune(&mut self) -> Vec<Arc<ConnectionEntry>> {
        let mut pruned = Vec::new();
        while let Ok(id) = self.closed_rx.try_recv() {
            if let Some(entry) = self.entries.remove(&id) {
                pruned.push(entry);
            }
        }
        pruned
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Envelope, decode, encode};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    async fn pair(listener: &TcpListener) -> (TcpStream, TcpStream, SocketAddr) {
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (client, server, peer)
    }

    #[tokio::test]
    async fn test_register_assigns_monotonic_ids() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut arena = ConnectionArena::new();

        let (_c1, s1, p1) = pair(&listener).await;
        let (_c2, s2, p2) = pair(&listener).await;
        let first = arena.register(s1, p1);
        let second = arena.register(s2, p2);

        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);
        assert_eq!(arena.len(), 2);
    }

    #[tokio::test]
    async fn test_prune_removes_only_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut arena = ConnectionArena::new();

        let (_c1, s1, p1) = pair(&listener).await;
        let (_c2, s2, p2) = pair(&listener).await;
        let first = arena.register(s1, p1);
        let second = arena.register(s2, p2);

        first.mark_closed();
        let pruned = arena.prune();
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].id(), first.id());
        assert!(arena.get(first.id()).is_none());
        assert!(arena.get(second.id()).is_some());
    }

    #[tokio::test]
    async fn test_busy_connections_are_not_idle() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut arena = ConnectionArena::new();
        let (_c, s, p) = pair(&listener).await;
        let entry = arena.register(s, p);

        assert!(entry.try_acquire());
        assert!(!entry.try_acquire());
        assert!(arena.idle().is_empty());

        entry.release();
        assert_eq!(arena.idle().len(), 1);
    }

    #[tokio::test]
    async fn test_prune_is_idempotent_per_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut arena = ConnectionArena::new();
        let (_c, s, p) = pair(&listener).await;
        let entry = arena.register(s, p);

        entry.mark_closed();
        entry.mark_closed();
        assert_eq!(arena.prune().len(), 1);
        assert!(arena.prune().is_empty());
        assert!(arena.is_empty());
    }

    #[tokio::test]
    async fn test_await_frame_needs_a_whole_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut arena = ConnectionArena::new();
        let (mut client, s, p) = pair(&listener).await;
        let entry = arena.register(s, p);

        let frame = encode(&Envelope::login_check("alice")).unwrap();
        client.write_all(&frame[..3]).await.unwrap();
        let pending = timeout(Duration::from_millis(50), Arc::clone(&entry).await_frame()).await;
        assert!(pending.is_err());
        assert_eq!(entry.reader().lock().await.buffered(), 3);

        client.write_all(&frame[3..]).await.unwrap();
        let (_, readiness) = Arc::clone(&entry).await_frame().await;
        assert!(matches!(readiness, Readiness::Readable));

        let payload = entry.reader().lock().await.next_frame().unwrap().unwrap();
        let envelope: Envelope = decode(&payload).unwrap();
        assert_eq!(envelope, Envelope::login_check("alice"));
        assert_eq!(entry.reader().lock().await.buffered(), 0);
    }

    #[tokio::test]
    async fn test_await_frame_reports_closed_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut arena = ConnectionArena::new();
        let (client, s, p) = pair(&listener).await;
        let entry = arena.register(s, p);

        drop(client);
        let (_, readiness) = entry.await_frame().await;
        assert!(matches!(readiness, Readiness::Closed));
    }
}
