//! Client session: the per-connection wrapper around a TCP socket that
//! speaks the line-oriented wire protocol (core component #2).
//!
//! A [`ClientSession`] owns the write half of a split socket behind a mutex
//! so that concurrent senders (the scheduler broadcasting a spec, a task
//! pushing a status update) never interleave partial lines. Reading is
//! driven by [`ClientSession::run_read_loop`], which reads one raw line at a
//! time and fans it out, unparsed, to every task currently registered on
//! this client via [`TaskMailbox`] — decoding and session/auction filtering
//! is each task's own responsibility (§4.2), not the session's.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::codec::{encode, Message};
use crate::error::{SharedError, SharedResult};

/// Identifies a client connection for logging purposes only. Distinct from
/// the auction protocol's `sessionId` field, which is a coordinator-wide
/// configuration value carried in every wire message, not a per-connection
/// identifier.
pub type ClientId = u64;

/// Anything that can accept a raw inbound line for later parsing. Tasks
/// implement this over their own mailbox sender so `auction-shared` never
/// needs to depend on `auction-worker`.
pub trait TaskMailbox: Send + Sync {
    fn enqueue(&self, line: String);
}

/// A single client's TCP connection: a guarded write half, plus the set of
/// tasks currently registered to receive its inbound lines.
pub struct ClientSession {
    id: ClientId,
    writer: Mutex<OwnedWriteHalf>,
    registered: RwLock<Vec<Arc<dyn TaskMailbox>>>,
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession").field("id", &self.id).finish_non_exhaustive()
    }
}

impl ClientSession {
    pub fn new(id: ClientId, writer: OwnedWriteHalf) -> Arc<Self> {
        Arc::new(Self { id, writer: Mutex::new(writer), registered: RwLock::new(Vec::new()) })
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Register a task to receive this client's future inbound lines.
    pub async fn register(&self, task: Arc<dyn TaskMailbox>) {
        self.registered.write().await.push(task);
    }

    /// Deregister a task by pointer identity. A task that unregisters mid
    /// read-iteration may still receive one more line; §4.5 tolerates this
    /// via the task's own session/auction filter.
    pub async fn unregister(&self, task: &Arc<dyn TaskMailbox>) {
        let target = Arc::as_ptr(task) as *const ();
        self.registered.write().await.retain(|t| Arc::as_ptr(t) as *const () != target);
    }

    /// Encode and send a single message, serialized against other senders.
    ///
    /// A write against a socket this same session already [`shutdown`](Self::shutdown)
    /// surfaces as [`SharedError::SessionClosed`] rather than the raw I/O
    /// error, since every broadcaster (§4.2's `broadcast`) treats the two
    /// cases identically: stop sending to this client.
    pub async fn send(&self, message: &Message) -> SharedResult<()> {
        let mut line = encode(message);
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await.map_err(|err| match err.kind() {
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::NotConnected => SharedError::SessionClosed,
            _ => SharedError::Io(err),
        })
    }

    pub async fn shutdown(&self) -> SharedResult<()> {
        self.writer.lock().await.shutdown().await.map_err(SharedError::Io)
    }

    /// Drive the read half to completion, fanning each raw line out to
    /// every currently registered task. Returns once the client disconnects
    /// or a read error occurs.
    pub async fn run_read_loop(self: &Arc<Self>, read_half: OwnedReadHalf) {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let registered = self.registered.read().await;
                    for task in registered.iter() {
                        task.enqueue(line.clone());
                    }
                }
                Ok(None) => {
                    debug!(client_id = self.id, "client closed connection");
                    break;
                }
                Err(err) => {
                    debug!(client_id = self.id, error = %err, "client read error");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    struct RecordingMailbox {
        lines: Mutex<Vec<String>>,
        count: AtomicUsize,
    }

    impl RecordingMailbox {
        fn new() -> Self {
            Self { lines: Mutex::new(Vec::new()), count: AtomicUsize::new(0) }
        }
    }

    impl TaskMailbox for RecordingMailbox {
        fn enqueue(&self, line: String) {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.lines.try_lock().expect("test mailbox uncontended").push(line);
        }
    }

    async fn connected_pair() -> (tokio::net::TcpStream, tokio::net::TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = tokio::net::TcpStream::connect(addr);
        let (accept, connect) = tokio::join!(listener.accept(), connect);
        (accept.unwrap().0, connect.unwrap())
    }

    #[tokio::test]
    async fn send_writes_one_encoded_line() {
        let (server_sock, mut client_sock) = connected_pair().await;
        let (_read, write) = server_sock.into_split();
        let session = ClientSession::new(1, write);

        session.send(&Message::new("ping")).await.unwrap();

        use tokio::io::AsyncReadExt;
        let mut buf = vec![0u8; 16];
        let n = client_sock.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping\n");
    }

    #[tokio::test]
    async fn read_loop_fans_lines_out_to_every_registered_task() {
        let (server_sock, mut client_sock) = connected_pair().await;
        let (read, write) = server_sock.into_split();
        let session = ClientSession::new(7, write);
        let a = Arc::new(RecordingMailbox::new());
        let b = Arc::new(RecordingMailbox::new());
        session.register(a.clone() as Arc<dyn TaskMailbox>).await;
        session.register(b.clone() as Arc<dyn TaskMailbox>).await;

        let reader_session = session.clone();
        let reader = tokio::spawn(async move {
            reader_session.run_read_loop(read).await;
        });

        use tokio::io::AsyncWriteExt;
        client_sock.write_all(b"bid amount=10\n").await.unwrap();
        drop(client_sock);

        reader.await.unwrap();

        assert_eq!(a.count.load(Ordering::SeqCst), 1);
        assert_eq!(b.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_after_shutdown_reports_session_closed() {
        let (server_sock, _client_sock) = connected_pair().await;
        let (_read, write) = server_sock.into_split();
        let session = ClientSession::new(3, write);

        session.shutdown().await.unwrap();

        let err = session.send(&Message::new("ping")).await.unwrap_err();
        assert!(matches!(err, SharedError::SessionClosed));
    }

    #[tokio::test]
    async fn unregister_stops_future_deliveries() {
        let (server_sock, mut client_sock) = connected_pair().await;
        let (read, write) = server_sock.into_split();
        let session = ClientSession::new(9, write);
        let mailbox = Arc::new(RecordingMailbox::new());
        let dyn_mailbox: Arc<dyn TaskMailbox> = mailbox.clone();
        session.register(dyn_mailbox.clone()).await;
        session.unregister(&dyn_mailbox).await;

        let reader_session = session.clone();
        let reader = tokio::spawn(async move {
            reader_session.run_read_loop(read).await;
        });

        use tokio::io::AsyncWriteExt;
        client_sock.write_all(b"bid amount=10\n").await.unwrap();
        drop(client_sock);
        reader.await.unwrap();

        assert_eq!(mailbox.count.load(Ordering::SeqCst), 0);
    }
}
