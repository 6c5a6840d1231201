use crate::error::HarnessError;
use crate::Result;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::UnixDatagram;
use tokio::time::timeout;
use tracing::debug;

/// The one payload a conforming server sends when it is ready.
pub const READY_PAYLOAD: &[u8] = b"READY=1";

/// Receive buffer for the readiness datagram.
const RECV_BUF: usize = 1000;

/// Rendezvous endpoint for the server's startup notification.
///
/// Binds a datagram socket under a fresh temporary directory, so
/// concurrently running suites can never collide on the path. The socket
/// file and its directory are removed on drop, whether or not a signal
/// ever arrived.
pub struct ReadinessChannel {
    dir: TempDir,
    path: PathBuf,
    socket: UnixDatagram,
}

impl ReadinessChannel {
    pub fn bind() -> Result<Self> {
        let dir = TempDir::new()?;
        let path = dir.path().join("notify.sock");
        let socket = UnixDatagram::bind(&path)?;
        debug!(path = %path.display(), "readiness socket bound");
        Ok(Self { dir, path, socket })
    }

    /// The address handed to the child via `NOTIFY_SOCKET`.
    pub fn socket_path(&self) -> &Path {
        &self.path
    }

    /// Waits for exactly one datagram and returns its payload.
    ///
    /// Consumes the channel: the endpoint is torn down afterwards whether
    /// the wait succeeded or timed out. A server that never signals must
    /// not hang the suite, so the wait is always bounded.
    pub async fn await_ready(self, wait: Duration) -> Result<Bytes> {
        let mut buf = vec![0u8; RECV_BUF];
        let received = timeout(wait, self.socket.recv(&mut buf))
            .await
            .map_err(|_| HarnessError::ReadinessTimeout { timeout: wait })??;
        buf.truncate(received);
        debug!(bytes = received, "readiness signal received");
        drop(self.dir);
        Ok(Bytes::from(buf))
    }
}
