//! Mock TCP server for protocol-level testing.
//!
//! [`MockTcpServer`] is a loopback TCP listener that replays a script
//! against a single client. It stands in for the receiver's control port
//! when testing `TcpTransport` and the full client end to end.
//!
//! # Example
//!
//! ```
//! use netsdr_test_harness::MockTcpServer;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//!
//! // Acknowledge the RF filter command by echoing it back.
//! server.expect_echo(&[0x06, 0x00, 0x44, 0x00, 0x00, 0x00]);
//!
//! let addr = server.addr().to_string();
//! server.start();
//! // ... connect a TcpTransport to `addr` and drive it ...
//! server.wait().await.map_err(netsdr_core::Error::Transport)?;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use netsdr_core::error::{Error, Result};

/// One step of the server script.
#[derive(Debug, Clone)]
enum Step {
    /// Read exactly `request`, then write `response`.
    Exchange { request: Vec<u8>, response: Vec<u8> },
    /// Write bytes without waiting for the client.
    Push(Vec<u8>),
}

/// A scripted TCP server on a random localhost port.
///
/// The listener is bound by [`new`](MockTcpServer::new), so clients may
/// connect as soon as [`start`](MockTcpServer::start) has been called. The
/// server accepts one connection and runs the script in order. A request
/// that does not match ends the script with an error, reported by
/// [`wait`](MockTcpServer::wait).
pub struct MockTcpServer {
    addr: String,
    listener: Option<TcpListener>,
    script: VecDeque<Step>,
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Bind a new server to `127.0.0.1:0`.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock TCP server: {}", e)))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();

        Ok(Self {
            addr,
            listener: Some(listener),
            script: VecDeque::new(),
            server_handle: None,
        })
    }

    /// Expect `request` from the client and answer with `response`.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.script.push_back(Step::Exchange {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Expect `request` and echo it back as the acknowledgement.
    pub fn expect_echo(&mut self, request: &[u8]) {
        self.expect(request, request);
    }

    /// Write `data` to the client unprompted at this point in the script.
    pub fn push(&mut self, data: &[u8]) {
        self.script.push_back(Step::Push(data.to_vec()));
    }

    /// The address the server is listening on, `127.0.0.1:port`.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Accept one client and run the script in a background task.
    ///
    /// After the script completes the server keeps the connection open
    /// until the client closes it, so a finished script does not look like
    /// a dropped link.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            tracing::warn!(addr = %self.addr, "Mock TCP server already started");
            return;
        };
        let script: Vec<Step> = self.script.drain(..).collect();

        let handle = tokio::spawn(async move {
            let (mut stream, peer) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {}", e))?;
            tracing::debug!(peer = %peer, steps = script.len(), "Mock TCP server accepted client");

            for (i, step) in script.iter().enumerate() {
                match step {
                    Step::Exchange { request, response } => {
                        read_expected(&mut stream, i, request).await?;
                        write_all(&mut stream, i, response).await?;
                    }
                    Step::Push(data) => write_all(&mut stream, i, data).await?,
                }
            }

            // Hold the connection until the client hangs up.
            let mut sink = [0u8; 256];
            loop {
                match stream.read(&mut sink).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            Ok(())
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the server task to finish and return any script error.
    ///
    /// The task ends when the client closes its connection, so disconnect
    /// the client before calling this.
    pub async fn wait(self) -> std::result::Result<(), String> {
        if let Some(handle) = self.server_handle {
            handle
                .await
                .map_err(|e| format!("server task panicked: {}", e))?
        } else {
            Ok(())
        }
    }
}

async fn read_expected(
    stream: &mut TcpStream,
    step: usize,
    request: &[u8],
) -> std::result::Result<(), String> {
    let mut buf = vec![0u8; request.len()];
    let mut total_read = 0;

    while total_read < request.len() {
        let n = stream
            .read(&mut buf[total_read..])
            .await
            .map_err(|e| format!("step {}: read error: {}", step, e))?;
        if n == 0 {
            return Err(format!(
                "step {}: client disconnected after {} bytes (expected {})",
                step,
                total_read,
                request.len()
            ));
        }
        total_read += n;
    }

    if buf != request {
        return Err(format!(
            "step {}: request mismatch: expected {:02X?}, got {:02X?}",
            step, request, buf
        ));
    }
    Ok(())
}

async fn write_all(
    stream: &mut TcpStream,
    step: usize,
    data: &[u8],
) -> std::result::Result<(), String> {
    stream
        .write_all(data)
        .await
        .map_err(|e| format!("step {}: write error: {}", step, e))?;
    stream
        .flush()
        .await
        .map_err(|e| format!("step {}: flush error: {}", step, e))
}
