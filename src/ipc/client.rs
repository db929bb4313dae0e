//! JSON-RPC 2.0 client for communication with the Bassbox engine.
//!
//! This module provides `RpcClient`, an async client that writes requests as
//! newline-terminated frames and correlates response lines back to their
//! callers by request id. Any number of calls may be in flight at once;
//! responses are matched by id, never by arrival order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::ipc::framing::{drive, write_line, LineReader};
use crate::models::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, ResponseOutcome};

/// RPC-specific error types.
///
/// Every variant is local to a single call; none of them affects other
/// in-flight calls or the dispatch of incoming lines.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Protocol-level error (framing, encoding, malformed response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Engine returned a JSON-RPC error response.
    #[error("Server error {code}: {message}")]
    ServerError {
        /// JSON-RPC error code
        code: i64,
        /// Error message
        message: String,
        /// Optional additional data
        data: Option<Value>,
    },

    /// Call did not complete within its deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Call was cancelled through its cancellation token.
    #[error("Request cancelled")]
    Cancelled,

    /// The inbound stream ended before a response arrived.
    #[error("Connection closed")]
    Disconnected,

    /// The path names a declared scope, which is not a method.
    #[error("'{0}' is a scope, not a method")]
    NotCallable(String),

    /// I/O error during communication.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::UnexpectedEof => RpcError::Disconnected,
            _ => RpcError::Io(err),
        }
    }
}

impl From<JsonRpcError> for RpcError {
    fn from(err: JsonRpcError) -> Self {
        RpcError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

type Settle = oneshot::Sender<Result<Value, RpcError>>;

#[derive(Default)]
struct PendingTable {
    calls: HashMap<u64, Settle>,
    /// Set once the inbound stream has ended; no new calls are accepted.
    closed: bool,
}

struct Shared {
    writer: AsyncMutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: Mutex<PendingTable>,
    /// Monotonically increasing request ID counter.
    request_id: AtomicU64,
}

impl Shared {
    fn lock_pending(&self) -> MutexGuard<'_, PendingTable> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Handle one inbound line. Never fails; noise is logged and dropped.
    fn dispatch(&self, line: &str) {
        let raw = line.trim();
        if raw.is_empty() {
            debug!("Skipping empty line");
            return;
        }

        let response = match JsonRpcResponse::parse(raw) {
            Ok(response) => response,
            Err(e) => {
                warn!("Discarding line that is not JSON ({}): {}", e, raw);
                return;
            }
        };

        let Some(id) = response.id else {
            warn!("Got response without a usable id {}", raw);
            return;
        };

        let Some(settle) = self.lock_pending().calls.remove(&id) else {
            warn!("Got unrecognized response {}", raw);
            return;
        };

        let outcome = match response.outcome {
            ResponseOutcome::Result(value) => Ok(value),
            ResponseOutcome::Error(err) => Err(RpcError::from(err)),
            ResponseOutcome::InvalidError(error) => Err(RpcError::Protocol(format!(
                "Malformed error object {} in response {}",
                error, raw
            ))),
            ResponseOutcome::Missing => Err(RpcError::Protocol(format!(
                "No result in response {}",
                raw
            ))),
        };

        if settle.send(outcome).is_err() {
            debug!(id, "Caller went away before its response arrived");
        }
    }

    /// Fail every pending call and refuse new ones.
    fn disconnect(&self) {
        let drained: Vec<(u64, Settle)> = {
            let mut pending = self.lock_pending();
            pending.closed = true;
            pending.calls.drain().collect()
        };

        if !drained.is_empty() {
            warn!("Connection closed with {} calls in flight", drained.len());
        }
        for (_, settle) in drained {
            let _ = settle.send(Err(RpcError::Disconnected));
        }
    }
}

/// Removes a pending entry when its call finishes, times out, is cancelled,
/// or is dropped.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.shared.lock_pending().calls.remove(&self.id).is_some() {
            debug!(id = self.id, "Abandoned pending call");
        }
    }
}

/// JSON-RPC client over a line-framed duplex stream.
///
/// Cloning is cheap; clones share the writer, the id counter and the
/// pending-call table, so every clone sees the same connection. Each client
/// created with [`RpcClient::new`] or [`RpcClient::spawn`] owns its own
/// counter (starting at 0) and table.
///
/// Calls never time out unless a deadline is configured with
/// [`RpcClient::set_timeout`] or passed to [`RpcClient::call_with_timeout`].
///
/// # Example
///
/// ```ignore
/// use bassbox_rpc::ipc::RpcClient;
/// use serde_json::json;
///
/// let (client, _pump) = RpcClient::spawn(child_stdout, child_stdin);
/// let graph = client.call("audioGraph.get", vec![]).await?;
/// client.call("audioPlayer.setVolume", vec![json!(0.5)]).await?;
/// ```
#[derive(Clone)]
pub struct RpcClient {
    shared: Arc<Shared>,
    /// Deadline applied by `call`, if any.
    timeout: Option<Duration>,
}

impl RpcClient {
    /// Create a client writing to `writer` and listening on `lines`.
    ///
    /// The line reader must be fed by whoever owns the inbound stream; see
    /// [`RpcClient::spawn`] for the common case.
    pub fn new<W>(writer: W, lines: &LineReader) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared {
            writer: AsyncMutex::new(Box::new(writer)),
            pending: Mutex::new(PendingTable::default()),
            request_id: AtomicU64::new(0),
        });

        let weak = Arc::downgrade(&shared);
        lines.on_line(move |line| {
            if let Some(shared) = weak.upgrade() {
                shared.dispatch(line);
            }
        });

        Self {
            shared,
            timeout: None,
        }
    }

    /// Create a client and pump `reader` into it on a background task.
    ///
    /// When the stream ends, calls still waiting fail with
    /// [`RpcError::Disconnected`] and later calls fail immediately.
    pub fn spawn<R, W>(reader: R, writer: W) -> (Self, JoinHandle<()>)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let lines = LineReader::push_only();
        let client = Self::new(writer, &lines);
        let shared = Arc::downgrade(&client.shared);

        let pump = tokio::spawn(async move {
            if let Err(e) = drive(reader, lines).await {
                error!("Engine output stream failed: {:#}", e);
            }
            if let Some(shared) = shared.upgrade() {
                shared.disconnect();
            }
        });

        (client, pump)
    }

    /// Set the deadline applied by [`RpcClient::call`].
    ///
    /// `None` (the default) waits forever.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Number of calls waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.shared.lock_pending().calls.len()
    }

    /// True once the inbound stream has ended.
    pub fn is_closed(&self) -> bool {
        self.shared.lock_pending().closed
    }

    /// Send a JSON-RPC 2.0 request and wait for the response.
    ///
    /// # Arguments
    ///
    /// * `method` - Fully qualified method name (e.g., "audioPlayer.setVolume")
    /// * `params` - Positional parameters
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The engine returns an error object (`RpcError::ServerError`)
    /// - The response has neither result nor error (`RpcError::Protocol`)
    /// - The request cannot be written (`RpcError::Io`, `RpcError::Disconnected`)
    /// - A configured deadline passes (`RpcError::Timeout`)
    ///
    /// # Example
    ///
    /// ```ignore
    /// let index = client.call("audioGraph.addNode", vec![json!({"type": "Empty"})]).await?;
    /// ```
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        match self.timeout {
            Some(limit) => self.call_with_timeout(method, params, limit).await,
            None => self.issue(method, params).await,
        }
    }

    /// Like [`RpcClient::call`] with an explicit deadline.
    ///
    /// On expiry the pending entry is removed, so a late response is logged
    /// as unrecognized.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Vec<Value>,
        limit: Duration,
    ) -> Result<Value, RpcError> {
        match timeout(limit, self.issue(method, params)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout(limit)),
        }
    }

    /// Like [`RpcClient::call`], failing with [`RpcError::Cancelled`] when
    /// `token` fires first.
    pub async fn call_cancellable(
        &self,
        method: &str,
        params: Vec<Value>,
        token: &CancellationToken,
    ) -> Result<Value, RpcError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(RpcError::Cancelled),
            result = self.issue(method, params) => result,
        }
    }

    /// Generate the next request ID.
    fn next_id(&self) -> u64 {
        self.shared.request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register, send and await one call (internal, no deadline).
    async fn issue(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let id = self.next_id();
        let (settle, response) = oneshot::channel();

        {
            let mut pending = self.shared.lock_pending();
            if pending.closed {
                return Err(RpcError::Disconnected);
            }
            pending.calls.insert(id, settle);
        }
        let _guard = PendingGuard {
            shared: &self.shared,
            id,
        };

        let request = JsonRpcRequest::new(method, params, id);
        let request_json = serde_json::to_string(&request)
            .map_err(|e| RpcError::Protocol(format!("Failed to serialize request: {}", e)))?;

        debug!(id, method, "Sending request");
        // Written by its own task: a deadline, a cancellation or a dropped
        // caller abandons the wait, never a half-written frame.
        let shared = Arc::clone(&self.shared);
        let send = tokio::spawn(async move {
            let mut writer = shared.writer.lock().await;
            write_line(&mut *writer, &request_json).await
        });
        send.await
            .map_err(|e| RpcError::Protocol(format!("Writer task failed: {}", e)))?
            .map_err(send_error)?;

        // Sender dropped without settling means the table was torn down.
        response.await.unwrap_or(Err(RpcError::Disconnected))
    }
}

fn send_error(err: anyhow::Error) -> RpcError {
    match err.downcast::<std::io::Error>() {
        Ok(io) => io.into(),
        Err(other) => RpcError::Protocol(format!("Failed to send request: {:#}", other)),
    }
}
