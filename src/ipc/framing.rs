//! Newline message framing for JSON-RPC over child process pipes.
//!
//! Bassbox speaks one JSON document per line on its stdio. This module turns
//! the raw, arbitrarily chunked output of the engine into discrete line frames
//! and writes outbound frames as single terminated lines.
//!
//! # Wire Format
//!
//! ```text
//! {"jsonrpc":"2.0","id":0,"method":"audioGraph.get","params":[]}\n
//! ```
//!
//! Any run of consecutive `\r` / `\n` bytes is a single delimiter, so `\r\n`
//! and `\n` both end a frame and blank lines between frames are swallowed.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Size of a single read from the inbound stream.
const READ_CHUNK_SIZE: usize = 8 * 1024;

type LineCallback = Arc<dyn Fn(&str) + Send + Sync>;

fn is_terminator(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}

#[derive(Default)]
struct ReaderState {
    /// Bytes of the line currently being assembled.
    partial: Vec<u8>,
    /// True when the last byte fed was a terminator.
    in_terminator_run: bool,
    callbacks: Vec<LineCallback>,
    /// Lines waiting for a `next()` caller.
    pulled: VecDeque<String>,
    waiters: VecDeque<oneshot::Sender<String>>,
    /// Lines are not queued for pulling until the first `next()` call.
    push_only: bool,
    closed: bool,
}

impl ReaderState {
    fn deliver_pull(&mut self, line: &str) {
        if self.push_only {
            return;
        }

        let mut line = line.to_owned();
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.send(line) {
                Ok(()) => return,
                // Waiter future was dropped; hand the line to the next one.
                Err(returned) => line = returned,
            }
        }
        self.pulled.push_back(line);
    }
}

/// Incremental line splitter shared between a stream pump and its consumers.
///
/// Lines are delivered two ways:
///
/// - **push**: every callback registered with [`LineReader::on_line`] sees
///   every completed line, in arrival order.
/// - **pull**: [`LineReader::next`] yields lines one at a time, from its own
///   queue. A reader made with [`LineReader::new`] queues every line from
///   the start; one made with [`LineReader::push_only`] queues nothing until
///   its first `next()` call.
///
/// The two modes are independent; a line handed to a callback is still
/// available to `next()` and vice versa.
///
/// No cap is placed on the size of an unterminated line.
///
/// # Example
///
/// ```ignore
/// let lines = LineReader::new();
/// lines.on_line(|line| println!("got {line}"));
/// lines.feed(b"ab")?;
/// lines.feed(b"c\n")?; // prints "got abc"
/// ```
#[derive(Clone, Default)]
pub struct LineReader {
    state: Arc<Mutex<ReaderState>>,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reader for callback-only consumers; lines are not kept for `next()`
    /// unless it is called.
    pub fn push_only() -> Self {
        let reader = Self::default();
        reader.lock().push_only = true;
        reader
    }

    fn lock(&self) -> MutexGuard<'_, ReaderState> {
        // Callbacks run outside the lock, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a chunk and emit every line it completes.
    ///
    /// Returns the number of lines emitted. Feeding is expected from a single
    /// producer; callbacks are invoked after the internal lock is released, so
    /// they may call back into the reader.
    ///
    /// # Errors
    ///
    /// Returns an error if a completed line is not valid UTF-8. That line is
    /// dropped; every other line in the chunk is still emitted.
    pub fn feed(&self, chunk: impl AsRef<[u8]>) -> Result<usize> {
        let (lines, callbacks, decode_error) = {
            let mut state = self.lock();
            let mut lines = Vec::new();
            let mut decode_error = None;

            for &byte in chunk.as_ref() {
                if !is_terminator(byte) {
                    state.in_terminator_run = false;
                    state.partial.push(byte);
                    continue;
                }
                if state.in_terminator_run {
                    continue;
                }
                state.in_terminator_run = true;

                let raw = std::mem::take(&mut state.partial);
                match String::from_utf8(raw) {
                    Ok(line) => lines.push(line),
                    Err(e) => {
                        decode_error.get_or_insert(e);
                    }
                }
            }

            for line in &lines {
                state.deliver_pull(line);
            }
            (lines, state.callbacks.clone(), decode_error)
        };

        for line in &lines {
            for callback in &callbacks {
                callback(line);
            }
        }

        if let Some(e) = decode_error {
            return Err(anyhow!(e).context("Received line is not valid UTF-8"));
        }
        Ok(lines.len())
    }

    /// Register a consumer invoked once per completed line.
    pub fn on_line<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.lock().callbacks.push(Arc::new(callback));
    }

    /// Wait for the next line not yet delivered through `next()`.
    ///
    /// The request is registered when `next()` is called, not when the
    /// returned future is first polled. Resolves to `None` once the reader is
    /// closed and no queued line remains.
    pub fn next(&self) -> impl Future<Output = Option<String>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.lock();
            state.push_only = false;
            if let Some(line) = state.pulled.pop_front() {
                let _ = tx.send(line);
            } else if !state.closed {
                state.waiters.push_back(tx);
            }
        }
        async move { rx.await.ok() }
    }

    /// Mark the end of the stream.
    ///
    /// Pending `next()` futures resolve to `None` and any unterminated
    /// fragment is discarded.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.waiters.clear();
        if !state.partial.is_empty() {
            debug!(
                bytes = state.partial.len(),
                "Discarding unterminated line at end of stream"
            );
            state.partial.clear();
        }
    }

    /// Number of bytes buffered for the line currently being assembled.
    pub fn buffered_len(&self) -> usize {
        self.lock().partial.len()
    }
}

/// Pump a byte stream into a [`LineReader`] until EOF.
///
/// Lines that are not valid UTF-8 are logged and skipped. The reader is
/// closed when this returns, whatever the outcome.
///
/// # Errors
///
/// Returns an error if reading from the stream fails.
pub async fn drive<R>(mut reader: R, lines: LineReader) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    let result = loop {
        let read = match reader
            .read(&mut chunk)
            .await
            .context("Failed to read from stream")
        {
            Ok(read) => read,
            Err(e) => break Err(e),
        };

        // EOF - engine closed its output
        if read == 0 {
            debug!("Inbound stream reached EOF");
            break Ok(());
        }

        if let Err(e) = lines.feed(&chunk[..read]) {
            warn!("Skipping undecodable line: {:#}", e);
        }
    };

    lines.close();
    result
}

/// Write one newline-terminated frame to the stream.
///
/// The body and its terminator go out in a single write, followed by a flush.
///
/// # Errors
///
/// Returns an error if the body contains a line terminator, or if the write
/// or flush fails.
///
/// # Example
///
/// ```ignore
/// let request = serde_json::to_string(&json_rpc_request)?;
/// write_line(&mut writer, &request).await?;
/// ```
pub async fn write_line<W>(writer: &mut W, body: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if body.bytes().any(is_terminator) {
        bail!("Frame body contains a line terminator");
    }

    let mut frame = Vec::with_capacity(body.len() + 1);
    frame.extend_from_slice(body.as_bytes());
    frame.push(b'\n');

    writer
        .write_all(&frame)
        .await
        .context("Failed to write frame")?;

    writer.flush().await.context("Failed to flush frame")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::io::duplex;
    use tokio::time::timeout;

    /// Test timeout to prevent hanging tests.
    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Attach a collector that records every pushed line.
    fn collect(reader: &LineReader) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        reader.on_line(move |line| sink.lock().unwrap().push(line.to_string()));
        seen
    }

    fn lines_of(chunks: &[&[u8]]) -> Vec<String> {
        let reader = LineReader::new();
        let seen = collect(&reader);
        for chunk in chunks {
            reader.feed(chunk).expect("feed failed");
        }
        let lines = seen.lock().unwrap().clone();
        lines
    }

    #[test]
    fn test_partial_line_is_buffered() {
        let reader = LineReader::new();
        let seen = collect(&reader);

        assert_eq!(reader.feed("ab").unwrap(), 0);
        assert_eq!(reader.buffered_len(), 2);
        assert_eq!(reader.feed("c\n").unwrap(), 1);

        assert_eq!(*seen.lock().unwrap(), vec!["abc".to_string()]);
        assert_eq!(reader.buffered_len(), 0);
    }

    #[test]
    fn test_several_lines_in_one_chunk() {
        let lines = lines_of(&[b"one\ntwo\r\nthree\npartial"]);
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_chunk_boundaries_do_not_change_output() {
        let content: &[u8] =
            b"{\"id\":0,\"result\":null}\r\n{\"id\":1,\"result\":[1,2]}\n\n{\"id\":2,\"result\":\"x\"}\n";
        let whole = lines_of(&[content]);
        assert_eq!(whole.len(), 3);

        for split in 0..=content.len() {
            let (head, tail) = content.split_at(split);
            assert_eq!(lines_of(&[head, tail]), whole, "split at {}", split);
        }

        let bytewise: Vec<&[u8]> = content.chunks(1).collect();
        assert_eq!(lines_of(&bytewise), whole);
    }

    #[test]
    fn test_terminator_run_collapses() {
        assert_eq!(lines_of(&[b"a\r\n\r\n\nb\n"]), vec!["a", "b"]);
        assert_eq!(lines_of(&[b"a\r", b"\n", b"\nb\n"]), vec!["a", "b"]);
    }

    #[test]
    fn test_leading_terminator_emits_empty_line() {
        assert_eq!(lines_of(&[b"\nabc\n"]), vec!["", "abc"]);
    }

    #[test]
    fn test_every_callback_sees_every_line() {
        let reader = LineReader::new();
        let first = collect(&reader);
        let second = collect(&reader);

        reader.feed("x\ny\n").unwrap();

        assert_eq!(*first.lock().unwrap(), vec!["x", "y"]);
        assert_eq!(*second.lock().unwrap(), vec!["x", "y"]);
    }

    #[test]
    fn test_invalid_utf8_line_is_dropped() {
        let reader = LineReader::new();
        let seen = collect(&reader);

        let result = reader.feed(b"ok\n\xff\xfe\nafter\n");

        assert!(result.is_err());
        let err_msg = format!("{:#}", result.unwrap_err());
        assert!(err_msg.contains("UTF-8"), "unexpected error: {}", err_msg);
        assert_eq!(*seen.lock().unwrap(), vec!["ok", "after"]);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let text = "caf\u{e9}\n".as_bytes();
        let (head, tail) = text.split_at(4);
        assert_eq!(lines_of(&[head, tail]), vec!["caf\u{e9}"]);
    }

    #[tokio::test]
    async fn test_next_waits_for_line() {
        let reader = LineReader::new();
        let pending = reader.next();

        reader.feed("first\nsecond\n").unwrap();

        let line = timeout(TEST_TIMEOUT, pending).await.expect("Test timed out");
        assert_eq!(line.as_deref(), Some("first"));

        let line = timeout(TEST_TIMEOUT, reader.next())
            .await
            .expect("Test timed out");
        assert_eq!(line.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_lines_fed_before_next_are_queued() {
        let reader = LineReader::new();
        let pushed = collect(&reader);

        reader.feed("before\n").unwrap();
        let pending = reader.next();
        reader.feed("after\n").unwrap();

        let line = timeout(TEST_TIMEOUT, pending).await.expect("Test timed out");
        assert_eq!(line.as_deref(), Some("before"));
        let line = timeout(TEST_TIMEOUT, reader.next())
            .await
            .expect("Test timed out");
        assert_eq!(line.as_deref(), Some("after"));
        assert_eq!(*pushed.lock().unwrap(), vec!["before", "after"]);
    }

    #[tokio::test]
    async fn test_push_only_reader_queues_from_first_next() {
        let reader = LineReader::push_only();
        let pushed = collect(&reader);

        reader.feed("before\n").unwrap();
        assert_eq!(*pushed.lock().unwrap(), vec!["before"]);

        let pending = reader.next();
        reader.feed("after\n").unwrap();

        let line = timeout(TEST_TIMEOUT, pending).await.expect("Test timed out");
        assert_eq!(line.as_deref(), Some("after"));
        assert_eq!(*pushed.lock().unwrap(), vec!["before", "after"]);
    }

    #[tokio::test]
    async fn test_dropped_next_does_not_lose_line() {
        let reader = LineReader::new();
        drop(reader.next());
        let kept = reader.next();

        reader.feed("only\n").unwrap();

        let line = timeout(TEST_TIMEOUT, kept).await.expect("Test timed out");
        assert_eq!(line.as_deref(), Some("only"));
    }

    #[tokio::test]
    async fn test_next_after_close_returns_none() {
        let reader = LineReader::new();
        let waiting = reader.next();
        reader.feed("queued").unwrap();
        reader.close();

        assert_eq!(timeout(TEST_TIMEOUT, waiting).await.unwrap(), None);
        assert_eq!(timeout(TEST_TIMEOUT, reader.next()).await.unwrap(), None);
        assert_eq!(reader.buffered_len(), 0);
    }

    #[tokio::test]
    async fn test_write_line_and_drive_roundtrip() {
        let (mut client, engine) = duplex(64);
        let reader = LineReader::new();
        let seen = collect(&reader);

        let pump = tokio::spawn(drive(engine, reader.clone()));

        let message = r#"{"jsonrpc":"2.0","id":0,"method":"audioGraph.get","params":[]}"#;
        write_line(&mut client, message).await.expect("Write failed");
        write_line(&mut client, "second").await.expect("Write failed");
        drop(client);

        timeout(TEST_TIMEOUT, pump)
            .await
            .expect("Test timed out")
            .expect("Pump panicked")
            .expect("Pump failed");

        assert_eq!(
            *seen.lock().unwrap(),
            vec![message.to_string(), "second".to_string()]
        );
    }

    #[tokio::test]
    async fn test_write_line_rejects_embedded_newline() {
        let (mut client, _engine) = duplex(64);

        let result = write_line(&mut client, "{\"a\":\n1}").await;

        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(
            err_msg.contains("line terminator"),
            "Expected terminator error, got: {}",
            err_msg
        );
    }
}
