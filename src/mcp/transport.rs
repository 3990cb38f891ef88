//! stdio transport for the MCP bridge.
//!
//! This module implements the stdio transport as specified by MCP:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (not MCP messages)
//!
//! # Concurrency
//!
//! Reading happens on the server loop. Responses are produced by
//! independent request tasks, so they are funnelled through an
//! [`OutboundSender`] into a single [`ResponseWriter`] task that owns
//! stdout; lines from different tasks can never interleave.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Reads newline-delimited messages, buffering partial lines.
pub struct LineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl LineReader<tokio::io::Stdin> {
    /// Creates a reader over the process stdin.
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Wraps an async reader.
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::with_capacity(4096),
        }
    }

    /// Reads the next complete, non-empty line.
    ///
    /// Returns `None` at EOF. A trailing fragment without a newline is
    /// discarded. Lines that are not valid UTF-8 are logged and skipped.
    ///
    /// Cancel-safe: bytes of a line read before the future is dropped stay
    /// buffered and are completed by the next call.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the underlying stream fails.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            self.reader.read_until(b'\n', &mut self.buf).await?;

            if self.buf.last() != Some(&b'\n') {
                // EOF - stdin closed
                if !self.buf.is_empty() {
                    tracing::debug!(bytes = self.buf.len(), "Discarding unterminated input at EOF");
                    self.buf.clear();
                }
                return Ok(None);
            }

            let mut line = std::mem::take(&mut self.buf);

            // Remove the trailing newline
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            match String::from_utf8(line) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => return Ok(Some(line)),
                Err(e) => {
                    tracing::warn!(error = %e.utf8_error(), "Dropping input line that is not valid UTF-8");
                }
            }
        }
    }
}

/// Cloneable handle used by request tasks to emit response lines.
#[derive(Debug, Clone)]
pub struct OutboundSender {
    tx: mpsc::UnboundedSender<String>,
}

impl OutboundSender {
    /// Serialises `message` and queues it for stdout.
    ///
    /// Returns `false` if the writer has shut down (e.g. stdout closed).
    pub fn send<T: Serialize>(&self, message: &T) -> bool {
        match serde_json::to_string(message) {
            Ok(json) => self.tx.send(json).is_ok(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialise outgoing message");
                false
            }
        }
    }
}

/// Owns stdout and writes queued messages one line at a time.
pub struct ResponseWriter<W> {
    rx: mpsc::UnboundedReceiver<String>,
    writer: W,
}

/// Creates a connected sender/writer pair over `writer`.
pub fn channel<W: AsyncWrite + Unpin>(writer: W) -> (OutboundSender, ResponseWriter<W>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OutboundSender { tx }, ResponseWriter { rx, writer })
}

impl<W: AsyncWrite + Unpin> ResponseWriter<W> {
    /// Writes messages until every sender has been dropped.
    ///
    /// # Errors
    ///
    /// Returns the first write error; `BrokenPipe` means the client went away.
    pub async fn run(mut self) -> io::Result<()> {
        while let Some(json) = self.rx.recv().await {
            self.write_raw(&json).await?;
        }
        self.writer.flush().await
    }

    /// Writes a raw JSON string with newline termination.
    async fn write_raw(&mut self, json: &str) -> io::Result<()> {
        // MCP spec: messages must not contain embedded newlines
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }
}
