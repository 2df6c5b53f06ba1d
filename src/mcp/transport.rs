//! stdio transport for the MCP server.
//!
//! Framing follows the MCP stdio transport:
//!
//! - one UTF-8 JSON-RPC message per line, no embedded newlines
//! - requests arrive on stdin, responses leave on stdout
//! - stderr carries logs only
//!
//! The transport is owned by the dispatch loop. Handler tasks never write
//! to it directly; they hand an [`Outgoing`] back to the loop instead.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::mcp::protocol::{JsonRpcError, Outgoing};

/// Line-delimited JSON-RPC transport over an async reader/writer pair.
///
/// [`StdioTransport::new`] binds it to the process's stdin and stdout;
/// [`StdioTransport::with_io`] accepts any pair, which the tests use with
/// in-memory buffers.
pub struct StdioTransport<R = BufReader<tokio::io::Stdin>, W = tokio::io::Stdout> {
    reader: R,
    writer: W,
    /// Bytes of the line being read; survives a cancelled `read_line`.
    pending: Vec<u8>,
}

impl StdioTransport {
    /// Creates a transport on stdin/stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_io(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over an arbitrary reader and writer.
    pub const fn with_io(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            pending: Vec::new(),
        }
    }

    /// Reads the next message line.
    ///
    /// Returns `None` once the input is closed. Cancel safe: a partly read
    /// line is kept and completed by the next call, so this can race other
    /// futures in `select!`. Invalid UTF-8 is replaced rather than rejected
    /// so the line still reaches the JSON parser and gets a parse error.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.pending).await?;
        if read == 0 && self.pending.is_empty() {
            return Ok(None);
        }

        let bytes = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&bytes);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// Writes a response or error message.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_outgoing(&mut self, message: &Outgoing) -> io::Result<()> {
        let json = match message {
            Outgoing::Response(resp) => serde_json::to_string(resp),
            Outgoing::Error(err) => serde_json::to_string(err),
        }
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        self.write_raw(&json).await
    }

    /// Writes a JSON-RPC error.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_error(&mut self, error: &JsonRpcError) -> io::Result<()> {
        let json = serde_json::to_string(error)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        self.write_raw(&json).await
    }

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

    /// Consumes the transport and returns the writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}
