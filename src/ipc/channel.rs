//! Line-framed JSON channel over async pipes.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};

use crate::error::{ClusterError, Result};

/// Writes one JSON document per line and flushes after each.
pub struct LineSender<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> LineSender<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialize `message` and write it as a single line.
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let mut line = serde_json::to_string(message)
            .map_err(|e| ClusterError::Ipc(format!("encode failed: {}", e)))?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Reads newline-delimited JSON documents.
pub struct LineReceiver<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> LineReceiver<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }

    /// Receive the next message. Returns `None` on EOF.
    ///
    /// Blank lines are skipped; malformed lines are an error the caller may
    /// log and continue past.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return serde_json::from_str(line)
                .map(Some)
                .map_err(|e| ClusterError::Ipc(format!("decode failed for {:?}: {}", line, e)));
        }
    }
}
