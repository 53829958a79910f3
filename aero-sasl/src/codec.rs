use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tokio_util::bytes::BytesMut;

use crate::decode;
use crate::encode::Encode;
use crate::error::{Error, Result};

/// One protocol message: `COMMAND<TAB>param1<TAB>param2...<LF>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub command: String,
    pub params: Vec<String>,
}

impl Line {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            params: vec![],
        }
    }

    pub fn param(mut self, p: impl Into<String>) -> Self {
        self.params.push(p.into());
        self
    }

    pub fn params<I, P>(mut self, ps: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.params.extend(ps.into_iter().map(Into::into));
        self
    }

    /// Check the command name and that at least `min_params` parameters follow it.
    pub fn expect(self, command: &str, min_params: usize) -> Result<Vec<String>> {
        if self.command != command {
            return Err(Error::UnexpectedCommand(self.command));
        }
        if self.params.len() < min_params {
            return Err(Error::MissingParams {
                command: self.command,
                got: self.params.len(),
            });
        }
        Ok(self.params)
    }
}

/// Line framing over a byte stream. Every write is flushed right away, the
/// protocol is strictly request/response.
pub struct LineCodec<S> {
    stream: BufStream<S>,
    timeout: Option<Duration>,
    read_buf: Vec<u8>,
    write_buf: BytesMut,
}

impl<S: AsyncRead + AsyncWrite + Unpin> LineCodec<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufStream::new(stream),
            timeout: None,
            read_buf: Vec::new(),
            write_buf: BytesMut::new(),
        }
    }

    /// Fail reads that wait longer than `timeout` for a complete line.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn write(&mut self, line: &Line) -> Result<()> {
        self.write_buf.clear();
        line.encode(&mut self.write_buf)?;
        tracing::trace!(cmd=%line.command, params=?line.params, "Sent command");

        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Wait for the next line. Partial data stays buffered if this future is
    /// dropped, so it can be raced against a shutdown signal.
    pub async fn read(&mut self) -> Result<Line> {
        let bread = match self.timeout {
            None => self.stream.read_until(b'\n', &mut self.read_buf).await?,
            Some(t) => {
                tokio::time::timeout(t, self.stream.read_until(b'\n', &mut self.read_buf))
                    .await
                    .map_err(|_| Error::Timeout)??
            }
        };

        // Detect EOF / socket close
        if bread == 0 && self.read_buf.is_empty() {
            return Err(Error::Closed);
        }

        let line = decode::line(&self.read_buf);
        self.read_buf.clear();
        let line = line?;
        tracing::trace!(cmd=%line.command, params=?line.params, "Received command");
        Ok(line)
    }

    pub async fn read_expect(&mut self, command: &str, min_params: usize) -> Result<Vec<String>> {
        self.read().await?.expect(command, min_params)
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
