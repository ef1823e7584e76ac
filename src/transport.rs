//! Null-byte framed JSON-RPC over the browser's stdin/stdout pipes.
//!
//! Framing is null-delimited, not newline-delimited — messages may contain
//! embedded newlines. Resist switching to WebSocket/newline framing: that
//! would require a local port, a handshake, and TLS concerns the pipe
//! avoids entirely.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};

use crate::config::LaunchConfig;
use crate::error::{CdpError, Result};
use crate::process::BrowserProcess;

const FRAME_SENTINEL: u8 = 0x00;

pub struct Transport {
    process: BrowserProcess,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Transport {
    pub async fn spawn(
        executable: &Path,
        user_data_dir: &Path,
        config: &LaunchConfig,
    ) -> Result<Self> {
        let (process, stdin, stdout) =
            BrowserProcess::spawn(executable, user_data_dir, config).await?;
        Ok(Self {
            process,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Writes one JSON message terminated by a single `0x00` byte.
    pub async fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.stdin
            .write_all(frame)
            .await
            .map_err(|_| CdpError::TransportClosed)?;
        self.stdin
            .write_all(&[FRAME_SENTINEL])
            .await
            .map_err(|_| CdpError::TransportClosed)?;
        self.stdin.flush().await.map_err(|_| CdpError::TransportClosed)
    }

    /// Reads the next complete null-terminated frame, stripping the
    /// sentinel. Returns `TransportClosed` at end-of-stream.
    pub async fn recv(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        loop {
            let byte = self
                .stdout
                .read_u8()
                .await
                .map_err(|_| CdpError::TransportClosed)?;
            if byte == FRAME_SENTINEL {
                return Ok(buf);
            }
            buf.push(byte);
        }
    }

    /// Drops this half's `ChildStdin` to signal end-of-input to the
    /// browser, then waits for the subprocess via `BrowserProcess::stop`.
    pub async fn stop(self, grace: Duration) -> std::io::Result<()> {
        drop(self.stdin);
        self.process.stop(grace).await
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_sentinel_is_nul() {
        assert_eq!(FRAME_SENTINEL, 0);
    }
}
