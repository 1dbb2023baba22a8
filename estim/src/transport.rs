/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Byte-level link to the ET232.
//!
//! The protocol layer only needs two primitives: write a request frame and
//! read one `\n`-terminated response line.  [`Transport`] captures exactly
//! that, so the device can be driven over a real serial port
//! ([`open_serial`]) or any in-memory stream in tests.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use crate::config::LinkConfig;

/// Line terminator of every device response.
pub const LINE_DELIMITER: u8 = b'\n';

// ── Error type ────────────────────────────────────────────────────────────────

/// I/O level failure on the link.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The serial port could not be opened.
    #[error("cannot open serial port '{port}': {source}")]
    Open {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No complete line arrived within the read timeout.
    ///
    /// `partial` holds whatever bytes did arrive.  The power-on preamble is
    /// not newline-terminated, so the handshake relies on this.
    #[error("read timed out ({} partial byte(s) received)", .partial.len())]
    Timeout { partial: Vec<u8> },

    /// The peer closed the stream before a full line arrived.
    #[error("link closed by peer")]
    Closed,
}

// ── Transport trait ───────────────────────────────────────────────────────────

/// Framed duplex channel used by [`Et232`](crate::device::Et232).
#[async_trait]
pub trait Transport: Send {
    /// Writes the full buffer (and flushes it).
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Reads up to and including the next `\n`, returning the line without
    /// the delimiter.
    async fn read_line(&mut self) -> Result<Vec<u8>, TransportError>;
}

// ── StreamTransport ───────────────────────────────────────────────────────────

/// [`Transport`] over any tokio byte stream with a bounded per-read timeout.
pub struct StreamTransport<S> {
    stream: BufReader<S>,
    read_timeout: Duration,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, read_timeout: Duration) -> Self {
        Self {
            stream: BufReader::new(stream),
            read_timeout,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut line = Vec::new();
        let read = tokio::time::timeout(
            self.read_timeout,
            self.stream.read_until(LINE_DELIMITER, &mut line),
        )
        .await;

        match read {
            // read_until leaves already-consumed bytes in `line` when cancelled
            Err(_elapsed) => Err(TransportError::Timeout { partial: line }),
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Ok(Ok(_)) if line.last() == Some(&LINE_DELIMITER) => {
                line.pop();
                Ok(line)
            }
            Ok(Ok(_)) => Err(TransportError::Closed),
        }
    }
}

/// Opens the serial port described by `config`.
pub fn open_serial(config: &LinkConfig) -> Result<StreamTransport<SerialStream>, TransportError> {
    debug!(
        port = %config.port,
        baud_rate = config.baud_rate,
        read_timeout_ms = config.read_timeout_ms,
        "Opening serial port"
    );

    let port = tokio_serial::new(config.port.as_str(), config.baud_rate)
        .timeout(config.read_timeout())
        .open_native_async()
        .map_err(|source| TransportError::Open {
            port: config.port.clone(),
            source,
        })?;

    info!("Serial port {} open at {} baud", config.port, config.baud_rate);
    Ok(StreamTransport::new(port, config.read_timeout()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
