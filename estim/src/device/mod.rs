/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! ET232 command protocol.
//!
//! [`Et232`] owns the link to the device.  Every request/response exchange
//! holds the link lock for the full round trip, so any number of callers
//! (direct register access, several [`RegisterKnob`]s, several knob queues)
//! can share one `Arc<Et232>` without interleaving frames on the wire.
//! Cancelling a `read`/`write` future does not cut its exchange short, so
//! the next caller never picks up a stale response.
//!
//! # Start-up
//! After power-on the device emits a three byte preamble (`00 43 43`) and
//! only then starts accepting commands.  [`Et232::handshake`] waits for it;
//! the device must be power-cycled while the handshake is running.
//! [`Et232::handshake_if_needed`] skips the wait when the device already
//! answers.
//!
//! # Example
//! ```rust,ignore
//! let device = Arc::new(Et232::open(&config)?);
//! device.handshake_if_needed().await?;
//! device.write_setting(Register::MODE_OVERRIDE, Setting::ModeIntense).await?;
//! device.write(Register::POT_A, 80).await?;
//! ```

pub mod error;
pub mod frame;

pub use error::DeviceError;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, trace};

use crate::config::Config;
use crate::knob::RegisterKnob;
use crate::registers::{Register, RegisterMap, Setting};
use crate::transport::{self, Transport, TransportError};

use frame::{encode_request, parse_read_response, READ_OPCODE, WRITE_OPCODE};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Bytes the device sends once after power-on.
pub const PREAMBLE: &[u8] = b"\0CC";

/// Line reads attempted by [`Et232::handshake`] before giving up.  With the
/// default 1 s read timeout this is roughly 100 s to power-cycle the device.
pub const HANDSHAKE_ATTEMPTS: usize = 100;

/// Register read by [`Et232::handshake_if_needed`] to probe for a live
/// device.  Reading a pot position has no side effects.
pub const PROBE_REGISTER: Register = Register::POT_A;

// ── Et232 ─────────────────────────────────────────────────────────────────────

/// A connected ET232.
pub struct Et232 {
    link: Arc<Mutex<Box<dyn Transport>>>,
    registers: Arc<RegisterMap>,
}

impl Et232 {
    /// Wraps an already-open transport.
    pub fn new(transport: impl Transport + 'static, registers: Arc<RegisterMap>) -> Self {
        Self {
            link: Arc::new(Mutex::new(Box::new(transport))),
            registers,
        }
    }

    /// Opens the serial port named in `config.link`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: &Config) -> Result<Self, DeviceError> {
        let transport = transport::open_serial(&config.link)?;
        Ok(Self::new(transport, Arc::clone(&config.registers)))
    }

    /// The settings table used by [`write_setting`](Self::write_setting).
    pub fn registers(&self) -> &RegisterMap {
        &self.registers
    }

    // ── Raw exchange ──────────────────────────────────────────────────────────

    /// Sends one request and returns the response line.
    ///
    /// The exchange runs on its own task that owns the link guard, so it
    /// always reads its response before the link is released.  Dropping the
    /// returned future only discards the result.
    async fn command(&self, opcode: u8, args: &[u8]) -> Result<Vec<u8>, TransportError> {
        let request = encode_request(opcode, args);
        let mut link = Arc::clone(&self.link).lock_owned().await;

        let exchange = tokio::spawn(async move {
            trace!("Sending command: {:02X?}", request);
            link.write_all(&request).await?;
            let response = link.read_line().await?;
            trace!("Received response: {:02X?}", response);
            Ok::<_, TransportError>(response)
        });

        match exchange.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            // runtime shutting down
            Err(_) => Err(TransportError::Closed),
        }
    }

    // ── Register access ───────────────────────────────────────────────────────

    /// Reads the current value of `register`.
    pub async fn read(&self, register: Register) -> Result<u8, DeviceError> {
        let response = self.command(READ_OPCODE, &[register.address()]).await?;
        parse_read_response(&response).ok_or_else(|| DeviceError::Parse {
            register,
            response: String::from_utf8_lossy(&response).into_owned(),
        })
    }

    /// Writes `value` to `register`.  Any response line counts as success.
    pub async fn write(&self, register: Register, value: u8) -> Result<(), DeviceError> {
        debug!("Writing 0x{value:02X} to {register}");
        self.command(WRITE_OPCODE, &[register.address(), value])
            .await?;
        Ok(())
    }

    /// Writes the raw byte that `setting` maps to under `register`.
    ///
    /// # Errors
    /// [`DeviceError::InvalidSetting`] if the pair is not in the register map;
    /// nothing is sent in that case.
    pub async fn write_setting(
        &self,
        register: Register,
        setting: Setting,
    ) -> Result<(), DeviceError> {
        let raw = self
            .registers
            .resolve_setting(register, setting)
            .ok_or(DeviceError::InvalidSetting { register, setting })?;
        debug!("{register} ← {setting}");
        self.write(register, raw).await
    }

    // ── Connection bring-up ───────────────────────────────────────────────────

    /// Waits for the power-on preamble.
    ///
    /// Holds the link for the whole wait.  Read errors and timeouts count as
    /// "no preamble yet"; a timed-out read whose partial bytes equal the
    /// preamble is a match, since the device does not newline-terminate it.
    ///
    /// # Errors
    /// [`DeviceError::HandshakeFailed`] after [`HANDSHAKE_ATTEMPTS`] reads.
    pub async fn handshake(&self) -> Result<(), DeviceError> {
        let mut link = self.link.lock().await;
        info!("Attempting serial handshake, power-cycle the device now");

        for attempt in 1..=HANDSHAKE_ATTEMPTS {
            let seen = match link.read_line().await {
                Ok(line) => line,
                Err(TransportError::Timeout { partial }) => partial,
                Err(e) => {
                    trace!(attempt, "Handshake read failed: {e}");
                    continue;
                }
            };
            if seen == PREAMBLE {
                info!("Handshake complete after {attempt} read(s)");
                return Ok(());
            }
            trace!(attempt, "No preamble yet: {:02X?}", seen);
        }

        Err(DeviceError::HandshakeFailed {
            attempts: HANDSHAKE_ATTEMPTS,
        })
    }

    /// Probes the device with one read and only runs
    /// [`handshake`](Self::handshake) if the probe fails.
    pub async fn handshake_if_needed(&self) -> Result<(), DeviceError> {
        match self.read(PROBE_REGISTER).await {
            Ok(_) => {
                debug!("Device already accepting commands, skipping handshake");
                Ok(())
            }
            Err(e) => {
                debug!("Probe read failed ({e}), falling back to handshake");
                self.handshake().await
            }
        }
    }

    // ── Knobs & summaries ─────────────────────────────────────────────────────

    /// A `[0, 1]` knob over `register`, sharing this link.
    pub fn new_knob(self: &Arc<Self>, register: Register) -> RegisterKnob {
        RegisterKnob::new(Arc::clone(self), register)
    }

    /// Reads every named register and renders one `Name: value` line each.
    ///
    /// Values that map back to a setting of that register are shown by
    /// setting name, everything else as `0xNN`.
    pub async fn info(&self) -> Result<String, DeviceError> {
        let mut lines = Vec::with_capacity(Register::NAMED.len());
        for register in Register::NAMED {
            let value = self.read(register).await?;
            let line = match self.registers.name_setting(register, value) {
                Some(setting) => format!("{register}: {setting}"),
                None => format!("{register}: 0x{value:02X}"),
            };
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
