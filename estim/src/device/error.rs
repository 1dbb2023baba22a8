/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error type for ET232 device operations.
//!
//! | Variant | Raised by | Retried? |
//! |---|---|---|
//! | `Transport` | any exchange | only inside the handshake loop |
//! | `Parse` | `read` | no |
//! | `InvalidSetting` | `write_setting` (nothing is sent) | no |
//! | `HandshakeFailed` | `handshake` | caller power-cycles and retries |

use thiserror::Error;

use crate::registers::{Register, Setting};
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum DeviceError {
    /// I/O failure or read timeout on the link.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A read response was not a hex byte.
    #[error("register {register}: response {response:?} is not a hex byte")]
    Parse { register: Register, response: String },

    /// The `(register, setting)` pair is not in the register map.
    #[error("setting {setting} is not valid for register {register}")]
    InvalidSetting { register: Register, setting: Setting },

    /// The power-on preamble never arrived.
    #[error(
        "failed to connect to the ET232: no power-on preamble after {attempts} read(s) \
         (power-cycle the device and retry)"
    )]
    HandshakeFailed { attempts: usize },
}
