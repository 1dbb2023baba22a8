/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! estim – ET232 serial control core
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── config/      – YAML link + register settings configuration
//! ├── registers    – register addresses, named settings, RegisterMap
//! ├── transport    – Transport trait, tokio stream / serial port link
//! ├── device/      – Et232 command protocol, framing, handshake
//! └── knob/        – Knob trait, RegisterKnob, KnobQueue scheduler
//! ```
//!
//! Typical use:
//!
//! ```rust,ignore
//! let config = Config::load_from_file(path)?;
//! let device = Arc::new(Et232::open(&config)?);
//! device.handshake_if_needed().await?;
//!
//! let pot_a = KnobQueue::new(Arc::new(device.new_knob(Register::POT_A)));
//! pot_a.ramp(0.2, 0.4, Duration::from_secs(3));
//! pot_a.wait_done().await;
//! ```

pub mod config;
pub mod device;
pub mod knob;
pub mod registers;
pub mod transport;

pub use config::{Config, LinkConfig};
pub use device::{DeviceError, Et232};
pub use knob::{Knob, KnobQueue, RegisterKnob};
pub use registers::{Register, RegisterMap, Setting};
pub use transport::{StreamTransport, Transport, TransportError};
