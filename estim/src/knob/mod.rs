/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Normalized `[0.0, 1.0]` controls.
//!
//! A [`Knob`] is anything that can be driven to a continuous value with a
//! fixed step size.  [`RegisterKnob`] maps the value onto one 8-bit device
//! register; the [`queue`] module schedules timed sequences against any knob.

pub mod queue;

pub use queue::KnobQueue;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::device::{DeviceError, Et232};
use crate::registers::Register;

/// Smallest step an 8-bit register can represent.
pub const REGISTER_RESOLUTION: f64 = 1.0 / u8::MAX as f64;

/// A continuous control value backed by some device.
#[async_trait]
pub trait Knob: Send + Sync {
    /// Drives the control to `value`.  Values outside `[0, 1]` are clamped.
    async fn set(&self, value: f64) -> Result<(), DeviceError>;

    /// Smallest representable change in value.
    fn resolution(&self) -> f64;
}

/// Clamps `value` to `[0, 1]` and scales it onto `0..=255`, truncating toward
/// zero.  NaN maps to `0`.
pub fn to_register_value(value: f64) -> u8 {
    (value.clamp(0.0, 1.0) * f64::from(u8::MAX)) as u8
}

// ── RegisterKnob ──────────────────────────────────────────────────────────────

/// Knob over a single ET232 register.  Each [`set`](Knob::set) is one device
/// write, serialized with all other traffic on the shared link.
#[derive(Clone)]
pub struct RegisterKnob {
    device: Arc<Et232>,
    register: Register,
}

impl RegisterKnob {
    pub fn new(device: Arc<Et232>, register: Register) -> Self {
        Self { device, register }
    }

    pub fn register(&self) -> Register {
        self.register
    }
}

impl std::fmt::Debug for RegisterKnob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterKnob")
            .field("register", &self.register)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Knob for RegisterKnob {
    async fn set(&self, value: f64) -> Result<(), DeviceError> {
        debug!("Setting {} to {value}", self.register);
        self.device
            .write(self.register, to_register_value(value))
            .await
    }

    fn resolution(&self) -> f64 {
        REGISTER_RESOLUTION
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
