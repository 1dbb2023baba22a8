/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! ET232 register addresses and named register settings.
//!
//! ```text
//! Register(0xA3) ──┐
//!                  ├──► RegisterMap ──► raw byte (0x8A)
//! Setting::ModeIntense ┘
//! ```
//!
//! Settings are keyed by the *(register, setting)* pair, never by the setting
//! name alone: `ModeWaves` is `0x0B` under `Mode` but `0x8B` under
//! `ModeOverride`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

// ── Register ──────────────────────────────────────────────────────────────────

/// One addressable 8-bit ET232 memory cell.
///
/// The well-known cells are associated constants.  Any other address can be
/// built with [`Register::new`] for raw access; it simply has no name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register(u8);

impl Register {
    pub const PULSE_WIDTH_A: Register = Register(0x08);
    pub const FREQ_REC_A: Register = Register(0x09);
    pub const PULSE_AMP_A: Register = Register(0x0A);
    pub const POWER_COMP_A: Register = Register(0x0B);
    pub const PULSE_POLARITY_EN_A: Register = Register(0x0C);
    pub const PULSE_WIDTH_B: Register = Register(0x0E);
    pub const FREQ_REC_B: Register = Register(0x0F);
    pub const PULSE_AMP_B: Register = Register(0x10);
    pub const POWER_COMP_B: Register = Register(0x11);
    pub const PULSE_POLARITY_EN_B: Register = Register(0x12);
    /// Position of the B pot.
    pub const POT_B: Register = Register(0x88);
    /// Position of the MA pot.
    pub const POT_MA: Register = Register(0x89);
    pub const BATTERY_VOLTAGE: Register = Register(0x8A);
    pub const AUDIO_INPUT: Register = Register(0x8B);
    /// Position of the A pot.  Always readable, so it doubles as the liveness
    /// probe register.
    pub const POT_A: Register = Register(0x8C);
    /// Mode switch position.
    pub const MODE: Register = Register(0xA2);
    /// Mode switch override.  While set, the device ignores the physical
    /// switch and can only be turned off by removing power.
    pub const MODE_OVERRIDE: Register = Register(0xA3);
    /// Analog input (pot A / B / MA) override.
    pub const ANALOG_OVERRIDE: Register = Register(0xA4);
    pub const AUTO_POWER_OFF_TIMER: Register = Register(0xD3);
    pub const PROGRAM_FADE_IN_TIMER: Register = Register(0xD8);

    /// Every named register, in the order used by the `info` summary.
    pub const NAMED: [Register; 20] = [
        Register::PULSE_WIDTH_A,
        Register::FREQ_REC_A,
        Register::PULSE_AMP_A,
        Register::POWER_COMP_A,
        Register::PULSE_POLARITY_EN_A,
        Register::PULSE_WIDTH_B,
        Register::FREQ_REC_B,
        Register::PULSE_AMP_B,
        Register::POWER_COMP_B,
        Register::PULSE_POLARITY_EN_B,
        Register::POT_B,
        Register::POT_MA,
        Register::BATTERY_VOLTAGE,
        Register::AUDIO_INPUT,
        Register::POT_A,
        Register::MODE,
        Register::MODE_OVERRIDE,
        Register::ANALOG_OVERRIDE,
        Register::AUTO_POWER_OFF_TIMER,
        Register::PROGRAM_FADE_IN_TIMER,
    ];

    /// Wraps a raw address.
    pub const fn new(address: u8) -> Self {
        Register(address)
    }

    /// Raw 8-bit address sent on the wire.
    pub const fn address(self) -> u8 {
        self.0
    }

    /// Symbolic name, or `None` for an address outside the well-known table.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Register::PULSE_WIDTH_A => "PulseWidthA",
            Register::FREQ_REC_A => "FreqRecA",
            Register::PULSE_AMP_A => "PulseAmpA",
            Register::POWER_COMP_A => "PowerCompA",
            Register::PULSE_POLARITY_EN_A => "PulsePolarityEnA",
            Register::PULSE_WIDTH_B => "PulseWidthB",
            Register::FREQ_REC_B => "FreqRecB",
            Register::PULSE_AMP_B => "PulseAmpB",
            Register::POWER_COMP_B => "PowerCompB",
            Register::PULSE_POLARITY_EN_B => "PulsePolarityEnB",
            Register::POT_B => "PotB",
            Register::POT_MA => "PotMA",
            Register::BATTERY_VOLTAGE => "BatteryVoltage",
            Register::AUDIO_INPUT => "AudioInput",
            Register::POT_A => "PotA",
            Register::MODE => "Mode",
            Register::MODE_OVERRIDE => "ModeOverride",
            Register::ANALOG_OVERRIDE => "AnalogOverride",
            Register::AUTO_POWER_OFF_TIMER => "AutoPowerOffTimer",
            Register::PROGRAM_FADE_IN_TIMER => "ProgramFadeInTimer",
            _ => return None,
        };
        Some(name)
    }

    /// Looks up a well-known register by its symbolic name (case-sensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Register::NAMED
            .iter()
            .copied()
            .find(|r| r.name() == Some(name))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:02X}", self.0),
        }
    }
}

/// Failure to turn user input into a [`Register`] or [`Setting`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseNameError {
    #[error("unknown register '{0}' (expected a register name or an address such as 0x8C)")]
    Register(String),

    #[error("unknown setting '{0}'")]
    Setting(String),
}

impl FromStr for Register {
    type Err = ParseNameError;

    /// Accepts a register name (`PotA`), a hex address (`0x8C`) or a decimal
    /// address (`140`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(reg) = Register::from_name(s) {
            return Ok(reg);
        }
        parse_u8(s)
            .map(Register)
            .ok_or_else(|| ParseNameError::Register(s.to_string()))
    }
}

/// Parses `0x`-prefixed hex or plain decimal into a byte.
pub fn parse_u8(s: &str) -> Option<u8> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

// ── Setting ───────────────────────────────────────────────────────────────────

/// Symbolic value for registers that only take discrete values.
///
/// The `Mode*` settings apply to both `Mode` and `ModeOverride`;
/// `OverrideOff` applies to `ModeOverride` and `AnalogOverride`;
/// `OverrideAll` applies to `AnalogOverride`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Setting {
    ModeWaves,
    ModeIntense,
    ModeRandom,
    ModeAudioSoft,
    ModeAudioLoud,
    ModeAudioWaves,
    ModeUser,
    ModeHiFreq,
    ModeClimb,
    ModeThrob,
    ModeCombo,
    ModeThrust,
    ModeThump,
    ModeRamp,
    ModeStroke,
    ModeOff,
    OverrideAll,
    OverrideOff,
}

impl Setting {
    pub const ALL: [Setting; 18] = [
        Setting::ModeWaves,
        Setting::ModeIntense,
        Setting::ModeRandom,
        Setting::ModeAudioSoft,
        Setting::ModeAudioLoud,
        Setting::ModeAudioWaves,
        Setting::ModeUser,
        Setting::ModeHiFreq,
        Setting::ModeClimb,
        Setting::ModeThrob,
        Setting::ModeCombo,
        Setting::ModeThrust,
        Setting::ModeThump,
        Setting::ModeRamp,
        Setting::ModeStroke,
        Setting::ModeOff,
        Setting::OverrideAll,
        Setting::OverrideOff,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Setting::ModeWaves => "ModeWaves",
            Setting::ModeIntense => "ModeIntense",
            Setting::ModeRandom => "ModeRandom",
            Setting::ModeAudioSoft => "ModeAudioSoft",
            Setting::ModeAudioLoud => "ModeAudioLoud",
            Setting::ModeAudioWaves => "ModeAudioWaves",
            Setting::ModeUser => "ModeUser",
            Setting::ModeHiFreq => "ModeHiFreq",
            Setting::ModeClimb => "ModeClimb",
            Setting::ModeThrob => "ModeThrob",
            Setting::ModeCombo => "ModeCombo",
            Setting::ModeThrust => "ModeThrust",
            Setting::ModeThump => "ModeThump",
            Setting::ModeRamp => "ModeRamp",
            Setting::ModeStroke => "ModeStroke",
            Setting::ModeOff => "ModeOff",
            Setting::OverrideAll => "OverrideAll",
            Setting::OverrideOff => "OverrideOff",
        }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Setting {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Setting::ALL
            .iter()
            .copied()
            .find(|setting| setting.name() == s)
            .ok_or_else(|| ParseNameError::Setting(s.to_string()))
    }
}

// ── RegisterMap ───────────────────────────────────────────────────────────────

/// Immutable `(Register, Setting) → raw byte` table.
///
/// Built once at start-up (either [`RegisterMap::builtin`] or from the
/// configuration file) and shared behind an `Arc`.  `BTreeMap` keeps reverse
/// lookups deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterMap {
    settings: BTreeMap<(Register, Setting), u8>,
}

impl RegisterMap {
    /// Builds a map from explicit entries.  A repeated pair keeps the last
    /// value.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Register, Setting, u8)>,
    {
        let settings = entries
            .into_iter()
            .map(|(reg, setting, raw)| ((reg, setting), raw))
            .collect();
        Self { settings }
    }

    /// The default settings table shipped with the crate.
    ///
    /// `AnalogOverride` uses `0x8D` / `0x8F`.  Older firmware notes list
    /// `0x1F` for `OverrideAll`; override it in the configuration file if
    /// the device disagrees.
    pub fn builtin() -> Self {
        use Setting::*;

        const MODES: [(Setting, u8); 16] = [
            (ModeWaves, 0x0B),
            (ModeIntense, 0x0A),
            (ModeRandom, 0x0E),
            (ModeAudioSoft, 0x06),
            (ModeAudioLoud, 0x02),
            (ModeAudioWaves, 0x03),
            (ModeUser, 0x07),
            (ModeHiFreq, 0x05),
            (ModeClimb, 0x01),
            (ModeThrob, 0x00),
            (ModeCombo, 0x04),
            (ModeThrust, 0x0C),
            (ModeThump, 0x08),
            (ModeRamp, 0x09),
            (ModeStroke, 0x0D),
            (ModeOff, 0x0F),
        ];

        // ModeOverride takes the same mode codes with the high bit set.
        let mode = MODES.iter().map(|&(s, raw)| (Register::MODE, s, raw));
        let mode_override = MODES
            .iter()
            .map(|&(s, raw)| (Register::MODE_OVERRIDE, s, raw | 0x80));

        Self::from_entries(
            mode.chain(mode_override).chain([
                (Register::MODE_OVERRIDE, OverrideOff, 0x00),
                (Register::ANALOG_OVERRIDE, OverrideAll, 0x8D),
                (Register::ANALOG_OVERRIDE, OverrideOff, 0x8F),
            ]),
        )
    }

    /// Raw byte for `setting` under `register`, if the pair is defined.
    pub fn resolve_setting(&self, register: Register, setting: Setting) -> Option<u8> {
        self.settings.get(&(register, setting)).copied()
    }

    /// Reverse lookup used for human-readable summaries.
    pub fn name_setting(&self, register: Register, raw: u8) -> Option<Setting> {
        self.settings_for(register)
            .find(|&(_, value)| value == raw)
            .map(|(setting, _)| setting)
    }

    /// All settings defined for `register`, ordered by setting.
    pub fn settings_for(&self, register: Register) -> impl Iterator<Item = (Setting, u8)> + '_ {
        self.settings
            .range((register, Setting::ModeWaves)..=(register, Setting::OverrideOff))
            .map(|(&(_, setting), &raw)| (setting, raw))
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self::builtin()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
