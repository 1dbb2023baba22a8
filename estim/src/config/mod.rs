//! Link and register-settings configuration.
//!
//! The expected YAML structure is:
//! ```yaml
//! link:
//!   port: /dev/ttyUSB0
//!   baud_rate: 19200
//!   read_timeout_ms: 1000
//! settings:
//!   Mode:
//!     ModeWaves: 0x0B
//!     ModeIntense: 0x0A
//!   AnalogOverride:
//!     OverrideAll: 0x8D
//!     OverrideOff: 0x8F
//! ```
//!
//! Both sections are optional.  A `settings` section, when present, *replaces*
//! the built-in table: it is the single source of truth for raw setting
//! values.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::registers::{Register, RegisterMap, Setting};

// ── Defaults ──────────────────────────────────────────────────────────────────

pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// The ET232 serial interface runs at a fixed 19200 baud.
pub const DEFAULT_BAUD_RATE: u32 = 19_200;

pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1_000;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    link: LinkEntry,
    /// register name → setting name → raw byte
    settings: Option<BTreeMap<String, BTreeMap<String, u8>>>,
}

#[derive(Debug, Default, Deserialize)]
struct LinkEntry {
    port: Option<String>,
    baud_rate: Option<u32>,
    read_timeout_ms: Option<u64>,
}

// ── Public data structures ────────────────────────────────────────────────────

/// Serial link parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Upper bound on a single line read.  Also paces the handshake loop.
    pub read_timeout_ms: u64,
}

impl LinkConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

/// Fully resolved configuration: link parameters plus the settings table.
#[derive(Debug, Clone)]
pub struct Config {
    pub link: LinkConfig,
    pub registers: Arc<RegisterMap>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            registers: Arc::new(RegisterMap::builtin()),
        }
    }
}

impl Config {
    /// Reads and parses `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, the YAML is
    /// structurally invalid, or the settings table names an unknown register
    /// or setting.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))
    }

    /// Parses configuration from an in-memory YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(content).context("Failed to parse YAML")?;

        let defaults = LinkConfig::default();
        let link = LinkConfig {
            port: file.link.port.unwrap_or(defaults.port),
            baud_rate: file.link.baud_rate.unwrap_or(defaults.baud_rate),
            read_timeout_ms: file.link.read_timeout_ms.unwrap_or(defaults.read_timeout_ms),
        };
        debug!(
            "  Link: {} | {} baud | read timeout {}ms",
            link.port, link.baud_rate, link.read_timeout_ms
        );

        let registers = match file.settings {
            Some(table) => {
                let map = settings_table_to_map(&table)?;
                info!("Loaded {} register setting(s) from file", map.len());
                map
            }
            None => {
                debug!("No settings table in file, using built-in register settings");
                RegisterMap::builtin()
            }
        };

        Ok(Self {
            link,
            registers: Arc::new(registers),
        })
    }
}

fn settings_table_to_map(table: &BTreeMap<String, BTreeMap<String, u8>>) -> Result<RegisterMap> {
    let mut entries = Vec::new();
    for (reg_name, settings) in table {
        let register: Register = reg_name
            .parse()
            .with_context(|| format!("settings table: bad register '{reg_name}'"))?;
        for (setting_name, &raw) in settings {
            let setting: Setting = setting_name.parse().with_context(|| {
                format!("settings table: bad setting '{setting_name}' for {register}")
            })?;
            debug!("    {register}/{setting} = 0x{raw:02X}");
            entries.push((register, setting, raw));
        }
    }
    Ok(RegisterMap::from_entries(entries))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
