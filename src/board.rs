//! Board bring-up
//!
//! A board describes which Denis devices exist and which SPI bus each one
//! sits on. Without a board file the stock board is used: a single
//! `/dev/denis0` on chip select 0 of bus 1.
//!
//! Board files are TOML:
//!
//! ```toml
//! busno = 1
//!
//! [[device]]
//! path = "/dev/denis0"
//! devid = 0
//!
//! [[device]]
//! path = "/dev/denis1"
//! devid = 1
//! frequency = "1 MHz"
//! mode = 0
//! instance_lock = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use denis_core::bus::{BusHandle, SpiMode};
use denis_core::{DenisConfig, DevFs, Registry};
use serde::Deserialize;
use thiserror::Error;

/// Path of the stock device node
pub const DENIS_PATH: &str = "/dev/denis0";

/// Bus the stock board wires the device to
pub const DEFAULT_BUSNO: u32 = 1;

/// Errors raised while bringing up a board
#[derive(Debug, Error)]
pub enum BoardError {
    /// Board file could not be read
    #[error("Failed to read board file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Board file is not valid TOML or has unknown fields
    #[error("Invalid board file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Board file is well formed but describes something impossible
    #[error("Invalid board description: {0}")]
    Invalid(String),

    /// Bus specification string is malformed
    #[error("Invalid bus specification: {0}")]
    BusSpec(String),

    /// Bus backend name is unknown or not compiled in
    #[error("Unknown bus backend: {0}")]
    UnknownBus(String),

    /// Backend could not provide the requested bus
    #[error("SPI bus {busno} is not available: {reason}")]
    BusUnavailable { busno: u32, reason: String },

    /// Driver registration failed
    #[error("Failed to register {path}: {source}")]
    Register {
        path: String,
        #[source]
        source: denis_core::Error,
    },
}

impl BoardError {
    /// errno-style code for reporting the failure
    pub fn errno(&self) -> i32 {
        use denis_core::error::errno;
        match self {
            BoardError::Read { .. } => errno::ENOENT,
            BoardError::BusUnavailable { .. } => errno::ENODEV,
            BoardError::Register { source, .. } => source.errno(),
            _ => errno::EINVAL,
        }
    }
}

/// Source of bus handles, indexed by bus number
///
/// Asking twice for the same bus number must return the same handle so
/// devices on one bus share its lock. Bus numbers that reach the same
/// hardware must share a handle too.
pub trait BusFactory {
    /// Obtain the handle for bus `busno`
    fn open_bus(&mut self, busno: u32) -> Result<BusHandle, BoardError>;
}

/// One `[[device]]` table of a board file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceEntry {
    /// Device node path
    pub path: String,
    /// Chip select on the bus
    #[serde(default)]
    pub devid: u32,
    /// Bus number, defaults to the board's `busno`
    pub busno: Option<u32>,
    /// Clock in Hz, or a string such as "5 MHz"
    #[serde(default, deserialize_with = "deserialize_frequency")]
    pub frequency: Option<u32>,
    /// SPI mode (0-3)
    pub mode: Option<u8>,
    /// Serialize writers on this instance
    #[serde(default)]
    pub instance_lock: bool,
}

impl DeviceEntry {
    /// Entry for the stock device
    pub fn stock() -> Self {
        Self {
            path: DENIS_PATH.to_string(),
            devid: 0,
            busno: None,
            frequency: None,
            mode: None,
            instance_lock: false,
        }
    }

    /// Driver configuration for this entry
    pub fn to_config(&self) -> Result<DenisConfig, BoardError> {
        let mut config = DenisConfig::new(self.devid).with_instance_lock(self.instance_lock);
        if let Some(hz) = self.frequency {
            if hz == 0 {
                return Err(BoardError::Invalid(format!(
                    "{}: frequency must be non-zero",
                    self.path
                )));
            }
            config = config.with_frequency(hz);
        }
        if let Some(raw) = self.mode {
            let mode = SpiMode::from_u8(raw).ok_or_else(|| {
                BoardError::Invalid(format!("{}: invalid SPI mode {} (must be 0-3)", self.path, raw))
            })?;
            config = config.with_mode(mode);
        }
        Ok(config)
    }
}

/// Parsed board description
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoardConfig {
    /// Default bus for devices that do not name one
    #[serde(default = "default_busno")]
    pub busno: u32,
    /// Devices to register, in registration order
    #[serde(rename = "device", default = "default_devices")]
    pub devices: Vec<DeviceEntry>,
}

fn default_busno() -> u32 {
    DEFAULT_BUSNO
}

fn default_devices() -> Vec<DeviceEntry> {
    vec![DeviceEntry::stock()]
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            busno: DEFAULT_BUSNO,
            devices: default_devices(),
        }
    }
}

impl BoardConfig {
    /// Load a board description from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BoardError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| BoardError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a board description from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, BoardError> {
        let board: BoardConfig = toml::from_str(content)?;
        if board.devices.is_empty() {
            return Err(BoardError::Invalid("no devices".to_string()));
        }
        Ok(board)
    }

    /// Same board with every device moved to `busno`
    pub fn with_busno(mut self, busno: u32) -> Self {
        self.busno = busno;
        for device in &mut self.devices {
            device.busno = None;
        }
        self
    }
}

/// Register the stock device on bus `busno`
///
/// Obtains the bus from `factory` and registers `/dev/denis0` with the
/// default configuration. A bus the factory cannot provide is reported as
/// `DeviceNotFound`.
pub fn initialize(
    fs: &mut DevFs,
    registry: &mut Registry,
    factory: &mut dyn BusFactory,
    busno: u32,
) -> denis_core::Result<()> {
    let bus = factory.open_bus(busno).map_err(|e| {
        log::error!("board: failed to initialize SPI bus {}: {}", busno, e);
        denis_core::Error::DeviceNotFound
    })?;

    registry.register(fs, DENIS_PATH, bus, DenisConfig::default())
}

/// Register every device a board describes
///
/// Stops at the first failure. Devices registered before the failure stay
/// registered.
pub fn bring_up(
    board: &BoardConfig,
    fs: &mut DevFs,
    registry: &mut Registry,
    factory: &mut dyn BusFactory,
) -> Result<(), BoardError> {
    for device in &board.devices {
        let busno = device.busno.unwrap_or(board.busno);
        let config = device.to_config()?;
        let bus = factory.open_bus(busno)?;

        log::debug!(
            "board: {} on bus {} chip select {}",
            device.path,
            busno,
            device.devid
        );
        registry
            .register(fs, &device.path, bus, config)
            .map_err(|source| BoardError::Register {
                path: device.path.clone(),
                source,
            })?;
    }
    Ok(())
}

/// Deserialize a frequency given in Hz or as a string with a unit
fn deserialize_frequency<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HzOrStr {
        Hz(u32),
        Str(String),
    }

    match Option::<HzOrStr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(HzOrStr::Hz(hz)) => Ok(Some(hz)),
        Some(HzOrStr::Str(s)) => parse_frequency(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Parse a frequency like "5 MHz", "500kHz" or "1000000"
pub fn parse_frequency(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Ok(hz) = s.parse::<u32>() {
        return Ok(hz);
    }

    let lower = s.to_lowercase();
    let (num, multiplier) = if let Some(n) = lower.strip_suffix("mhz") {
        (n.trim(), 1_000_000)
    } else if let Some(n) = lower.strip_suffix("khz") {
        (n.trim(), 1_000)
    } else if let Some(n) = lower.strip_suffix("hz") {
        (n.trim(), 1)
    } else {
        return Err(format!("invalid frequency: {}", s));
    };

    let value: u32 = num.parse().map_err(|_| format!("invalid frequency: {}", s))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("frequency out of range: {}", s))
}
