//! denis-linux-spi - Linux spidev bus backend
//!
//! This crate lets the Denis driver run on a Linux host by mapping the
//! transport contract onto the `/dev/spidevB.C` device interface, where B
//! is the controller number and C the chip select.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use denis_core::{DenisConfig, DevFs, Registry};
//! use denis_linux_spi::{LinuxSpiBus, LinuxSpiConfig};
//!
//! let bus = Arc::new(LinuxSpiBus::open(LinuxSpiConfig::new(1))?);
//! let mut fs = DevFs::new();
//! let mut registry = Registry::new();
//! registry.register(&mut fs, "/dev/denis0", bus, DenisConfig::new(0))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with the denis CLI
//!
//! ```bash
//! denis --bus linux_spi:bus=1 write "Hello, Denis!!"
//!
//! # Cap the clock at 1 MHz
//! denis --bus linux_spi:bus=1,spispeed=1000 test-task
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with spidev support enabled (`CONFIG_SPI_SPIDEV`)
//! - Read/write access to the `/dev/spidevB.C` nodes

pub mod bus;
pub mod error;

pub use bus::{parse_options, LinuxSpiBus, LinuxSpiConfig};
pub use error::{LinuxSpiError, Result};

/// Open a spidev controller from CLI options
///
/// # Example Options
///
/// - `bus=1` - Controller number (default: 0)
/// - `spispeed=1000` - Clock cap in kHz
/// - `dir=/dev` - Directory containing the spidev nodes
pub fn open_linux_spi(options: &[(&str, &str)]) -> Result<LinuxSpiBus> {
    let config = parse_options(options).map_err(LinuxSpiError::InvalidParameter)?;
    LinuxSpiBus::open(config)
}
