//! Device configuration

use crate::bus::SpiMode;

/// SPI clock used by the Denis peripheral (5 MHz)
pub const DENIS_SPI_FREQUENCY: u32 = 5_000_000;

/// SPI mode used by the Denis peripheral (CPOL=1, CPHA=1)
pub const DENIS_SPI_MODE: SpiMode = SpiMode::Mode3;

/// Configuration of one Denis device on a shared bus
///
/// Several devices can share a bus; `spi_devid` is the chip select id the
/// bus uses to pick one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenisConfig {
    /// Chip select / device id on the bus
    pub spi_devid: u32,
    /// Bus clock applied at registration
    pub frequency: u32,
    /// Bus mode applied at registration
    pub mode: SpiMode,
    /// Serialize writers on this instance with a per-instance lock
    pub instance_lock: bool,
}

impl Default for DenisConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DenisConfig {
    /// Configuration for `spi_devid` with the Denis bus settings
    pub const fn new(spi_devid: u32) -> Self {
        Self {
            spi_devid,
            frequency: DENIS_SPI_FREQUENCY,
            mode: DENIS_SPI_MODE,
            instance_lock: false,
        }
    }

    /// Override the bus clock
    pub fn with_frequency(mut self, hz: u32) -> Self {
        self.frequency = hz;
        self
    }

    /// Override the bus mode
    pub fn with_mode(mut self, mode: SpiMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable the per-instance lock
    pub fn with_instance_lock(mut self, enabled: bool) -> Self {
        self.instance_lock = enabled;
        self
    }
}
