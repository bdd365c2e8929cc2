//! Bus transport trait definitions

use crate::error::Result;

/// SPI clock polarity and phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    #[default]
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl SpiMode {
    /// Build a mode from its numeric form (0-3)
    pub const fn from_u8(mode: u8) -> Option<Self> {
        match mode {
            0 => Some(Self::Mode0),
            1 => Some(Self::Mode1),
            2 => Some(Self::Mode2),
            3 => Some(Self::Mode3),
            _ => None,
        }
    }

    /// Numeric form of the mode, as used by spidev and NuttX
    pub const fn as_u8(&self) -> u8 {
        match self {
            Self::Mode0 => 0,
            Self::Mode1 => 1,
            Self::Mode2 => 2,
            Self::Mode3 => 3,
        }
    }

    /// Clock polarity: idle level of SCK
    pub const fn cpol(&self) -> bool {
        matches!(self, Self::Mode2 | Self::Mode3)
    }

    /// Clock phase: sample on the trailing edge
    pub const fn cpha(&self) -> bool {
        matches!(self, Self::Mode1 | Self::Mode3)
    }
}

impl core::fmt::Display for SpiMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "mode {}", self.as_u8())
    }
}

/// Shared SPI bus transport
///
/// One implementation exists per physical bus, and every driver instance
/// on that bus holds a reference to it. All methods take `&self`: the bus
/// is shared, and implementations keep their mutable state behind the
/// bus lock or their own interior mutability.
///
/// All calls are synchronous and block the calling task until the
/// hardware operation completes.
///
/// Callers must hold the bus lock (`lock(true)`) around every
/// `select`/`send_block` sequence. Use [`BusLock`](super::BusLock) and
/// [`ChipSelect`](super::ChipSelect) rather than calling these directly so
/// the release side runs on every exit path.
pub trait SpiBus: Send + Sync {
    /// Acquire (`true`) or release (`false`) exclusive access to the bus
    ///
    /// Acquiring blocks until the bus is free. There is no timeout.
    fn lock(&self, lock: bool) -> Result<()>;

    /// Assert (`true`) or deassert (`false`) chip select for `devid`
    fn select(&self, devid: u32, selected: bool) -> Result<()>;

    /// Send a block of bytes to the selected device
    ///
    /// Either the whole block is transferred or an error is returned;
    /// there is no partial completion.
    fn send_block(&self, data: &[u8]) -> Result<()>;

    /// Set the SPI clock frequency, returning the frequency actually used
    fn set_frequency(&self, hz: u32) -> Result<u32>;

    /// Set the SPI clock polarity and phase
    fn set_mode(&self, mode: SpiMode) -> Result<()>;
}

#[cfg(feature = "alloc")]
mod handle {
    use super::SpiBus;
    use alloc::sync::Arc;

    /// Reference-counted handle to a shared bus
    pub type BusHandle = Arc<dyn SpiBus>;

    /// Returns true if both handles refer to the same physical bus
    pub fn same_bus(a: &BusHandle, b: &BusHandle) -> bool {
        // Compare data pointers only, vtable pointers are not unique.
        core::ptr::eq(
            Arc::as_ptr(a) as *const (),
            Arc::as_ptr(b) as *const (),
        )
    }
}

#[cfg(feature = "alloc")]
pub use handle::{same_bus, BusHandle};
