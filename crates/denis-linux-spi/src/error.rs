//! Error types for the spidev bus

use denis_core::Error as CoreError;
use thiserror::Error;

/// Linux spidev specific errors
#[derive(Debug, Error)]
pub enum LinuxSpiError {
    /// No spidev node exists for the bus
    #[error("No spidev device found for bus {bus} in {dir}")]
    NoSuchBus { bus: u32, dir: String },

    /// Failed to open device
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set SPI mode
    #[error("Failed to set SPI mode to {mode}: {source}")]
    SetModeFailed {
        mode: u8,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set bits per word
    #[error("Failed to set bits per word to {bits}: {source}")]
    SetBitsPerWordFailed {
        bits: u8,
        #[source]
        source: std::io::Error,
    },

    /// Failed to set clock speed
    #[error("Failed to set clock speed to {speed} Hz: {source}")]
    SetSpeedFailed {
        speed: u32,
        #[source]
        source: std::io::Error,
    },

    /// Block does not fit in one kernel message
    #[error("Block of {len} bytes exceeds the spidev buffer size of {max} bytes")]
    BlockTooLarge { len: usize, max: usize },

    /// Send without a selected device
    #[error("No device selected")]
    NotSelected,

    /// SPI transfer failed
    #[error("SPI transfer failed: {0}")]
    TransferFailed(#[source] std::io::Error),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl LinuxSpiError {
    /// Collapse into the driver's error kind
    pub fn to_core(&self) -> CoreError {
        match self {
            LinuxSpiError::NoSuchBus { .. } => CoreError::DeviceNotFound,
            LinuxSpiError::OpenFailed { .. } => CoreError::SelectFailed,
            LinuxSpiError::SetModeFailed { .. }
            | LinuxSpiError::SetBitsPerWordFailed { .. }
            | LinuxSpiError::SetSpeedFailed { .. }
            | LinuxSpiError::InvalidParameter(_) => CoreError::BusConfigFailed,
            LinuxSpiError::BlockTooLarge { .. }
            | LinuxSpiError::NotSelected
            | LinuxSpiError::TransferFailed(_) => CoreError::TransferFailed,
        }
    }
}

impl From<LinuxSpiError> for CoreError {
    fn from(e: LinuxSpiError) -> Self {
        log::error!("linux_spi: {}", e);
        e.to_core()
    }
}

/// Result type for Linux SPI operations
pub type Result<T> = std::result::Result<T, LinuxSpiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_mapping() {
        let missing = LinuxSpiError::NoSuchBus {
            bus: 1,
            dir: "/dev".into(),
        };
        assert_eq!(missing.to_core(), CoreError::DeviceNotFound);
        assert_eq!(
            CoreError::from(LinuxSpiError::NotSelected),
            CoreError::TransferFailed
        );
        assert_eq!(
            LinuxSpiError::InvalidParameter("x".into()).to_core(),
            CoreError::BusConfigFailed
        );
    }

    #[test]
    fn test_display() {
        let e = LinuxSpiError::BlockTooLarge { len: 8192, max: 4096 };
        assert_eq!(
            e.to_string(),
            "Block of 8192 bytes exceeds the spidev buffer size of 4096 bytes"
        );
    }
}
