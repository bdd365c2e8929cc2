//! Error types for denis-core
//!
//! This module provides a no_std compatible error type shared by the bus
//! transport, the pseudo filesystem and the driver instances.

use core::fmt;

/// NuttX-style errno values reported by [`Error::errno`]
pub mod errno {
    /// No such file or directory
    pub const ENOENT: i32 = 2;
    /// Interrupted system call
    pub const EINTR: i32 = 4;
    /// I/O error
    pub const EIO: i32 = 5;
    /// Bad file number
    pub const EBADF: i32 = 9;
    /// Out of memory
    pub const ENOMEM: i32 = 12;
    /// Permission denied
    pub const EACCES: i32 = 13;
    /// Device or resource busy
    pub const EBUSY: i32 = 16;
    /// File exists
    pub const EEXIST: i32 = 17;
    /// No such device
    pub const ENODEV: i32 = 19;
    /// Invalid argument
    pub const EINVAL: i32 = 22;
    /// Function not implemented
    pub const ENOSYS: i32 = 38;
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Registration errors
    /// Allocation of a new driver instance failed
    OutOfMemory,
    /// A driver is already registered under this path
    AlreadyExists,
    /// The mount path is empty or not absolute
    InvalidPath,
    /// Another instance on the same bus already uses this chip select
    ChipSelectInUse,

    // File errors
    /// No driver is registered under this path
    NotFound,
    /// The requested access is not allowed by the registered mode
    PermissionDenied,
    /// The file was not opened for this kind of access, or is closed
    BadDescriptor,
    /// The operation is not supported by the device
    NotSupported,

    // Synchronization errors
    /// Waiting for the instance lock was interrupted
    Interrupted,

    // Bus errors
    /// No bus could be obtained for the requested index
    DeviceNotFound,
    /// Acquiring or releasing the bus lock failed
    BusLockFailed,
    /// Asserting or deasserting chip select failed
    SelectFailed,
    /// The block transfer failed
    TransferFailed,
    /// Setting the bus frequency or mode failed
    BusConfigFailed,
}

impl Error {
    /// Positive errno equivalent, for callers that speak POSIX
    pub const fn errno(&self) -> i32 {
        match self {
            Self::OutOfMemory => errno::ENOMEM,
            Self::AlreadyExists => errno::EEXIST,
            Self::InvalidPath => errno::EINVAL,
            Self::ChipSelectInUse => errno::EBUSY,
            Self::NotFound => errno::ENOENT,
            Self::PermissionDenied => errno::EACCES,
            Self::BadDescriptor => errno::EBADF,
            Self::NotSupported => errno::ENOSYS,
            Self::Interrupted => errno::EINTR,
            Self::DeviceNotFound => errno::ENODEV,
            Self::BusLockFailed
            | Self::SelectFailed
            | Self::TransferFailed
            | Self::BusConfigFailed => errno::EIO,
        }
    }

    /// Returns true for failures reported by the bus transport
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::BusLockFailed | Self::SelectFailed | Self::TransferFailed | Self::BusConfigFailed
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "failed to allocate driver instance"),
            Self::AlreadyExists => write!(f, "a driver is already registered at this path"),
            Self::InvalidPath => write!(f, "invalid mount path"),
            Self::ChipSelectInUse => write!(f, "chip select already in use on this bus"),
            Self::NotFound => write!(f, "no such device"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::BadDescriptor => write!(f, "bad file descriptor"),
            Self::NotSupported => write!(f, "operation not supported"),
            Self::Interrupted => write!(f, "interrupted while waiting for lock"),
            Self::DeviceNotFound => write!(f, "SPI bus not found"),
            Self::BusLockFailed => write!(f, "failed to lock SPI bus"),
            Self::SelectFailed => write!(f, "failed to drive chip select"),
            Self::TransferFailed => write!(f, "SPI transfer failed"),
            Self::BusConfigFailed => write!(f, "failed to configure SPI bus"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        use embedded_io::ErrorKind;

        match self {
            Self::OutOfMemory => ErrorKind::OutOfMemory,
            Self::AlreadyExists => ErrorKind::AlreadyExists,
            Self::InvalidPath => ErrorKind::InvalidInput,
            Self::NotFound | Self::DeviceNotFound => ErrorKind::NotFound,
            Self::PermissionDenied | Self::BadDescriptor => ErrorKind::PermissionDenied,
            Self::NotSupported => ErrorKind::Unsupported,
            Self::Interrupted => ErrorKind::Interrupted,
            Self::ChipSelectInUse => ErrorKind::AddrInUse,
            Self::BusLockFailed
            | Self::SelectFailed
            | Self::TransferFailed
            | Self::BusConfigFailed => ErrorKind::Other,
        }
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
