//! Denis character driver
//!
//! [`DenisDevice`] implements [`FileOperations`](crate::devfs::FileOperations)
//! on top of a shared [`SpiBus`](crate::bus::SpiBus).

mod device;
pub mod transfer;

pub use device::{DenisDevice, TransferStats};
