//! denis-core - Write-only SPI character driver
//!
//! This crate provides the Denis driver: a character device that forwards
//! every buffer written to it to a peripheral on a shared SPI bus. It is
//! designed to be `no_std` compatible so it can run inside an RTOS.
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`)
//! - `alloc` - Enable the registry, the pseudo filesystem and the driver
//!
//! # Example
//!
//! ```ignore
//! use denis_core::{DenisConfig, DevFs, OpenFlags, Registry};
//!
//! fn bring_up(bus: denis_core::bus::BusHandle) -> denis_core::Result<()> {
//!     let mut fs = DevFs::new();
//!     let mut registry = Registry::new();
//!     registry.register(&mut fs, "/dev/denis0", bus, DenisConfig::new(0))?;
//!
//!     let file = fs.open("/dev/denis0", OpenFlags::WRONLY)?;
//!     let written = file.write(b"Hello, Denis!!\n")?;
//!     assert_eq!(written, 15);
//!     Ok(())
//! }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod bus;
pub mod config;
#[cfg(feature = "alloc")]
pub mod devfs;
#[cfg(feature = "alloc")]
pub mod driver;
pub mod error;
pub mod hexdump;
#[cfg(feature = "alloc")]
pub mod registry;
pub mod sync;

#[cfg(all(test, feature = "alloc"))]
mod mock;

pub use config::{DenisConfig, DENIS_SPI_FREQUENCY, DENIS_SPI_MODE};
#[cfg(feature = "alloc")]
pub use devfs::{DevFs, File, FileOperations, OpenFlags};
#[cfg(feature = "alloc")]
pub use driver::{DenisDevice, TransferStats};
pub use error::{Error, Result};
pub use hexdump::HexDump;
#[cfg(feature = "alloc")]
pub use registry::Registry;
