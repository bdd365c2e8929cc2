//! Denis driver instance
//!
//! The Denis device is a write-only sink: every `write` is forwarded to the
//! bus as one bracketed transaction, `read` is permanently unsupported.

use alloc::boxed::Box;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::bus::BusHandle;
use crate::config::DenisConfig;
use crate::devfs::FileOperations;
use crate::error::{Error, Result};
use crate::hexdump::HexDump;
use crate::sync::{InstanceGuard, InstanceLock, SpinLock};

use super::transfer::transfer;

/// Snapshot of an instance's transfer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Successful writes
    pub writes: usize,
    /// Bytes sent by successful writes
    pub bytes: usize,
    /// Failed writes
    pub errors: usize,
}

#[derive(Default)]
struct Counters {
    writes: AtomicUsize,
    bytes: AtomicUsize,
    errors: AtomicUsize,
}

/// One registered Denis device
///
/// Holds a shared handle to its bus, its own configuration, and optionally
/// a lock serializing writers on this instance before they contend for
/// the bus.
pub struct DenisDevice {
    bus: BusHandle,
    config: DenisConfig,
    lock: Option<Box<dyn InstanceLock>>,
    counters: Counters,
}

impl DenisDevice {
    /// Create an instance; a [`SpinLock`] is attached if the config asks
    /// for an instance lock
    pub fn new(bus: BusHandle, config: DenisConfig) -> Self {
        let lock: Option<Box<dyn InstanceLock>> = if config.instance_lock {
            Some(Box::new(SpinLock::new()))
        } else {
            None
        };

        Self {
            bus,
            config,
            lock,
            counters: Counters::default(),
        }
    }

    /// Create an instance guarded by a caller-provided lock
    pub fn with_lock(bus: BusHandle, config: DenisConfig, lock: Box<dyn InstanceLock>) -> Self {
        Self {
            bus,
            config: config.with_instance_lock(true),
            lock: Some(lock),
            counters: Counters::default(),
        }
    }

    /// The bus this instance talks to
    pub fn bus(&self) -> &BusHandle {
        &self.bus
    }

    /// The instance configuration
    pub fn config(&self) -> &DenisConfig {
        &self.config
    }

    /// Returns true if writers on this instance are serialized
    pub fn has_instance_lock(&self) -> bool {
        self.lock.is_some()
    }

    /// Current transfer counters
    pub fn stats(&self) -> TransferStats {
        TransferStats {
            writes: self.counters.writes.load(Ordering::Relaxed),
            bytes: self.counters.bytes.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }
}

impl FileOperations for DenisDevice {
    fn open(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Reads are not part of the device contract
    fn read(&self, _buf: &mut [u8]) -> Result<usize> {
        Err(Error::NotSupported)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        log::debug!("denis_write: {} bytes", buf.len());

        let _guard = match self.lock.as_deref() {
            Some(lock) => Some(InstanceGuard::acquire(lock)?),
            None => None,
        };

        match transfer(self.bus.as_ref(), &self.config, buf) {
            Ok(()) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                self.counters.bytes.fetch_add(buf.len(), Ordering::Relaxed);
                if log::log_enabled!(log::Level::Debug) {
                    log::debug!("denis_write:\n{}", HexDump(buf));
                }
                Ok(buf.len())
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                log::error!(
                    "denis_write: transfer to device {} failed: {}",
                    self.config.spi_devid,
                    e
                );
                Err(e)
            }
        }
    }
}
