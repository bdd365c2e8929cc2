//! RAII guards for the bus lock and chip select
//!
//! A [`ChipSelect`] can only be created from a live [`BusLock`], so chip
//! select is never asserted without holding the bus. Both guards release
//! on drop; the explicit `release` methods exist so the success path can
//! report a failing unlock/deselect instead of only logging it.

use super::SpiBus;
use crate::error::Result;

/// Exclusive hold on a shared bus
pub struct BusLock<'a> {
    bus: &'a dyn SpiBus,
    released: bool,
}

impl<'a> BusLock<'a> {
    /// Block until the bus is held exclusively
    pub fn acquire(bus: &'a dyn SpiBus) -> Result<Self> {
        bus.lock(true)?;
        log::trace!("bus: locked");
        Ok(Self {
            bus,
            released: false,
        })
    }

    /// The locked bus
    pub fn bus(&self) -> &'a dyn SpiBus {
        self.bus
    }

    /// Release the bus, reporting a failing unlock
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        log::trace!("bus: unlocked");
        self.bus.lock(false)
    }
}

impl Drop for BusLock<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.bus.lock(false) {
            log::warn!("bus: failed to release lock: {}", e);
        }
    }
}

/// Asserted chip select for one device on a locked bus
pub struct ChipSelect<'l, 'a> {
    lock: &'l BusLock<'a>,
    devid: u32,
    released: bool,
}

impl<'l, 'a> ChipSelect<'l, 'a> {
    /// Assert chip select for `devid`
    pub fn assert(lock: &'l BusLock<'a>, devid: u32) -> Result<Self> {
        lock.bus().select(devid, true)?;
        log::trace!("bus: selected device {}", devid);
        Ok(Self {
            lock,
            devid,
            released: false,
        })
    }

    /// Device id this guard selected
    pub fn devid(&self) -> u32 {
        self.devid
    }

    /// Send a block to the selected device
    pub fn send_block(&self, data: &[u8]) -> Result<()> {
        self.lock.bus().send_block(data)
    }

    /// Deassert chip select, reporting a failure
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        log::trace!("bus: deselected device {}", self.devid);
        self.lock.bus().select(self.devid, false)
    }
}

impl Drop for ChipSelect<'_, '_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.lock.bus().select(self.devid, false) {
            log::warn!("bus: failed to deselect device {}: {}", self.devid, e);
        }
    }
}
