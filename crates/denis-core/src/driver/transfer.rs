//! Bus transactions issued by the driver
//!
//! Every write is one bracketed transaction:
//! lock → set clock and mode → select → send_block → deselect → unlock.
//! The release half always runs once its acquire succeeded.

use crate::bus::{BusLock, ChipSelect, SpiBus};
use crate::config::DenisConfig;
use crate::error::Result;

/// Send `data` to the device described by `config` as a single locked,
/// selected block
///
/// The bus is shared with instances that may run at another clock or mode,
/// so the instance's own settings are applied inside the critical section.
pub fn transfer(bus: &dyn SpiBus, config: &DenisConfig, data: &[u8]) -> Result<()> {
    let devid = config.spi_devid;
    let lock = BusLock::acquire(bus)?;
    apply_config(&lock, config)?;
    let cs = ChipSelect::assert(&lock, devid)?;

    let sent = cs.send_block(data);
    let deselected = cs.release();
    let unlocked = lock.release();

    match (sent, deselected, unlocked) {
        (Ok(()), Ok(()), Ok(())) => Ok(()),
        (Err(e), deselected, unlocked) => {
            log_cleanup(devid, deselected, unlocked);
            Err(e)
        }
        (Ok(()), Err(e), unlocked) => {
            log_cleanup(devid, Ok(()), unlocked);
            Err(e)
        }
        (Ok(()), Ok(()), Err(e)) => Err(e),
    }
}

/// Apply the device's clock and mode to the bus, under the bus lock
pub fn configure_bus(bus: &dyn SpiBus, config: &DenisConfig) -> Result<()> {
    let lock = BusLock::acquire(bus)?;
    apply_config(&lock, config)?;
    lock.release()
}

fn apply_config(lock: &BusLock<'_>, config: &DenisConfig) -> Result<()> {
    let bus = lock.bus();
    let actual = bus.set_frequency(config.frequency)?;
    if actual != config.frequency {
        log::debug!(
            "denis: requested {} Hz, bus runs at {} Hz",
            config.frequency,
            actual
        );
    }
    bus.set_mode(config.mode)
}

fn log_cleanup(devid: u32, deselected: Result<()>, unlocked: Result<()>) {
    if let Err(e) = deselected {
        log::warn!("denis: failed to deselect device {}: {}", devid, e);
    }
    if let Err(e) = unlocked {
        log::warn!("denis: failed to unlock bus: {}", e);
    }
}
