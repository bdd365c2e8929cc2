//! Minimal recording bus for unit tests

use alloc::vec::Vec;

use core::sync::atomic::{AtomicBool, Ordering};

use crate::bus::{SpiBus, SpiMode};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Lock,
    Unlock,
    Select(u32),
    Deselect(u32),
    Send(Vec<u8>),
    Frequency(u32),
    Mode(SpiMode),
}

#[derive(Default)]
pub struct MockBus {
    ops: spin::Mutex<Vec<Op>>,
    fail_lock: AtomicBool,
    fail_select: AtomicBool,
    fail_send: AtomicBool,
    fail_mode: AtomicBool,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().clone()
    }

    pub fn fail_lock(&self, fail: bool) {
        self.fail_lock.store(fail, Ordering::SeqCst);
    }

    pub fn fail_select(&self, fail: bool) {
        self.fail_select.store(fail, Ordering::SeqCst);
    }

    pub fn fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mode(&self, fail: bool) {
        self.fail_mode.store(fail, Ordering::SeqCst);
    }

    fn record(&self, op: Op) {
        self.ops.lock().push(op);
    }
}

impl SpiBus for MockBus {
    fn lock(&self, lock: bool) -> Result<()> {
        if lock {
            if self.fail_lock.load(Ordering::SeqCst) {
                return Err(Error::BusLockFailed);
            }
            self.record(Op::Lock);
        } else {
            self.record(Op::Unlock);
        }
        Ok(())
    }

    fn select(&self, devid: u32, selected: bool) -> Result<()> {
        if selected {
            if self.fail_select.load(Ordering::SeqCst) {
                return Err(Error::SelectFailed);
            }
            self.record(Op::Select(devid));
        } else {
            self.record(Op::Deselect(devid));
        }
        Ok(())
    }

    fn send_block(&self, data: &[u8]) -> Result<()> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(Error::TransferFailed);
        }
        self.record(Op::Send(data.to_vec()));
        Ok(())
    }

    fn set_frequency(&self, hz: u32) -> Result<u32> {
        self.record(Op::Frequency(hz));
        Ok(hz)
    }

    fn set_mode(&self, mode: SpiMode) -> Result<()> {
        if self.fail_mode.load(Ordering::SeqCst) {
            return Err(Error::BusConfigFailed);
        }
        self.record(Op::Mode(mode));
        Ok(())
    }
}
