//! denis-dummy - In-memory SPI bus for testing
//!
//! This crate provides a bus that records every transport call instead of
//! driving hardware. It is useful for testing the driver and for running
//! the CLI without a board.
//!
//! The bus enforces the transport contract: selecting a device requires
//! the bus lock held by the calling thread, and sending requires a selected
//! device. Only the thread holding the bus lock may release it. Violations are
//! reported as errors, like real hardware would misbehave.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use denis_core::bus::{SpiBus, SpiMode};
use denis_core::error::{Error, Result};
use denis_core::sync::BlockingLock;

/// One transport call observed by the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// Bus lock acquired
    Lock,
    /// Bus lock released
    Unlock,
    /// Chip select asserted
    Select(u32),
    /// Chip select deasserted
    Deselect(u32),
    /// Block sent to the selected device
    Send {
        /// Device selected during the transfer
        devid: u32,
        /// Bytes sent
        data: Vec<u8>,
    },
    /// Clock frequency changed (actual value)
    Frequency(u32),
    /// Mode changed
    Mode(SpiMode),
}

/// Configuration for the dummy bus
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Highest clock the bus accepts; faster requests are clamped
    pub max_frequency: u32,
    /// Time each block transfer takes
    pub transfer_delay: Duration,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            max_frequency: 20_000_000,
            transfer_delay: Duration::ZERO,
        }
    }
}

#[derive(Default)]
struct State {
    events: Vec<BusEvent>,
    selected: Option<u32>,
    frequency: u32,
    mode: SpiMode,
}

type TransferHook = Box<dyn Fn(u32, &[u8]) + Send + Sync>;

/// Recording SPI bus
///
/// Emulates one physical bus shared by several devices.
pub struct RecordingBus {
    config: DummyConfig,
    lock: BlockingLock,
    state: spin::Mutex<State>,
    fail_lock: AtomicBool,
    fail_select: AtomicBool,
    failing_transfers: AtomicUsize,
    on_transfer: Option<TransferHook>,
}

impl RecordingBus {
    /// Create a new bus with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            config,
            lock: BlockingLock::new(),
            state: spin::Mutex::new(State::default()),
            fail_lock: AtomicBool::new(false),
            fail_select: AtomicBool::new(false),
            failing_transfers: AtomicUsize::new(0),
            on_transfer: None,
        }
    }

    /// Create a new bus with default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Run `hook` inside every successful transfer, while the device is
    /// selected and the bus is locked
    pub fn with_transfer_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(u32, &[u8]) + Send + Sync + 'static,
    {
        self.on_transfer = Some(Box::new(hook));
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// All events recorded so far
    pub fn events(&self) -> Vec<BusEvent> {
        self.state.lock().events.clone()
    }

    /// Payloads of all successful transfers, in order
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                BusEvent::Send { data, .. } => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded events
    pub fn clear(&self) {
        self.state.lock().events.clear();
    }

    /// Current clock frequency
    pub fn frequency(&self) -> u32 {
        self.state.lock().frequency
    }

    /// Current mode
    pub fn mode(&self) -> SpiMode {
        self.state.lock().mode
    }

    /// Returns true if some caller holds the bus lock
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Make lock acquisition fail until reset
    pub fn set_fail_lock(&self, fail: bool) {
        self.fail_lock.store(fail, Ordering::SeqCst);
    }

    /// Make chip select assertion fail until reset
    pub fn set_fail_select(&self, fail: bool) {
        self.fail_select.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` transfers fail
    pub fn fail_next_transfers(&self, count: usize) {
        self.failing_transfers.store(count, Ordering::SeqCst);
    }

    fn take_transfer_failure(&self) -> bool {
        self.failing_transfers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for RecordingBus {
    fn default() -> Self {
        Self::new_default()
    }
}

impl SpiBus for RecordingBus {
    fn lock(&self, lock: bool) -> Result<()> {
        if lock {
            if self.fail_lock.load(Ordering::SeqCst) {
                return Err(Error::BusLockFailed);
            }
            self.lock.acquire()?;
            self.state.lock().events.push(BusEvent::Lock);
        } else {
            if !self.lock.is_held_by_current_thread() {
                log::error!("dummy: unlock of a bus this thread does not hold");
                return Err(Error::BusLockFailed);
            }
            self.state.lock().events.push(BusEvent::Unlock);
            self.lock.release()?;
        }
        Ok(())
    }

    fn select(&self, devid: u32, selected: bool) -> Result<()> {
        if !self.lock.is_held_by_current_thread() {
            log::error!("dummy: chip select {} driven without bus lock", devid);
            return Err(Error::SelectFailed);
        }

        let mut state = self.state.lock();
        if selected {
            if self.fail_select.load(Ordering::SeqCst) {
                return Err(Error::SelectFailed);
            }
            if let Some(other) = state.selected {
                log::error!("dummy: device {} selected while {} is active", devid, other);
                return Err(Error::SelectFailed);
            }
            state.selected = Some(devid);
            state.events.push(BusEvent::Select(devid));
        } else {
            if state.selected != Some(devid) {
                return Err(Error::SelectFailed);
            }
            state.selected = None;
            state.events.push(BusEvent::Deselect(devid));
        }
        Ok(())
    }

    fn send_block(&self, data: &[u8]) -> Result<()> {
        let devid = self
            .state
            .lock()
            .selected
            .ok_or(Error::TransferFailed)?;

        if self.take_transfer_failure() {
            log::debug!("dummy: injected transfer failure");
            return Err(Error::TransferFailed);
        }

        if !self.config.transfer_delay.is_zero() {
            std::thread::sleep(self.config.transfer_delay);
        }
        if let Some(hook) = &self.on_transfer {
            hook(devid, data);
        }

        self.state.lock().events.push(BusEvent::Send {
            devid,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn set_frequency(&self, hz: u32) -> Result<u32> {
        let actual = hz.min(self.config.max_frequency);
        let mut state = self.state.lock();
        state.frequency = actual;
        state.events.push(BusEvent::Frequency(actual));
        Ok(actual)
    }

    fn set_mode(&self, mode: SpiMode) -> Result<()> {
        let mut state = self.state.lock();
        state.mode = mode;
        state.events.push(BusEvent::Mode(mode));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use denis_core::bus::BusHandle;
    use denis_core::{DenisConfig, DevFs, FileOperations, OpenFlags, Registry};
    use std::sync::Arc;
    use std::thread;

    const MESSAGE: &[u8] = b"Hello, Denis!!\n";

    /// Returns true if two select windows are open at the same time
    fn windows_overlap(events: &[BusEvent]) -> bool {
        let mut open = 0usize;
        for event in events {
            match event {
                BusEvent::Select(_) => {
                    open += 1;
                    if open > 1 {
                        return true;
                    }
                }
                BusEvent::Deselect(_) => open -= 1,
                _ => {}
            }
        }
        false
    }

    #[test]
    fn test_denis0_scenario() {
        let bus = Arc::new(RecordingBus::new_default());
        let mut fs = DevFs::new();
        let mut registry = Registry::new();
        registry
            .register(&mut fs, "/dev/denis0", bus.clone(), DenisConfig::new(0))
            .unwrap();
        bus.clear();

        let file = fs.open("/dev/denis0", OpenFlags::RDWR).unwrap();
        assert_eq!(file.write(MESSAGE), Ok(15));
        assert_eq!(
            bus.events(),
            vec![
                BusEvent::Lock,
                BusEvent::Frequency(5_000_000),
                BusEvent::Mode(SpiMode::Mode3),
                BusEvent::Select(0),
                BusEvent::Send {
                    devid: 0,
                    data: MESSAGE.to_vec()
                },
                BusEvent::Deselect(0),
                BusEvent::Unlock,
            ]
        );

        let mut buf = [0u8; 64];
        assert_eq!(file.read(&mut buf), Err(Error::NotSupported));
        assert_eq!(file.read(&mut buf[..0]), Err(Error::NotSupported));
        assert_eq!(bus.sent().len(), 1);
    }

    #[test]
    fn test_registration_sets_clock_and_mode() {
        let bus = Arc::new(RecordingBus::new_default());
        let mut fs = DevFs::new();
        let mut registry = Registry::new();
        registry
            .register(&mut fs, "/dev/denis0", bus.clone(), DenisConfig::new(0))
            .unwrap();

        assert_eq!(bus.frequency(), 5_000_000);
        assert_eq!(bus.mode(), SpiMode::Mode3);
        assert!(!bus.is_locked());
    }

    #[test]
    fn test_each_write_runs_at_its_own_clock_and_mode() {
        let seen = Arc::new(spin::Mutex::new(Vec::new()));
        let bus = {
            let seen = Arc::clone(&seen);
            Arc::new(RecordingBus::new_default().with_transfer_hook(move |devid, _| {
                seen.lock().push(devid);
            }))
        };
        let mut fs = DevFs::new();
        let mut registry = Registry::new();
        registry
            .register(
                &mut fs,
                "/dev/denis0",
                bus.clone(),
                DenisConfig::new(0)
                    .with_frequency(1_000_000)
                    .with_mode(SpiMode::Mode0),
            )
            .unwrap();
        registry
            .register(&mut fs, "/dev/denis1", bus.clone(), DenisConfig::new(1))
            .unwrap();
        assert_eq!(bus.mode(), SpiMode::Mode3);

        let denis0 = fs.open("/dev/denis0", OpenFlags::WRONLY).unwrap();
        let denis1 = fs.open("/dev/denis1", OpenFlags::WRONLY).unwrap();

        bus.clear();
        assert_eq!(denis0.write(b"slow"), Ok(4));
        assert_eq!(bus.frequency(), 1_000_000);
        assert_eq!(bus.mode(), SpiMode::Mode0);
        let events = bus.events();
        assert_eq!(
            events[..4],
            [
                BusEvent::Lock,
                BusEvent::Frequency(1_000_000),
                BusEvent::Mode(SpiMode::Mode0),
                BusEvent::Select(0),
            ]
        );

        assert_eq!(denis1.write(b"fast"), Ok(4));
        assert_eq!(bus.frequency(), 5_000_000);
        assert_eq!(bus.mode(), SpiMode::Mode3);
        assert_eq!(*seen.lock(), vec![0, 1]);
    }

    #[test]
    fn test_only_lock_holder_can_unlock() {
        let bus = Arc::new(RecordingBus::new_default());
        bus.lock(true).unwrap();

        let other = Arc::clone(&bus);
        let (unlocked, selected) = thread::spawn(move || (other.lock(false), other.select(0, true)))
            .join()
            .unwrap();
        assert_eq!(unlocked, Err(Error::BusLockFailed));
        assert_eq!(selected, Err(Error::SelectFailed));
        assert!(bus.is_locked());

        bus.lock(false).unwrap();
        assert!(!bus.is_locked());
        assert_eq!(bus.lock(false), Err(Error::BusLockFailed));
        assert_eq!(bus.events(), vec![BusEvent::Lock, BusEvent::Unlock]);
    }

    #[test]
    fn test_frequency_is_clamped() {
        let bus = RecordingBus::new(DummyConfig {
            max_frequency: 1_000_000,
            ..Default::default()
        });
        assert_eq!(bus.set_frequency(5_000_000), Ok(1_000_000));
    }

    #[test]
    fn test_select_requires_lock() {
        let bus = RecordingBus::new_default();
        assert_eq!(bus.select(0, true), Err(Error::SelectFailed));
        assert_eq!(bus.send_block(b"x"), Err(Error::TransferFailed));
        assert!(bus.events().is_empty());
    }

    #[test]
    fn test_failed_transfer_leaves_bus_free() {
        let bus = Arc::new(RecordingBus::new_default());
        let handle: BusHandle = bus.clone();
        let dev = denis_core::DenisDevice::new(handle, DenisConfig::new(0));

        bus.fail_next_transfers(1);
        assert_eq!(dev.write(b"lost"), Err(Error::TransferFailed));
        assert!(!bus.is_locked());
        assert_eq!(dev.write(b"kept"), Ok(4));
        assert_eq!(bus.sent(), vec![b"kept".to_vec()]);
    }

    #[test]
    fn test_concurrent_writers_on_shared_bus_do_not_interleave() {
        let bus = Arc::new(RecordingBus::new(DummyConfig {
            transfer_delay: Duration::from_millis(2),
            ..Default::default()
        }));
        let mut fs = DevFs::new();
        let mut registry = Registry::new();
        registry
            .register(&mut fs, "/dev/denis0", bus.clone(), DenisConfig::new(0))
            .unwrap();
        registry
            .register(&mut fs, "/dev/denis1", bus.clone(), DenisConfig::new(1))
            .unwrap();
        bus.clear();

        let fs = Arc::new(fs);
        let writers: Vec<_> = ["/dev/denis0", "/dev/denis1"]
            .into_iter()
            .map(|path| {
                let fs = Arc::clone(&fs);
                thread::spawn(move || {
                    let file = fs.open(path, OpenFlags::WRONLY).unwrap();
                    for i in 0..20u8 {
                        assert_eq!(file.write(&[i; 8]), Ok(8));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let events = bus.events();
        assert!(!windows_overlap(&events));
        assert_eq!(bus.sent().len(), 40);
    }

    #[test]
    fn test_separate_buses_transfer_in_parallel() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let make_bus = || {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            Arc::new(RecordingBus::new_default().with_transfer_hook(move |_, _| {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(100));
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }))
        };

        let mut fs = DevFs::new();
        let mut registry = Registry::new();
        registry
            .register(&mut fs, "/dev/denis0", make_bus(), DenisConfig::new(0))
            .unwrap();
        registry
            .register(&mut fs, "/dev/denis1", make_bus(), DenisConfig::new(0))
            .unwrap();

        let fs = Arc::new(fs);
        let writers: Vec<_> = ["/dev/denis0", "/dev/denis1"]
            .into_iter()
            .map(|path| {
                let fs = Arc::clone(&fs);
                thread::spawn(move || {
                    let file = fs.open(path, OpenFlags::WRONLY).unwrap();
                    file.write(b"parallel").unwrap();
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_instance_lock_serializes_writers() {
        let bus = Arc::new(RecordingBus::new(DummyConfig {
            transfer_delay: Duration::from_millis(1),
            ..Default::default()
        }));
        let mut fs = DevFs::new();
        let mut registry = Registry::new();
        registry
            .register(
                &mut fs,
                "/dev/denis0",
                bus.clone(),
                DenisConfig::new(0).with_instance_lock(true),
            )
            .unwrap();
        bus.clear();

        let fs = Arc::new(fs);
        let writers: Vec<_> = (0..4u8)
            .map(|n| {
                let fs = Arc::clone(&fs);
                thread::spawn(move || {
                    let file = fs.open("/dev/denis0", OpenFlags::WRONLY).unwrap();
                    for _ in 0..10 {
                        assert_eq!(file.write(&[n; 4]), Ok(4));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert!(!windows_overlap(&bus.events()));
        let stats = registry.find("/dev/denis0").unwrap().stats();
        assert_eq!(stats.writes, 40);
        assert_eq!(stats.bytes, 160);
    }

    #[test]
    fn test_failed_writer_does_not_block_next_writer() {
        let bus = Arc::new(RecordingBus::new_default());
        let mut fs = DevFs::new();
        let mut registry = Registry::new();
        registry
            .register(
                &mut fs,
                "/dev/denis0",
                bus.clone(),
                DenisConfig::new(0).with_instance_lock(true),
            )
            .unwrap();
        let fs = Arc::new(fs);

        bus.fail_next_transfers(1);
        let first = {
            let fs = Arc::clone(&fs);
            thread::spawn(move || {
                let file = fs.open("/dev/denis0", OpenFlags::WRONLY).unwrap();
                file.write(b"first")
            })
        };
        assert_eq!(first.join().unwrap(), Err(Error::TransferFailed));

        let second = {
            let fs = Arc::clone(&fs);
            thread::spawn(move || {
                let file = fs.open("/dev/denis0", OpenFlags::WRONLY).unwrap();
                file.write(b"second")
            })
        };
        assert_eq!(second.join().unwrap(), Ok(6));
        assert_eq!(bus.sent(), vec![b"second".to_vec()]);
    }

    #[test]
    fn test_embedded_io_writer() {
        use embedded_io::Write;

        let bus = Arc::new(RecordingBus::new_default());
        let mut fs = DevFs::new();
        let mut registry = Registry::new();
        registry
            .register(&mut fs, "/dev/denis0", bus.clone(), DenisConfig::new(0))
            .unwrap();

        let mut file = fs.open("/dev/denis0", OpenFlags::WRONLY).unwrap();
        file.write_all(b"via embedded-io").unwrap();
        assert_eq!(bus.sent(), vec![b"via embedded-io".to_vec()]);
    }
}
