//! Registry of Denis driver instances
//!
//! The registry is owned by the bootstrap code and passed to whatever
//! needs to register or look up devices. It only grows: instances live
//! until the registry is dropped.

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::bus::{same_bus, BusHandle};
use crate::config::DenisConfig;
use crate::devfs::{DevFs, DEFAULT_MODE};
use crate::driver::transfer::configure_bus;
use crate::driver::DenisDevice;
use crate::error::{Error, Result};

/// A registered instance and the path it is mounted at
pub struct Entry {
    path: String,
    device: Arc<DenisDevice>,
}

impl Entry {
    /// Mount path of the instance
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The driver instance
    pub fn device(&self) -> &Arc<DenisDevice> {
        &self.device
    }
}

/// Append-only collection of driver instances
#[derive(Default)]
pub struct Registry {
    entries: Vec<Entry>,
    capacity: Option<usize>,
}

impl Registry {
    /// Create an empty, unbounded registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that holds at most `max` instances
    ///
    /// Registering beyond the bound fails like an exhausted allocator.
    pub fn bounded(max: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: Some(max),
        }
    }

    /// Register a Denis device on `bus` under `path`
    ///
    /// Configures the bus clock and mode for the device, exposes the device
    /// in `fs` with mode `0666` and records it. Nothing is recorded if any
    /// step fails, and a rejected path leaves the bus untouched. Each write
    /// re-applies the device's clock and mode, so later registrations on the
    /// same bus do not change how earlier devices are driven.
    pub fn register(
        &mut self,
        fs: &mut DevFs,
        path: &str,
        bus: BusHandle,
        config: DenisConfig,
    ) -> Result<()> {
        self.register_device(fs, path, DenisDevice::new(bus, config))
    }

    /// Register an already constructed instance under `path`
    pub fn register_device(
        &mut self,
        fs: &mut DevFs,
        path: &str,
        device: DenisDevice,
    ) -> Result<()> {
        let devid = device.config().spi_devid;
        if self.chip_select_in_use(device.bus(), devid) {
            log::error!(
                "denis: chip select {} already registered on this bus, refusing {}",
                devid,
                path
            );
            return Err(Error::ChipSelectInUse);
        }

        if let Err(e) = self.reserve_slot() {
            log::error!("denis: failed to allocate instance");
            return Err(e);
        }

        if let Err(e) = fs.check_path(path) {
            log::error!("denis: failed to register driver {}: {}", path, e);
            return Err(e);
        }

        let device = Arc::new(device);
        configure_bus(device.bus().as_ref(), device.config())?;

        if let Err(e) = fs.register_driver(path, device.clone(), DEFAULT_MODE) {
            log::error!("denis: failed to register driver {}: {}", path, e);
            return Err(e);
        }

        log::info!(
            "denis: registered {} (devid {}, {} Hz, {})",
            path,
            devid,
            device.config().frequency,
            device.config().mode
        );

        self.entries.push(Entry {
            path: path.to_string(),
            device,
        });
        Ok(())
    }

    /// Number of registered instances
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered instances, most recent first
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().rev()
    }

    /// Look up the instance mounted at `path`
    pub fn find(&self, path: &str) -> Option<&Arc<DenisDevice>> {
        self.entries
            .iter()
            .find(|entry| entry.path == path)
            .map(|entry| &entry.device)
    }

    fn chip_select_in_use(&self, bus: &BusHandle, devid: u32) -> bool {
        self.entries.iter().any(|entry| {
            entry.device.config().spi_devid == devid && same_bus(entry.device.bus(), bus)
        })
    }

    fn reserve_slot(&mut self) -> Result<()> {
        if let Some(max) = self.capacity {
            if self.entries.len() >= max {
                return Err(Error::OutOfMemory);
            }
        }
        self.entries
            .try_reserve(1)
            .map_err(|_| Error::OutOfMemory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SpiMode;
    use crate::devfs::OpenFlags;
    use crate::mock::{MockBus, Op};

    fn setup() -> (Registry, DevFs, Arc<MockBus>) {
        (Registry::new(), DevFs::new(), Arc::new(MockBus::new()))
    }

    #[test]
    fn test_register_adds_one_entry() {
        let (mut registry, mut fs, bus) = setup();

        registry
            .register(&mut fs, "/dev/denis0", bus.clone(), DenisConfig::new(0))
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert!(fs.contains("/dev/denis0"));
        assert!(registry.find("/dev/denis0").is_some());
    }

    #[test]
    fn test_register_configures_bus() {
        let (mut registry, mut fs, bus) = setup();

        registry
            .register(&mut fs, "/dev/denis0", bus.clone(), DenisConfig::new(0))
            .unwrap();

        let ops = bus.ops();
        assert!(ops.contains(&Op::Frequency(5_000_000)));
        assert!(ops.contains(&Op::Mode(SpiMode::Mode3)));
    }

    #[test]
    fn test_duplicate_path_leaves_registry_unchanged() {
        let (mut registry, mut fs, bus) = setup();

        registry
            .register(&mut fs, "/dev/denis0", bus.clone(), DenisConfig::new(0))
            .unwrap();
        let before = bus.ops().len();
        let result = registry.register(
            &mut fs,
            "/dev/denis0",
            bus.clone(),
            DenisConfig::new(1).with_frequency(1_000_000),
        );

        assert_eq!(result, Err(Error::AlreadyExists));
        assert_eq!(registry.len(), 1);
        assert_eq!(fs.len(), 1);
        // The rejected registration never reached the bus
        assert_eq!(bus.ops().len(), before);
    }

    #[test]
    fn test_write_uses_own_mode_on_shared_bus() {
        let (mut registry, mut fs, bus) = setup();
        let slow = DenisConfig::new(0)
            .with_frequency(1_000_000)
            .with_mode(SpiMode::Mode0);

        registry
            .register(&mut fs, "/dev/denis0", bus.clone(), slow)
            .unwrap();
        registry
            .register(&mut fs, "/dev/denis1", bus.clone(), DenisConfig::new(1))
            .unwrap();

        let before = bus.ops().len();
        let file = fs.open("/dev/denis0", OpenFlags::WRONLY).unwrap();
        assert_eq!(file.write(b"slow"), Ok(4));

        assert_eq!(
            bus.ops()[before..],
            [
                Op::Lock,
                Op::Frequency(1_000_000),
                Op::Mode(SpiMode::Mode0),
                Op::Select(0),
                Op::Send(b"slow".to_vec()),
                Op::Deselect(0),
                Op::Unlock,
            ]
        );
    }

    #[test]
    fn test_invalid_path_leaves_registry_unchanged() {
        let (mut registry, mut fs, bus) = setup();

        let result = registry.register(&mut fs, "denis0", bus, DenisConfig::new(0));

        assert_eq!(result, Err(Error::InvalidPath));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_chip_select_rejected() {
        let (mut registry, mut fs, bus) = setup();

        registry
            .register(&mut fs, "/dev/denis0", bus.clone(), DenisConfig::new(3))
            .unwrap();
        let result = registry.register(&mut fs, "/dev/denis1", bus.clone(), DenisConfig::new(3));

        assert_eq!(result, Err(Error::ChipSelectInUse));
        assert_eq!(registry.len(), 1);
        assert!(!fs.contains("/dev/denis1"));
    }

    #[test]
    fn test_same_chip_select_on_other_bus_allowed() {
        let (mut registry, mut fs, bus) = setup();
        let other = Arc::new(MockBus::new());

        registry
            .register(&mut fs, "/dev/denis0", bus, DenisConfig::new(0))
            .unwrap();
        registry
            .register(&mut fs, "/dev/denis1", other, DenisConfig::new(0))
            .unwrap();

        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_bounded_registry_out_of_memory() {
        let mut registry = Registry::bounded(1);
        let mut fs = DevFs::new();
        let bus = Arc::new(MockBus::new());

        registry
            .register(&mut fs, "/dev/denis0", bus.clone(), DenisConfig::new(0))
            .unwrap();
        let result = registry.register(&mut fs, "/dev/denis1", bus.clone(), DenisConfig::new(1));

        assert_eq!(result, Err(Error::OutOfMemory));
        assert_eq!(registry.len(), 1);
        assert!(!fs.contains("/dev/denis1"));
    }

    #[test]
    fn test_iter_newest_first() {
        let (mut registry, mut fs, bus) = setup();

        for (i, path) in ["/dev/denis0", "/dev/denis1", "/dev/denis2"].iter().enumerate() {
            registry
                .register(&mut fs, path, bus.clone(), DenisConfig::new(i as u32))
                .unwrap();
        }

        let paths: Vec<&str> = registry.iter().map(Entry::path).collect();
        assert_eq!(paths, ["/dev/denis2", "/dev/denis1", "/dev/denis0"]);
    }

    #[test]
    fn test_write_through_devfs() {
        let (mut registry, mut fs, bus) = setup();
        registry
            .register(&mut fs, "/dev/denis0", bus.clone(), DenisConfig::new(0))
            .unwrap();

        let file = fs.open("/dev/denis0", OpenFlags::RDWR).unwrap();
        assert_eq!(file.write(b"payload"), Ok(7));

        let mut buf = [0u8; 8];
        assert_eq!(file.read(&mut buf), Err(Error::NotSupported));

        let stats = registry.find("/dev/denis0").unwrap().stats();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.bytes, 7);
    }
}
