//! spidev-backed SPI bus
//!
//! One `LinuxSpiBus` stands for one SPI controller. Each chip select on
//! that controller is a separate `/dev/spidevB.C` node, opened the first
//! time the device is selected and kept open afterwards.
//!
//! The kernel drives the chip select line itself for the duration of each
//! `SPI_IOC_MESSAGE` ioctl, so `select` only records which node the next
//! block goes to. The bus lock still serializes whole transactions between
//! driver instances.

use crate::error::{LinuxSpiError, Result};

use denis_core::bus::{SpiBus, SpiMode};
use denis_core::error::{Error as CoreError, Result as CoreResult};
use denis_core::sync::BlockingLock;

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Path to kernel spidev buffer size parameter
const BUF_SIZE_SYSFS: &str = "/sys/module/spidev/parameters/bufsiz";

/// Default directory holding spidev nodes
pub const DEFAULT_DEV_DIR: &str = "/dev";

/// Default SPI clock speed in Hz until the driver configures one
const DEFAULT_SPEED_HZ: u32 = 2_000_000;

/// Linux spidev ioctl constants
mod ioctl {
    use nix::ioctl_write_ptr;

    const SPI_IOC_MAGIC: u8 = b'k';

    const SPI_IOC_TYPE_MODE: u8 = 1;
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;

    ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_write_ptr!(
        spi_ioc_wr_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );

    /// Size of struct spi_ioc_transfer
    pub const SPI_IOC_TRANSFER_SIZE: usize = 32;

    /// ioctl number for SPI_IOC_MESSAGE(n), i.e. _IOW('k', 0, char[n * 32])
    pub fn spi_ioc_message(n: u8) -> libc::c_ulong {
        let size = (n as usize) * SPI_IOC_TRANSFER_SIZE;
        ((1u32 << 30) | ((size as u32) << 16) | ((SPI_IOC_MAGIC as u32) << 8)) as libc::c_ulong
    }
}

/// Mirror of the kernel's struct spi_ioc_transfer
#[repr(C)]
#[derive(Debug, Default, Clone)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    _pad: u8,
}

/// Configuration for a spidev bus
#[derive(Debug, Clone)]
pub struct LinuxSpiConfig {
    /// Controller number (the B in spidevB.C)
    pub bus: u32,
    /// Directory containing the spidev nodes
    pub dev_dir: PathBuf,
    /// Upper bound applied to requested clock speeds
    pub max_speed_hz: Option<u32>,
}

impl Default for LinuxSpiConfig {
    fn default() -> Self {
        Self {
            bus: 0,
            dev_dir: PathBuf::from(DEFAULT_DEV_DIR),
            max_speed_hz: None,
        }
    }
}

impl LinuxSpiConfig {
    /// Create a configuration for controller `bus`
    pub fn new(bus: u32) -> Self {
        Self {
            bus,
            ..Default::default()
        }
    }

    /// Look for nodes in `dir` instead of `/dev`
    pub fn with_dev_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dev_dir = dir.into();
        self
    }

    /// Cap clock speeds at `hz`
    pub fn with_max_speed(mut self, hz: u32) -> Self {
        self.max_speed_hz = Some(hz);
        self
    }

    /// Path of the node for chip select `devid`
    pub fn device_path(&self, devid: u32) -> PathBuf {
        self.dev_dir.join(format!("spidev{}.{}", self.bus, devid))
    }
}

struct State {
    devices: HashMap<u32, File>,
    selected: Option<u32>,
    speed_hz: u32,
    mode: SpiMode,
}

/// SPI controller exposed through spidev
pub struct LinuxSpiBus {
    config: LinuxSpiConfig,
    lock: BlockingLock,
    state: Mutex<State>,
    max_kernel_buf_size: usize,
}

impl LinuxSpiBus {
    /// Open controller `config.bus`
    ///
    /// Fails with [`LinuxSpiError::NoSuchBus`] if no `spidevB.*` node
    /// exists for the controller.
    pub fn open(config: LinuxSpiConfig) -> Result<Self> {
        if !bus_present(&config.dev_dir, config.bus) {
            return Err(LinuxSpiError::NoSuchBus {
                bus: config.bus,
                dir: config.dev_dir.display().to_string(),
            });
        }

        let max_kernel_buf_size = get_max_kernel_buf_size();
        log::info!(
            "linux_spi: Opened bus {} (buffer size {} bytes)",
            config.bus,
            max_kernel_buf_size
        );

        Ok(Self {
            config,
            lock: BlockingLock::new(),
            state: Mutex::new(State {
                devices: HashMap::new(),
                selected: None,
                speed_hz: DEFAULT_SPEED_HZ,
                mode: SpiMode::Mode0,
            }),
            max_kernel_buf_size,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &LinuxSpiConfig {
        &self.config
    }

    /// Current clock speed in Hz
    pub fn speed_hz(&self) -> u32 {
        self.state().speed_hz
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_device(&self, devid: u32, mode: SpiMode, speed_hz: u32) -> Result<File> {
        let path = self.config.device_path(devid);
        log::debug!("linux_spi: Opening device {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| LinuxSpiError::OpenFailed {
                path: path.display().to_string(),
                source: e,
            })?;

        apply_mode(&file, mode)?;

        let bits: u8 = 8;
        // SAFETY: fd is open for the lifetime of `file` and `bits` outlives the call
        unsafe {
            ioctl::spi_ioc_wr_bits_per_word(file.as_raw_fd(), &bits).map_err(|e| {
                LinuxSpiError::SetBitsPerWordFailed {
                    bits,
                    source: std::io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }

        apply_speed(&file, speed_hz)?;
        Ok(file)
    }

    fn send(&self, data: &[u8]) -> Result<()> {
        if data.len() > self.max_kernel_buf_size {
            return Err(LinuxSpiError::BlockTooLarge {
                len: data.len(),
                max: self.max_kernel_buf_size,
            });
        }

        let state = self.state();
        let devid = state.selected.ok_or(LinuxSpiError::NotSelected)?;
        let file = state
            .devices
            .get(&devid)
            .ok_or(LinuxSpiError::NotSelected)?;

        let transfer = SpiIocTransfer {
            tx_buf: data.as_ptr() as u64,
            len: data.len() as u32,
            speed_hz: state.speed_hz,
            bits_per_word: 8,
            ..Default::default()
        };

        // SAFETY: the transfer descriptor and tx buffer outlive the ioctl
        let ret = unsafe {
            libc::ioctl(
                file.as_raw_fd(),
                ioctl::spi_ioc_message(1),
                &transfer as *const SpiIocTransfer,
            )
        };
        if ret < 0 {
            return Err(LinuxSpiError::TransferFailed(
                std::io::Error::last_os_error(),
            ));
        }
        Ok(())
    }
}

impl SpiBus for LinuxSpiBus {
    fn lock(&self, lock: bool) -> CoreResult<()> {
        if lock {
            self.lock.acquire()
        } else {
            self.lock.release().map_err(|e| {
                log::error!("linux_spi: Unlock of bus {} by a non-holder", self.config.bus);
                e
            })
        }
    }

    fn select(&self, devid: u32, selected: bool) -> CoreResult<()> {
        let mut state = self.state();
        if !selected {
            if state.selected == Some(devid) {
                state.selected = None;
            }
            return Ok(());
        }

        if !state.devices.contains_key(&devid) {
            let file = self.open_device(devid, state.mode, state.speed_hz)?;
            state.devices.insert(devid, file);
        }
        state.selected = Some(devid);
        Ok(())
    }

    fn send_block(&self, data: &[u8]) -> CoreResult<()> {
        self.send(data)?;
        Ok(())
    }

    fn set_frequency(&self, hz: u32) -> CoreResult<u32> {
        let actual = match self.config.max_speed_hz {
            Some(max) => hz.min(max),
            None => hz,
        };

        let mut state = self.state();
        for file in state.devices.values() {
            apply_speed(file, actual)?;
        }
        state.speed_hz = actual;
        log::debug!("linux_spi: Set speed to {} Hz", actual);
        Ok(actual)
    }

    fn set_mode(&self, mode: SpiMode) -> CoreResult<()> {
        let mut state = self.state();
        for file in state.devices.values() {
            apply_mode(file, mode)?;
        }
        state.mode = mode;
        Ok(())
    }
}

fn apply_mode(file: &File, mode: SpiMode) -> Result<()> {
    let raw = mode.as_u8();
    // SAFETY: fd is open for the lifetime of `file` and `raw` outlives the call
    unsafe {
        ioctl::spi_ioc_wr_mode(file.as_raw_fd(), &raw).map_err(|e| {
            LinuxSpiError::SetModeFailed {
                mode: raw,
                source: std::io::Error::from_raw_os_error(e as i32),
            }
        })?;
    }
    Ok(())
}

fn apply_speed(file: &File, speed: u32) -> Result<()> {
    // SAFETY: fd is open for the lifetime of `file` and `speed` outlives the call
    unsafe {
        ioctl::spi_ioc_wr_max_speed_hz(file.as_raw_fd(), &speed).map_err(|e| {
            LinuxSpiError::SetSpeedFailed {
                speed,
                source: std::io::Error::from_raw_os_error(e as i32),
            }
        })?;
    }
    Ok(())
}

/// Returns true if `dir` holds at least one node for controller `bus`
fn bus_present(dir: &Path, bus: u32) -> bool {
    let prefix = format!("spidev{}.", bus);
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_name().to_string_lossy().starts_with(&prefix)),
        Err(e) => {
            log::debug!("linux_spi: Cannot list {}: {}", dir.display(), e);
            false
        }
    }
}

/// Read the maximum kernel buffer size from sysfs, or use page size as fallback
fn get_max_kernel_buf_size() -> usize {
    if let Ok(content) = std::fs::read_to_string(BUF_SIZE_SYSFS) {
        if let Ok(size) = content.trim().parse::<usize>() {
            if size > 0 {
                return size;
            }
        }
        log::warn!("linux_spi: Invalid buffer size in {}", BUF_SIZE_SYSFS);
    }

    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    log::debug!("linux_spi: Using page size {} as buffer size", page_size);
    page_size
}

/// Parse bus options from a list of key-value pairs
///
/// Recognized keys: `bus` (controller number), `spispeed` (clock cap in
/// kHz) and `dir` (node directory).
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<LinuxSpiConfig, String> {
    let mut config = LinuxSpiConfig::default();

    for (key, value) in options {
        match *key {
            "bus" => {
                config.bus = value
                    .parse()
                    .map_err(|_| format!("Invalid bus value: {}", value))?;
            }
            "spispeed" => {
                let speed_khz: u32 = value
                    .parse()
                    .map_err(|_| format!("Invalid spispeed value: {}", value))?;
                config.max_speed_hz = Some(speed_khz.saturating_mul(1000));
            }
            "dir" => {
                config.dev_dir = PathBuf::from(value);
            }
            _ => {
                log::warn!("linux_spi: Unknown option: {}={}", key, value);
            }
        }
    }

    Ok(config)
}
