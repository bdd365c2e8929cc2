//! Pseudo filesystem for character drivers
//!
//! Drivers register an operation table ([`FileOperations`]) under a mount
//! path. Clients open the path and get a [`File`] whose calls are forwarded
//! to the table, much like NuttX's `register_driver()` and the VFS.
//!
//! Registration needs `&mut DevFs`; it happens during bootstrap. Once all
//! drivers are registered the filesystem can be shared read-only between
//! tasks without further locking.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;

use bitflags::bitflags;

use crate::error::{Error, Result};

/// Access mode used for character drivers (`rw-rw-rw-`)
pub const DEFAULT_MODE: u16 = 0o666;

bitflags! {
    /// Flags passed to [`DevFs::open`]
    ///
    /// Values follow NuttX: `O_RDONLY` is 1, `O_WRONLY` is 2.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        /// Open for reading
        const RDONLY = 1 << 0;
        /// Open for writing
        const WRONLY = 1 << 1;
        /// Open for reading and writing
        const RDWR = Self::RDONLY.bits() | Self::WRONLY.bits();
    }
}

/// Operation table of a character driver
///
/// Seek, ioctl and poll are not part of the table: devices registered here
/// never support them.
pub trait FileOperations: Send + Sync {
    /// Called when a client opens the device
    fn open(&self) -> Result<()>;

    /// Called when a client closes the device
    fn close(&self) -> Result<()>;

    /// Read from the device into `buf`, returning the number of bytes read
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write `buf` to the device, returning the number of bytes written
    fn write(&self, buf: &[u8]) -> Result<usize>;
}

struct Inode {
    ops: Arc<dyn FileOperations>,
    mode: u16,
}

/// Path → driver table
#[derive(Default)]
pub struct DevFs {
    inodes: BTreeMap<String, Inode>,
}

impl DevFs {
    /// Create an empty filesystem
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ops` under `path` with access `mode`
    ///
    /// Fails with [`Error::InvalidPath`] for malformed paths and
    /// [`Error::AlreadyExists`] if the path is taken. The filesystem is
    /// unchanged on failure.
    pub fn register_driver(
        &mut self,
        path: &str,
        ops: Arc<dyn FileOperations>,
        mode: u16,
    ) -> Result<()> {
        self.check_path(path)?;
        self.inodes.insert(path.to_string(), Inode { ops, mode });
        log::debug!("devfs: registered {} (mode {:o})", path, mode);
        Ok(())
    }

    /// Check that `path` is well-formed and not yet taken
    pub fn check_path(&self, path: &str) -> Result<()> {
        validate_path(path)?;
        if self.inodes.contains_key(path) {
            return Err(Error::AlreadyExists);
        }
        Ok(())
    }

    /// Returns true if a driver is registered at `path`
    pub fn contains(&self, path: &str) -> bool {
        self.inodes.contains_key(path)
    }

    /// Number of registered drivers
    pub fn len(&self) -> usize {
        self.inodes.len()
    }

    /// Returns true if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.inodes.is_empty()
    }

    /// Registered paths in lexical order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.inodes.keys().map(String::as_str)
    }

    /// Open the driver registered at `path`
    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<File> {
        let inode = self.inodes.get(path).ok_or(Error::NotFound)?;

        if flags.is_empty() {
            return Err(Error::BadDescriptor);
        }
        if flags.contains(OpenFlags::RDONLY) && inode.mode & 0o444 == 0 {
            return Err(Error::PermissionDenied);
        }
        if flags.contains(OpenFlags::WRONLY) && inode.mode & 0o222 == 0 {
            return Err(Error::PermissionDenied);
        }

        inode.ops.open()?;

        Ok(File {
            ops: Arc::clone(&inode.ops),
            flags,
            closed: false,
        })
    }
}

fn validate_path(path: &str) -> Result<()> {
    let valid = path.len() > 1
        && path.starts_with('/')
        && !path.ends_with('/')
        && !path.contains("//");
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidPath)
    }
}

/// Open handle to a registered driver
///
/// Dropping the handle closes it; use [`File::close`] to observe the
/// driver's close result.
pub struct File {
    ops: Arc<dyn FileOperations>,
    flags: OpenFlags,
    closed: bool,
}

impl File {
    /// Flags the file was opened with
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// Read into `buf`
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if !self.flags.contains(OpenFlags::RDONLY) {
            return Err(Error::BadDescriptor);
        }
        self.ops.read(buf)
    }

    /// Write `buf`
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if !self.flags.contains(OpenFlags::WRONLY) {
            return Err(Error::BadDescriptor);
        }
        self.ops.write(buf)
    }

    /// Close the file, returning the driver's result
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.ops.close()
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.ops.close() {
            log::warn!("devfs: close failed: {}", e);
        }
    }
}

impl embedded_io::ErrorType for File {
    type Error = Error;
}

impl embedded_io::Write for File {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        File::write(self, buf)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl embedded_io::Read for File {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        File::read(self, buf)
    }
}
