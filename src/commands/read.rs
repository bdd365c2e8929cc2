//! Read command implementation
//!
//! Denis devices are write-only. The command exists to exercise that
//! contract from the shell: it opens the node read-only and reports what
//! the driver answers.

use denis_core::{DevFs, OpenFlags};

/// Try to read `len` bytes from `path`
pub fn run_read(fs: &DevFs, path: &str, len: usize) -> Result<(), Box<dyn std::error::Error>> {
    let file = fs.open(path, OpenFlags::RDONLY)?;
    let mut buf = vec![0u8; len];

    match file.read(&mut buf) {
        Ok(n) => {
            println!("Read {} bytes from {}", n, path);
            print!("{}", denis_core::HexDump(&buf[..n]));
            Ok(())
        }
        Err(e) => {
            println!("Read from {} failed: {} (errno {})", path, e, e.errno());
            Err(e.into())
        }
    }
}
