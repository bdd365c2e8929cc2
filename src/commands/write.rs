//! Write command implementation

use denis_core::{DevFs, OpenFlags};

/// Open `path` write-only and send `payload` as one block
pub fn run_write(fs: &DevFs, path: &str, payload: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    let file = fs.open(path, OpenFlags::WRONLY)?;
    let written = file.write(payload)?;
    file.close()?;

    println!("Wrote {} bytes to {}", written, path);
    Ok(())
}
