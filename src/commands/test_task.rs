//! Test task
//!
//! Brings up the stock board and opens `/dev/denis0` read-write, the way a
//! board bring-up smoke test does on target.

use denis_core::{DevFs, OpenFlags, Registry};

use crate::board::{self, BusFactory, DENIS_PATH};

/// Run the test task against a fresh filesystem and registry
///
/// Returns the filesystem and registry so callers can inspect the result.
pub fn run_test_task(
    factory: &mut dyn BusFactory,
    busno: u32,
    message: Option<&str>,
) -> Result<(DevFs, Registry), Box<dyn std::error::Error>> {
    println!("Test Task started!");

    let mut fs = DevFs::new();
    let mut registry = Registry::new();

    if let Err(e) = board::initialize(&mut fs, &mut registry, factory, busno) {
        println!("Failed to initialize Denis: {}", e);
        return Err(e.into());
    }

    println!("Opening '{}' for write", DENIS_PATH);
    let file = match fs.open(DENIS_PATH, OpenFlags::RDWR) {
        Ok(file) => file,
        Err(e) => {
            println!("Failed to open {}: {}", DENIS_PATH, e.errno());
            return Err(e.into());
        }
    };

    if let Some(message) = message {
        let written = file.write(message.as_bytes())?;
        println!("Wrote {} bytes", written);
    }
    file.close()?;

    println!("Done!");
    Ok((fs, registry))
}
