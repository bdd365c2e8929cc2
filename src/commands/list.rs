//! List commands implementation

use denis_core::Registry;

use crate::buses;

/// List registered devices, newest first
pub fn list_devices(registry: &Registry) {
    if registry.is_empty() {
        println!("No devices registered");
        return;
    }

    println!(
        "{:<16} {:>6} {:>10} {:>6} {:>8} {:>8} {:>7}",
        "Path", "CS", "Clock", "Mode", "Writes", "Bytes", "Errors"
    );
    println!("{}", "-".repeat(67));

    for entry in registry.iter() {
        let device = entry.device();
        let config = device.config();
        let stats = device.stats();
        println!(
            "{:<16} {:>6} {:>10} {:>6} {:>8} {:>8} {:>7}",
            entry.path(),
            config.spi_devid,
            format_frequency(config.frequency),
            config.mode.as_u8(),
            stats.writes,
            stats.bytes,
            stats.errors
        );
    }
}

/// List bus backends compiled into this binary
pub fn list_buses() {
    let buses = buses::available_buses();
    if buses.is_empty() {
        println!("No bus backends available (recompile with backend features enabled)");
        return;
    }

    println!("Available bus backends:");
    println!();
    for bus in &buses {
        if bus.aliases.is_empty() {
            println!("  {:12} - {}", bus.name, bus.description);
        } else {
            println!(
                "  {:12} - {} (aliases: {})",
                bus.name,
                bus.description,
                bus.aliases.join(", ")
            );
        }
    }
}

fn format_frequency(hz: u32) -> String {
    if hz >= 1_000_000 && hz % 1_000_000 == 0 {
        format!("{} MHz", hz / 1_000_000)
    } else if hz >= 1_000 && hz % 1_000 == 0 {
        format!("{} kHz", hz / 1_000)
    } else {
        format!("{} Hz", hz)
    }
}
