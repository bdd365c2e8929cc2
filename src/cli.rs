//! CLI argument parsing

use crate::board::DENIS_PATH;
use crate::buses;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a byte count as hex or decimal
fn parse_len(s: &str) -> Result<usize, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<usize>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Generate dynamic help text for the bus argument
fn bus_help() -> String {
    format!("Bus backend to use [available: {}]", buses::bus_names_short())
}

#[derive(Parser)]
#[command(name = "denis")]
#[command(author, version, about = "Write-only SPI character device", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Bus backend spec, e.g. "dummy" or "linux_spi:spispeed=1000"
    #[arg(short, long, global = true, default_value = "dummy", help = bus_help())]
    pub bus: String,

    /// Board description file (TOML). Defaults to /dev/denis0 on bus 1
    #[arg(long, global = true)]
    pub board: Option<PathBuf>,

    /// Put every board device on this bus number
    #[arg(long, global = true)]
    pub busno: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a message or file to a device
    Write {
        /// Device node
        #[arg(short, long, default_value = DENIS_PATH)]
        path: String,

        /// Read the payload from a file instead
        #[arg(short, long, conflicts_with = "message")]
        file: Option<PathBuf>,

        /// Append a newline to the message
        #[arg(short, long)]
        newline: bool,

        /// Message to send
        #[arg(required_unless_present = "file")]
        message: Option<String>,
    },

    /// Try to read from a device
    Read {
        /// Device node
        #[arg(short, long, default_value = DENIS_PATH)]
        path: String,

        /// Bytes to request (hex or decimal)
        #[arg(short, long, default_value = "64", value_parser = parse_len)]
        len: usize,
    },

    /// List registered devices
    List,

    /// Bring up the stock board and open /dev/denis0
    TestTask {
        /// Also write this message after opening
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List supported bus backends
    ListBuses,
}
