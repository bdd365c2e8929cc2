//! denis - Write-only SPI character device
//!
//! Host-side front end for the Denis driver. It boots a board (the stock
//! `/dev/denis0` on bus 1, or whatever a board file describes) on top of a
//! selectable bus backend and then runs one command against it.
//!
//! # Architecture
//!
//! - **denis-core** holds the driver: registry, device nodes and the
//!   locked transfer sequence. It knows nothing about hardware.
//! - **Bus backends** (dummy, linux_spi) implement the transport contract
//!   and are chosen at runtime with `--bus`.
//! - **Board** code decides which devices exist and on which bus.

mod board;
mod buses;
mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use denis_core::{DevFs, Registry};

use board::{BoardConfig, BusFactory};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logger; RUST_LOG still overrides the verbosity flags
    env_logger::Builder::new()
        .filter_level(log_level(cli.verbose))
        .parse_default_env()
        .init();

    let result = match cli.command {
        Commands::ListBuses => {
            commands::list_buses();
            Ok(())
        }
        Commands::TestTask { ref message } => {
            let mut factory = buses::open_factory(&cli.bus)?;
            let busno = cli.busno.unwrap_or(board::DEFAULT_BUSNO);
            commands::run_test_task(factory.as_mut(), busno, message.as_deref()).map(|_| ())
        }
        Commands::List => {
            let mut factory = buses::open_factory(&cli.bus)?;
            let (_fs, registry) = boot(&cli, factory.as_mut())?;
            commands::list_devices(&registry);
            Ok(())
        }
        Commands::Write {
            ref path,
            ref file,
            newline,
            ref message,
        } => {
            let mut payload = match (file, message) {
                (Some(file), _) => std::fs::read(file)?,
                (None, Some(message)) => message.clone().into_bytes(),
                (None, None) => Vec::new(),
            };
            if newline {
                payload.push(b'\n');
            }

            let mut factory = buses::open_factory(&cli.bus)?;
            let (fs, _registry) = boot(&cli, factory.as_mut())?;
            commands::run_write(&fs, path, &payload)
        }
        Commands::Read { ref path, len } => {
            let mut factory = buses::open_factory(&cli.bus)?;
            let (fs, _registry) = boot(&cli, factory.as_mut())?;
            commands::run_read(&fs, path, len)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Log level selected by the number of `-v` flags
fn log_level(verbose: u8) -> log::LevelFilter {
    match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

/// Register the board's devices on a fresh filesystem
fn boot(
    cli: &Cli,
    factory: &mut dyn BusFactory,
) -> Result<(DevFs, Registry), Box<dyn std::error::Error>> {
    let mut board = match &cli.board {
        Some(path) => BoardConfig::load(path)?,
        None => BoardConfig::default(),
    };
    if let Some(busno) = cli.busno {
        board = board.with_busno(busno);
    }

    let mut fs = DevFs::new();
    let mut registry = Registry::new();
    board::bring_up(&board, &mut fs, &mut registry, factory)?;
    log::debug!("Board up with {} device(s)", registry.len());

    Ok((fs, registry))
}
