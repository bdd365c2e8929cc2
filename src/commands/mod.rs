//! CLI command implementations
//!
//! Every command works on a booted board: a `DevFs` holding the device
//! nodes and the `Registry` of driver instances behind them.

mod list;
mod read;
mod test_task;
mod write;

pub use list::{list_buses, list_devices};
pub use read::run_read;
pub use test_task::run_test_task;
pub use write::run_write;
