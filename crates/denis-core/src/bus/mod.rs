//! SPI bus transport abstraction
//!
//! The driver only talks to hardware through [`SpiBus`]. Board code
//! provides the implementation for a given bus index.

mod guard;
mod traits;

pub use guard::{BusLock, ChipSelect};
pub use traits::*;
