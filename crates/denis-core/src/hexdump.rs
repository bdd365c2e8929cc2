//! Hex + ASCII rendering of written buffers for diagnostics
//!
//! Layout per line: sixteen `XX ` cells split into two groups of eight by
//! an extra space, then `|  ` and the printable ASCII column. Short final
//! lines are padded so the ASCII column stays aligned.

use core::fmt;

const BYTES_PER_LINE: usize = 16;
const GROUP: usize = 8;

/// Display adapter rendering a byte slice as a hex dump
#[derive(Debug, Clone, Copy)]
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.0.chunks(BYTES_PER_LINE) {
            for (i, byte) in line.iter().enumerate() {
                write!(f, "{:02X} ", byte)?;
                if (i + 1) % GROUP == 0 && i + 1 != line.len() {
                    f.write_str(" ")?;
                }
            }
            f.write_str(" ")?;

            if line.len() < BYTES_PER_LINE {
                if line.len() <= GROUP {
                    f.write_str(" ")?;
                }
                for _ in line.len()..BYTES_PER_LINE {
                    f.write_str("   ")?;
                }
            }

            f.write_str("|  ")?;
            for &byte in line {
                let c = if (b' '..=b'~').contains(&byte) {
                    byte as char
                } else {
                    '.'
                };
                write!(f, "{}", c)?;
            }
            f.write_str(" \n")?;
        }
        Ok(())
    }
}
