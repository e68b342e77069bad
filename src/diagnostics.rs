//! Human-readable byte-stream formatting for the diagnostic sinks.

use std::io::{self, Write};

/// Offset + hex + ASCII dump, 16 bytes per line.
///
/// # Errors
/// Any error from the writer.
pub fn hex_dump<W: Write>(w: &mut W, data: &[u8]) -> io::Result<()> {
    for (line, chunk) in data.chunks(16).enumerate() {
        write!(w, "    {:#06x}:", line * 16)?;
        for index in 0..16 {
            match chunk.get(index) {
                Some(byte) => write!(w, " {byte:02x}")?,
                None => write!(w, "   ")?,
            }
        }
        write!(w, "  ")?;
        for &byte in chunk {
            let c = if (0x20..=0x7e).contains(&byte) {
                byte as char
            } else {
                '.'
            };
            write!(w, "{c}")?;
        }
        writeln!(w)?;
    }
    Ok(())
}
