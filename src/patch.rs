//! Patch interpretation: rebuilds the new stream from a basis and a delta.

use std::io::{BufWriter, Read, Seek, SeekFrom, Write};

use crate::delta::{OP_COPY_N1_N1, OP_COPY_N8_N8, OP_LITERAL_N1};
use crate::error::{Error, Result};
use crate::{DELTA_MAGIC, pipe, read_exact_or_eof, wire};

const OP_LITERAL_N8: u8 = OP_LITERAL_N1 + 3;

/// Applies a delta stream to a seekable basis, writing the rebuilt stream
/// to `out`.
///
/// Copy commands seek `basis` to an arbitrary position; callers must not
/// rely on where the cursor ends up. End of the delta stream on a command
/// boundary is clean termination.
///
/// # Errors
/// Returns an error for a wrong magic, an undefined or reserved opcode, a
/// delta ending inside a command, or any reader/writer failure.
pub fn apply_delta<D, B, W>(mut delta: D, mut basis: B, out: W) -> Result<()>
where
    D: Read,
    B: Read + Seek,
    W: Write,
{
    let magic = wire::read_u32(&mut delta).map_err(|e| Error::truncated(e, "delta header"))?;
    if magic != DELTA_MAGIC {
        return Err(Error::NotDeltaMagic(magic));
    }

    let mut wr = BufWriter::with_capacity(64 * 1024, out);
    loop {
        let mut cmd = [0u8; 1];
        if read_exact_or_eof(&mut delta, &mut cmd)? == 0 {
            break;
        }
        match cmd[0] {
            op @ OP_LITERAL_N1..=OP_LITERAL_N8 => {
                let len_width = 1 << (op - OP_LITERAL_N1);
                let len = wire::read_uint(&mut delta, len_width)
                    .map_err(|e| Error::truncated(e, "literal length"))?;
                pipe(&mut delta, &mut wr, len)
                    .map_err(|e| Error::truncated(e, "literal payload"))?;
            }
            op @ OP_COPY_N1_N1..=OP_COPY_N8_N8 => {
                let grid = op - OP_COPY_N1_N1;
                let pos_width = 1 << (grid / 4);
                let len_width = 1 << (grid % 4);
                let basis_pos = wire::read_uint(&mut delta, pos_width)
                    .map_err(|e| Error::truncated(e, "copy position"))?;
                let len = wire::read_uint(&mut delta, len_width)
                    .map_err(|e| Error::truncated(e, "copy length"))?;
                basis.seek(SeekFrom::Start(basis_pos))?;
                pipe(&mut basis, &mut wr, len)?;
            }
            op => return Err(Error::InvalidOpcode(op)),
        }
    }
    wr.flush()?;
    Ok(())
}
