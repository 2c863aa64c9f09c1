//! Delta generation: scans a new stream against a basis signature and emits
//! the command stream.
//!
//! The scan drives the rolling buffer over NEW one byte at a time, probing
//! the signature index at every position. Hits advance by a whole block,
//! misses by one byte. Contiguous runs are coalesced into `MatchStat`
//! records first; the flush stage then encodes one command per record,
//! re-reading miss payloads from NEW by offset.

use std::io::{BufWriter, Read, Seek, SeekFrom, Write};

use crate::error::{Error, Result};
use crate::rolling::RollingChecksum;
use crate::rotate::{RotateBuffer, Stall};
use crate::sign::Signature;
use crate::{DELTA_MAGIC, pipe, strong_sum, wire};

/// First literal opcode; `OP_LITERAL_N1 + i` carries a `2^i`-byte length
/// field.
pub(crate) const OP_LITERAL_N1: u8 = 0x01;

/// First copy opcode: 1-byte position, 1-byte length. The copy opcodes form
/// a 4x4 grid indexed by position width then length width.
pub(crate) const OP_COPY_N1_N1: u8 = 0x45;

/// Last copy opcode: 8-byte position, 8-byte length.
pub(crate) const OP_COPY_N8_N8: u8 = 0x54;

/// One contiguous run of the new stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MatchStat {
    /// Bytes equal to the basis at `basis_pos`.
    Match { basis_pos: u64, len: u64 },
    /// Literal bytes, found at `new_pos` of the new stream.
    Miss { new_pos: u64, len: u64 },
}

/// Accumulates probe outcomes into coalesced [`MatchStat`] runs.
///
/// The pending slot starts empty and always holds the run under
/// construction; only closed runs reach `stats`, so the emitted sequence
/// never contains an empty or transient state.
#[derive(Debug, Default)]
struct Runs {
    stats: Vec<MatchStat>,
    pending: Option<MatchStat>,
}

impl Runs {
    /// Records `len` bytes matching the basis at `basis_pos`.
    fn matched(&mut self, basis_pos: u64, len: u64) {
        match self.pending {
            Some(MatchStat::Match {
                basis_pos: start,
                len: run,
            }) if start + run == basis_pos => {
                self.pending = Some(MatchStat::Match {
                    basis_pos: start,
                    len: run + len,
                });
            }
            Some(prev) => {
                if let MatchStat::Match {
                    basis_pos: start,
                    len: run,
                } = prev
                {
                    tracing::debug!(
                        prev_end = start + run,
                        next = basis_pos,
                        "adjacent matches not contiguous in basis"
                    );
                }
                self.stats.push(prev);
                self.pending = Some(MatchStat::Match { basis_pos, len });
            }
            None => self.pending = Some(MatchStat::Match { basis_pos, len }),
        }
    }

    /// Records one literal byte at `new_pos`.
    fn missed(&mut self, new_pos: u64) {
        match self.pending {
            Some(MatchStat::Miss {
                new_pos: start,
                len,
            }) => {
                self.pending = Some(MatchStat::Miss {
                    new_pos: start,
                    len: len + 1,
                });
            }
            Some(prev) => {
                self.stats.push(prev);
                self.pending = Some(MatchStat::Miss { new_pos, len: 1 });
            }
            None => self.pending = Some(MatchStat::Miss { new_pos, len: 1 }),
        }
    }

    fn finish(mut self) -> Vec<MatchStat> {
        if let Some(last) = self.pending.take() {
            self.stats.push(last);
        }
        self.stats
    }
}

/// Generates a delta that rebuilds `new` from the basis described by `sig`.
///
/// `new` must seek: miss payloads are re-read by offset during the flush
/// stage. The delta is written to `out` as a self-describing command
/// stream.
///
/// # Errors
/// Returns an error if reading `new` or writing the delta fails.
pub fn generate_delta<R, W>(sig: &Signature, mut new: R, out: W) -> Result<()>
where
    R: Read + Seek,
    W: Write,
{
    let stats = scan(sig, RotateBuffer::new(&mut new, sig.block_len() as usize))?;
    flush(&stats, &mut new, out)
}

/// Probes the index for the window at `pos`. The weak digest acts as an
/// existence filter before the strong sum is computed.
fn probe(sig: &Signature, weak: u32, window: &[u8], pos: u64) -> Option<u64> {
    if !sig.contains_weak(weak) {
        return None;
    }
    sig.find(weak, &strong_sum(window, sig.strong_sum_len()), pos)
}

fn scan<R: Read>(sig: &Signature, mut rb: RotateBuffer<R>) -> Result<Vec<MatchStat>> {
    let mut runs = Runs::default();
    let mut weak = RollingChecksum::new();

    match rb.roll_first() {
        Ok((window, _)) => weak.update(window),
        Err(Stall::NoBytesLeft) => return Ok(runs.finish()),
        Err(Stall::NotEnoughBytes) => {
            scan_tail(sig, &mut rb, &mut runs);
            return Ok(runs.finish());
        }
        Err(Stall::Io(e)) => return Err(e.into()),
    }

    loop {
        let pos = rb.abs_head();
        let window_len = rb.window().len() as u64;
        let stall = if let Some(basis_pos) = probe(sig, weak.digest(), rb.window(), pos) {
            runs.matched(basis_pos, window_len);
            match rb.roll_block() {
                Ok((window, _)) => {
                    weak.reset();
                    weak.update(window);
                    continue;
                }
                Err(stall) => stall,
            }
        } else {
            runs.missed(pos);
            match rb.roll_byte() {
                Ok((window, out, _)) => {
                    weak.rotate(out, window[window.len() - 1]);
                    continue;
                }
                Err(stall) => stall,
            }
        };
        match stall {
            Stall::NoBytesLeft => break,
            Stall::NotEnoughBytes => {
                scan_tail(sig, &mut rb, &mut runs);
                break;
            }
            Stall::Io(e) => return Err(e.into()),
        }
    }
    let stats = runs.finish();
    tracing::debug!(runs = stats.len(), new_len = rb.abs_tail(), "scan complete");
    Ok(stats)
}

/// Tail mode: probes successively shorter windows over the final
/// sub-block bytes. A match covers everything still unaccounted and ends
/// the scan.
fn scan_tail<R: Read>(sig: &Signature, rb: &mut RotateBuffer<R>, runs: &mut Runs) {
    let mut weak = RollingChecksum::new();
    weak.update(rb.window());
    while !rb.window().is_empty() {
        let pos = rb.abs_head();
        if let Some(basis_pos) = probe(sig, weak.digest(), rb.window(), pos) {
            runs.matched(basis_pos, rb.window().len() as u64);
            return;
        }
        runs.missed(pos);
        match rb.roll_left() {
            Ok((_, out, _)) => weak.rollout(out),
            Err(_) => return,
        }
    }
}

fn flush<R, W>(stats: &[MatchStat], new: &mut R, out: W) -> Result<()>
where
    R: Read + Seek,
    W: Write,
{
    let mut wr = BufWriter::new(out);
    wire::write_u32(&mut wr, DELTA_MAGIC)?;
    for stat in stats {
        match *stat {
            MatchStat::Match { basis_pos, len } => {
                let pos_width = wire::min_width(basis_pos);
                let len_width = wire::min_width(len);
                wr.write_all(&[OP_COPY_N1_N1 + 4 * width_index(pos_width) + width_index(len_width)])?;
                wire::write_uint(&mut wr, basis_pos, pos_width)?;
                wire::write_uint(&mut wr, len, len_width)?;
            }
            MatchStat::Miss { new_pos, len } => {
                let len_width = wire::min_width(len);
                wr.write_all(&[OP_LITERAL_N1 + width_index(len_width)])?;
                wire::write_uint(&mut wr, len, len_width)?;
                new.seek(SeekFrom::Start(new_pos))?;
                pipe(new, &mut wr, len)
                    .map_err(|e| Error::truncated(e, "new stream at a recorded miss"))?;
            }
        }
    }
    wr.flush()?;
    Ok(())
}

/// Grid index of a field width: 1, 2, 4, 8 map to 0..=3.
#[allow(clippy::cast_possible_truncation)]
const fn width_index(width: usize) -> u8 {
    width.trailing_zeros() as u8
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sign::load_signature;
    use crate::generate_signature_with_options;
    use std::io::Cursor;

    fn signature(basis: &[u8], block_len: u32) -> Signature {
        let mut stream = Vec::new();
        generate_signature_with_options(basis, basis.len() as u64, block_len, 32, &mut stream)
            .unwrap();
        load_signature(Cursor::new(stream)).unwrap()
    }

    fn scan_stats(basis: &[u8], new: &[u8], block_len: u32) -> Vec<MatchStat> {
        let sig = signature(basis, block_len);
        scan(&sig, RotateBuffer::new(new, block_len as usize)).unwrap()
    }

    #[test]
    fn coalesces_contiguous_matches() {
        let mut runs = Runs::default();
        runs.matched(0, 4);
        runs.matched(4, 4);
        runs.matched(8, 2);
        assert_eq!(
            runs.finish(),
            vec![MatchStat::Match {
                basis_pos: 0,
                len: 10
            }]
        );
    }

    #[test]
    fn keeps_non_contiguous_matches_apart() {
        let mut runs = Runs::default();
        runs.matched(0, 4);
        runs.matched(0, 4);
        runs.matched(12, 4);
        assert_eq!(
            runs.finish(),
            vec![
                MatchStat::Match {
                    basis_pos: 0,
                    len: 4
                },
                MatchStat::Match {
                    basis_pos: 0,
                    len: 4
                },
                MatchStat::Match {
                    basis_pos: 12,
                    len: 4
                },
            ]
        );
    }

    #[test]
    fn coalesces_miss_runs() {
        let mut runs = Runs::default();
        runs.missed(0);
        runs.missed(1);
        runs.missed(2);
        runs.matched(8, 4);
        runs.missed(7);
        assert_eq!(
            runs.finish(),
            vec![
                MatchStat::Miss { new_pos: 0, len: 3 },
                MatchStat::Match {
                    basis_pos: 8,
                    len: 4
                },
                MatchStat::Miss { new_pos: 7, len: 1 },
            ]
        );
    }

    #[test]
    fn identity_scan_is_one_match() {
        let basis = b"abcdefghijklmnop";
        assert_eq!(
            scan_stats(basis, basis, 4),
            vec![MatchStat::Match {
                basis_pos: 0,
                len: 16
            }]
        );
    }

    #[test]
    fn identity_scan_with_short_tail_coalesces() {
        let basis: Vec<u8> = (0..50).collect();
        assert_eq!(
            scan_stats(&basis, &basis, 16),
            vec![MatchStat::Match {
                basis_pos: 0,
                len: 50
            }]
        );
    }

    #[test]
    fn disjoint_scan_is_one_miss() {
        let stats = scan_stats(b"1234567890", b"0987654321", 2);
        assert_eq!(
            stats,
            vec![MatchStat::Miss {
                new_pos: 0,
                len: 10
            }]
        );
    }

    #[test]
    fn stats_cover_the_new_stream_in_order() {
        let basis: Vec<u8> = (0..200).collect();
        let mut new = basis.clone();
        new.splice(64..64, [0xAA; 7]);
        new.drain(130..140);

        for block_len in [1u32, 3, 16, 64] {
            let stats = scan_stats(&basis, &new, block_len);
            let mut cursor = 0u64;
            for stat in &stats {
                match *stat {
                    MatchStat::Match { len, .. } => cursor += len,
                    MatchStat::Miss { new_pos, len } => {
                        assert_eq!(new_pos, cursor);
                        cursor += len;
                    }
                }
            }
            assert_eq!(cursor, new.len() as u64, "block_len {block_len}");
        }
    }

    #[test]
    fn empty_new_stream_flushes_header_only() {
        let sig = signature(b"some basis", 4);
        let mut delta = Vec::new();
        generate_delta(&sig, Cursor::new(&b""[..]), &mut delta).unwrap();
        assert_eq!(delta, DELTA_MAGIC.to_be_bytes());
    }

    #[test]
    fn tail_match_short_circuits() {
        // NEW equals the short final block of the basis
        let basis = b"aabbccddee-tail";
        let stats = scan_stats(basis, b"-tail", 10);
        assert_eq!(
            stats,
            vec![MatchStat::Match {
                basis_pos: 10,
                len: 5
            }]
        );
    }
}
