//! Signature generation, loading and block lookup.
//!
//! A signature stream carries a header followed by one `(weak, strong)`
//! checksum pair per basis block. The loader groups entries into weak-sum
//! buckets ordered by strong sum, which the delta scanner probes through
//! [`Signature::find`].

use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::{BufWriter, Read, Write};

use crate::error::{Error, Result};
use crate::rolling::RollingChecksum;
use crate::{
    DEFAULT_BLOCK_LEN, DEFAULT_STRONG_SUM_LEN, SIGNATURE_MAGIC, read_exact_or_eof, strong_sum,
    wire,
};

/// Checksums of one basis block.
#[derive(Clone, Debug, PartialEq, Eq)]
struct BlockSignature {
    /// Zero-based block index; the block covers basis offset
    /// `index * block_len`.
    index: u64,
    strong: Vec<u8>,
}

/// Parsed signature of a basis stream, indexed for lookup.
///
/// Immutable once loaded; lookups borrow.
#[derive(Clone, Debug, Default)]
pub struct Signature {
    block_len: u32,
    strong_sum_len: u32,
    basis_len: u64,
    blocks: u64,
    buckets: HashMap<u32, Vec<BlockSignature>>,
    /// First and last source block index per weak sum; consulted only as an
    /// existence oracle before the strong sum is computed.
    ranges: HashMap<u32, (u64, u64)>,
}

impl Signature {
    #[must_use]
    pub fn block_len(&self) -> u32 {
        self.block_len
    }

    #[must_use]
    pub fn strong_sum_len(&self) -> u32 {
        self.strong_sum_len
    }

    /// Length of the basis stream the signature was generated from.
    #[must_use]
    pub fn basis_len(&self) -> u64 {
        self.basis_len
    }

    /// Number of indexed blocks.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.blocks
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks == 0
    }

    /// Whether any block carries this weak sum.
    #[must_use]
    pub fn contains_weak(&self, weak: u32) -> bool {
        self.ranges.contains_key(&weak)
    }

    /// Looks up the basis offset of a block matching both checksums.
    ///
    /// When several blocks share the strong sum, the one whose offset is
    /// closest to `probe_pos` wins (ties to the smaller block index), so
    /// that consecutive matches have the best chance of being physically
    /// contiguous and coalescing into one copy command.
    #[must_use]
    pub fn find(&self, weak: u32, strong: &[u8], probe_pos: u64) -> Option<u64> {
        let bucket = self.buckets.get(&weak)?;
        search(bucket, strong, probe_pos, u64::from(self.block_len))
    }
}

/// Binary search on the strong sum, then an outward walk picking the entry
/// closest to `probe_pos`. An entry sitting exactly at the probe position
/// short-circuits.
fn search(bucket: &[BlockSignature], strong: &[u8], probe_pos: u64, block_len: u64) -> Option<u64> {
    let offset = |i: usize| bucket[i].index * block_len;

    let (mut lo, mut hi) = (0, bucket.len());
    let mut found = None;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match strong.cmp(&bucket[mid].strong) {
            Ordering::Equal => {
                if offset(mid) == probe_pos {
                    return Some(probe_pos);
                }
                found = Some(mid);
                break;
            }
            Ordering::Greater => lo = mid + 1,
            Ordering::Less => hi = mid,
        }
    }
    let found = found?;

    let mut best = found;
    let mut best_dist = offset(found).abs_diff(probe_pos);
    for idx in (0..found).rev() {
        if bucket[idx].strong[..] != *strong {
            break;
        }
        let dist = offset(idx).abs_diff(probe_pos);
        if dist <= best_dist {
            best_dist = dist;
            best = idx;
        } else {
            break;
        }
    }
    for idx in found + 1..bucket.len() {
        if bucket[idx].strong[..] != *strong {
            break;
        }
        let dist = offset(idx).abs_diff(probe_pos);
        if dist < best_dist {
            best_dist = dist;
            best = idx;
        } else {
            break;
        }
    }
    Some(offset(best))
}

/// Generates a signature of `basis` with the default block and strong sum
/// lengths.
///
/// `basis_len` is the total length of the stream, recorded in the header.
///
/// # Errors
/// Returns an error if reading the basis or writing the signature fails.
pub fn generate_signature<R: Read, W: Write>(basis: R, basis_len: u64, out: W) -> Result<()> {
    generate_signature_with_options(basis, basis_len, DEFAULT_BLOCK_LEN, DEFAULT_STRONG_SUM_LEN, out)
}

/// Generates a signature of `basis`.
///
/// A `block_len` of 0 falls back to [`DEFAULT_BLOCK_LEN`]. `strong_sum_len`
/// must be 32 or 64. The final block may be shorter than `block_len`; its
/// checksums cover the bytes actually read.
///
/// # Errors
/// Returns an error for an unsupported `strong_sum_len`, or if reading the
/// basis or writing the signature fails.
pub fn generate_signature_with_options<R: Read, W: Write>(
    mut basis: R,
    basis_len: u64,
    block_len: u32,
    strong_sum_len: u32,
    out: W,
) -> Result<()> {
    let block_len = if block_len == 0 { DEFAULT_BLOCK_LEN } else { block_len };
    if strong_sum_len != 32 && strong_sum_len != 64 {
        return Err(Error::InvalidSumLength(strong_sum_len));
    }

    let mut wr = BufWriter::new(out);
    wire::write_u32(&mut wr, SIGNATURE_MAGIC)?;
    wire::write_u32(&mut wr, block_len)?;
    wire::write_u32(&mut wr, strong_sum_len)?;
    wire::write_uint(&mut wr, basis_len, 8)?;

    let mut buf = vec![0u8; block_len as usize];
    loop {
        let n = read_exact_or_eof(&mut basis, &mut buf)?;
        if n == 0 {
            break;
        }
        let block = &buf[..n];
        wire::write_u32(&mut wr, RollingChecksum::compute(block))?;
        wr.write_all(&strong_sum(block, strong_sum_len))?;
        if n < buf.len() {
            break;
        }
    }
    wr.flush()?;
    Ok(())
}

/// Parses a signature stream and builds the lookup index.
///
/// # Errors
/// Returns an error for a wrong magic, out-of-range header fields, or a
/// stream that ends inside a field.
pub fn load_signature<R: Read>(mut rd: R) -> Result<Signature> {
    let magic = wire::read_u32(&mut rd).map_err(|e| Error::truncated(e, "signature header"))?;
    if magic != SIGNATURE_MAGIC {
        return Err(Error::NotSignatureMagic(magic));
    }
    let block_len = wire::read_u32(&mut rd).map_err(|e| Error::truncated(e, "signature header"))?;
    let strong_sum_len =
        wire::read_u32(&mut rd).map_err(|e| Error::truncated(e, "signature header"))?;
    let basis_len =
        wire::read_uint(&mut rd, 8).map_err(|e| Error::truncated(e, "signature header"))?;

    if block_len == 0 {
        return Err(Error::InvalidBlockLength(block_len));
    }
    if strong_sum_len != 32 && strong_sum_len != 64 {
        return Err(Error::InvalidSumLength(strong_sum_len));
    }

    let mut sig = Signature {
        block_len,
        strong_sum_len,
        basis_len,
        ..Signature::default()
    };
    if basis_len == 0 {
        return Ok(sig);
    }

    let mut index = 0u64;
    loop {
        let mut weak_buf = [0u8; 4];
        let n = read_exact_or_eof(&mut rd, &mut weak_buf)?;
        if n == 0 {
            break;
        }
        if n < weak_buf.len() {
            return Err(Error::Truncated("weak sum"));
        }
        let weak = u32::from_be_bytes(weak_buf);

        let mut strong = vec![0u8; strong_sum_len as usize];
        rd.read_exact(&mut strong)
            .map_err(|e| Error::truncated(e, "strong sum"))?;

        sig.buckets
            .entry(weak)
            .or_default()
            .push(BlockSignature { index, strong });
        sig.ranges
            .entry(weak)
            .and_modify(|range| range.1 = index)
            .or_insert((index, index));
        index += 1;
    }
    sig.blocks = index;

    for bucket in sig.buckets.values_mut() {
        bucket.sort_unstable_by(|a, b| a.strong.cmp(&b.strong).then(a.index.cmp(&b.index)));
    }

    tracing::debug!(
        blocks = sig.blocks,
        block_len,
        strong_sum_len,
        basis_len,
        "signature loaded"
    );
    Ok(sig)
}
