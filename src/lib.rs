//! Streaming rsync-style delta encoding.
//!
//! Given two byte streams BASIS and NEW, this crate produces a compact delta
//! such that applying the delta to BASIS reconstructs NEW, transferring only
//! content that is not already present in BASIS. Matching works at block
//! granularity: a cheap rolling weak checksum locates candidate blocks at any
//! byte offset, and a BLAKE3 strong checksum confirms them.
//!
//! The pipeline has three stages, each a self-describing byte stream:
//!
//! 1. [`generate_signature`] digests BASIS into a signature stream;
//! 2. [`generate_delta`] scans NEW against a loaded [`Signature`] and emits
//!    the delta command stream;
//! 3. [`apply_delta`] replays the commands against a seekable BASIS.
//!
//! ```
//! use std::io::Cursor;
//!
//! let basis = b"the quick brown fox jumps over the lazy dog";
//! let new = b"the quick brown cat jumps over the lazy dog";
//!
//! let mut sig_stream = Vec::new();
//! rollsync::generate_signature_with_options(&basis[..], basis.len() as u64, 4, 32, &mut sig_stream)?;
//! let sig = rollsync::load_signature(Cursor::new(&sig_stream))?;
//!
//! let mut delta = Vec::new();
//! rollsync::generate_delta(&sig, Cursor::new(&new[..]), &mut delta)?;
//!
//! let mut rebuilt = Vec::new();
//! rollsync::apply_delta(Cursor::new(&delta), Cursor::new(&basis[..]), &mut rebuilt)?;
//! assert_eq!(rebuilt, new);
//! # Ok::<(), rollsync::Error>(())
//! ```

pub mod rolling;

mod delta;
mod error;
mod patch;
mod rotate;
mod sign;
mod wire;

pub use delta::generate_delta;
pub use error::{Error, Result};
pub use patch::apply_delta;
pub use sign::{Signature, generate_signature, generate_signature_with_options, load_signature};

/// Magic prefix of a signature stream.
pub const SIGNATURE_MAGIC: u32 = 0x7273_0137;

/// Magic prefix of a delta stream.
pub const DELTA_MAGIC: u32 = 0x7273_0236;

/// Block length used when the caller passes 0.
pub const DEFAULT_BLOCK_LEN: u32 = 2048;

/// Strong checksum length used by [`generate_signature`].
pub const DEFAULT_STRONG_SUM_LEN: u32 = 32;

/// Reads exactly `buf.len()` bytes or until EOF, returning the number of bytes read.
fn read_exact_or_eof<R: std::io::Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// BLAKE3 strong checksum of `chunk`: 32 bytes from the plain digest, 64 via
/// the extended output reader.
pub(crate) fn strong_sum(chunk: &[u8], sum_len: u32) -> Vec<u8> {
    if sum_len == 64 {
        let mut out = vec![0u8; 64];
        let mut hasher = blake3::Hasher::new();
        hasher.update(chunk);
        hasher.finalize_xof().fill(&mut out);
        out
    } else {
        blake3::hash(chunk).as_bytes().to_vec()
    }
}

/// Streams `len` bytes from `rd` to `wr` through a fixed staging buffer.
pub(crate) fn pipe<R: std::io::Read, W: std::io::Write>(
    rd: &mut R,
    wr: &mut W,
    len: u64,
) -> std::io::Result<()> {
    let mut staged = [0u8; 4096];
    let mut left = len;
    while left > 0 {
        #[allow(clippy::cast_possible_truncation)]
        let n = left.min(staged.len() as u64) as usize;
        rd.read_exact(&mut staged[..n])?;
        wr.write_all(&staged[..n])?;
        left -= n as u64;
    }
    Ok(())
}
