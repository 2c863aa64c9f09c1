use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the top-level signature, delta and patch operations.
///
/// Partial output may already have been written when one of these is
/// returned; cleanup of the output sink is the caller's responsibility.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The stream does not start with the signature magic.
    #[error("not a signature stream (magic {0:#010x})")]
    NotSignatureMagic(u32),

    /// The stream does not start with the delta magic.
    #[error("not a delta stream (magic {0:#010x})")]
    NotDeltaMagic(u32),

    /// Signature header carries a block length of zero.
    #[error("invalid block length {0} in signature header")]
    InvalidBlockLength(u32),

    /// Strong checksum length other than 32 or 64.
    #[error("invalid strong sum length {0}, expected 32 or 64")]
    InvalidSumLength(u32),

    /// Delta command byte outside the defined ranges, including the
    /// reserved compression opcodes.
    #[error("invalid delta opcode {0:#04x}")]
    InvalidOpcode(u8),

    /// Input ended in the middle of a field.
    #[error("input ended inside {0}")]
    Truncated(&'static str),

    /// Underlying reader or writer failure, propagated unchanged.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Classifies a failed field read: end of input mid-field is corruption,
    /// anything else an I/O fault.
    pub(crate) fn truncated(err: io::Error, what: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated(what)
        } else {
            Self::Io(err)
        }
    }
}
