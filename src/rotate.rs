//! Rolling window buffer over a byte stream.
//!
//! Feeds fixed-length windows to the delta scanner, advancing one byte or
//! one block at a time while reading every input byte from the upstream
//! reader at most once. Once the reader runs dry the window shrinks from
//! the front (`roll_left`) so the scanner can probe the final short tail.

use std::io::{self, Read};

use crate::read_exact_or_eof;

const MIN_CAPACITY: usize = 32 * 1024;

/// Why the window could not advance.
///
/// `NoBytesLeft` and `NotEnoughBytes` are flow-control signals between the
/// buffer and the delta scanner, not error conditions; only `Io` ever
/// reaches a caller of the public API.
#[derive(Debug)]
pub(crate) enum Stall {
    /// Reader exhausted and the window is empty; terminal.
    NoBytesLeft,
    /// Fewer than `block_len` bytes remain; switch to tail stepping.
    NotEnoughBytes,
    /// Reader failure, propagated unchanged.
    Io(io::Error),
}

impl From<io::Error> for Stall {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

pub(crate) struct RotateBuffer<R> {
    buf: Vec<u8>,
    block_len: usize,
    /// Window start within `buf`.
    start: usize,
    /// Window end within `buf`; `end - start <= block_len`.
    end: usize,
    /// End of buffered bytes within `buf`; `end <= fill`.
    fill: usize,
    /// Absolute stream offset of `buf[start]`.
    abs_head: u64,
    rd: R,
    eof: bool,
}

impl<R: Read> RotateBuffer<R> {
    pub(crate) fn new(rd: R, block_len: usize) -> Self {
        let capacity = (block_len * 4).max(MIN_CAPACITY);
        Self {
            buf: vec![0; capacity],
            block_len,
            start: 0,
            end: 0,
            fill: 0,
            abs_head: 0,
            rd,
            eof: false,
        }
    }

    /// The current window.
    pub(crate) fn window(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    /// Absolute stream offset of the window's first byte.
    pub(crate) fn abs_head(&self) -> u64 {
        self.abs_head
    }

    /// Absolute stream offset just past the window's last byte.
    pub(crate) fn abs_tail(&self) -> u64 {
        self.abs_head + (self.end - self.start) as u64
    }

    /// Slides live bytes to the front and reads until the buffer is full or
    /// the reader ends.
    fn refill(&mut self) -> Result<(), Stall> {
        if self.eof {
            return Ok(());
        }
        if self.start > 0 {
            self.buf.copy_within(self.start..self.fill, 0);
            self.fill -= self.start;
            self.end -= self.start;
            self.start = 0;
        }
        let want = self.buf.len() - self.fill;
        if want == 0 {
            return Ok(());
        }
        let n = read_exact_or_eof(&mut self.rd, &mut self.buf[self.fill..])?;
        self.fill += n;
        if n < want {
            self.eof = true;
        }
        Ok(())
    }

    /// Initial fill. Yields the first full window at offset 0, or signals a
    /// short stream (the short window stays exposed for tail stepping).
    pub(crate) fn roll_first(&mut self) -> Result<(&[u8], u64), Stall> {
        self.refill()?;
        if self.fill == 0 {
            return Err(Stall::NoBytesLeft);
        }
        if self.fill < self.block_len {
            self.end = self.fill;
            return Err(Stall::NotEnoughBytes);
        }
        self.end = self.block_len;
        Ok((&self.buf[..self.end], 0))
    }

    /// Advances the window by one byte, returning the byte that left it.
    ///
    /// On a dry reader the head byte is given up (the caller has already
    /// accounted for it) and the shortened remainder becomes the window.
    pub(crate) fn roll_byte(&mut self) -> Result<(&[u8], u8, u64), Stall> {
        if self.end == self.fill {
            self.refill()?;
        }
        if self.end == self.fill {
            self.start += 1;
            self.abs_head += 1;
            return Err(if self.start >= self.end {
                Stall::NoBytesLeft
            } else {
                Stall::NotEnoughBytes
            });
        }
        let out = self.buf[self.start];
        self.start += 1;
        self.end += 1;
        self.abs_head += 1;
        Ok((&self.buf[self.start..self.end], out, self.abs_head))
    }

    /// Advances the window by a whole block.
    ///
    /// On a dry reader the consumed block is released: the remainder (if
    /// any) becomes the window and `NotEnoughBytes` is signalled, or
    /// `NoBytesLeft` when the stream ended exactly on the block boundary.
    pub(crate) fn roll_block(&mut self) -> Result<(&[u8], u64), Stall> {
        debug_assert_eq!(self.end - self.start, self.block_len);
        if self.fill - self.end < self.block_len {
            self.refill()?;
        }
        let avail = self.fill - self.end;
        self.start = self.end;
        self.abs_head += self.block_len as u64;
        if avail >= self.block_len {
            self.end = self.start + self.block_len;
            Ok((&self.buf[self.start..self.end], self.abs_head))
        } else if avail == 0 {
            Err(Stall::NoBytesLeft)
        } else {
            self.end = self.fill;
            Err(Stall::NotEnoughBytes)
        }
    }

    /// Tail stepping: shrinks the window from the front by one byte,
    /// returning the byte that left it. Fails with `NoBytesLeft` once a
    /// shrink would leave the window empty.
    pub(crate) fn roll_left(&mut self) -> Result<(&[u8], u8, u64), Stall> {
        if self.end - self.start <= 1 {
            return Err(Stall::NoBytesLeft);
        }
        let out = self.buf[self.start];
        self.start += 1;
        self.abs_head += 1;
        Ok((&self.buf[self.start..self.end], out, self.abs_head))
    }
}
