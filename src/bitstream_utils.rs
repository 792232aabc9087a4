// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::io::Write;

use byteorder::BigEndian;
use byteorder::ByteOrder;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BitReaderError {
    #[error("more than 32 ({0}) bits were requested")]
    TooManyBitsRequested(usize),
    #[error("reader ran out of bits")]
    EndOfStream,
    #[error("emulation prevention byte at the end of the buffer")]
    TruncatedEmulationPrevention,
    #[error("byte {0:#04x} cannot follow an emulation prevention byte")]
    InvalidEmulationPrevention(u8),
    #[error("forbidden 0x000002 sequence in encapsulated data")]
    ForbiddenStartCodeEmulation,
    #[error("byte {0:#04x} follows a run of three or more zero bytes")]
    InvalidZeroRun(u8),
    #[error("failed to convert read input to target type")]
    ConversionFailed,
}

pub type BitReaderResult<T> = std::result::Result<T, BitReaderError>;

/// A bit reader for VC-1 bitstreams. When reading an encapsulated BDU (EBDU),
/// emulation prevention bytes are stripped before the bits reach the caller.
#[derive(Clone, Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Index of the next raw byte to pull into the cache.
    next_byte: usize,
    /// Decoded bits waiting to be consumed, left-aligned.
    cache: u64,
    /// Number of valid bits in `cache`.
    cache_bits: u32,
    /// Number of consecutive zero bytes seen in the raw data.
    zero_run: u32,
    /// Whether the data uses emulation prevention.
    is_ebdu: bool,
    /// How many decoded bits have been consumed so far.
    position: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8], is_ebdu: bool) -> Self {
        Self {
            data,
            next_byte: 0,
            cache: 0,
            cache_bits: 0,
            zero_run: 0,
            is_ebdu,
            position: 0,
        }
    }

    /// Read a single bit from the stream.
    pub fn read_bit(&mut self) -> BitReaderResult<bool> {
        Ok(self.read_bits::<u32>(1)? == 1)
    }

    /// Read up to 32 bits from the stream. Nothing is consumed if fewer than
    /// `num_bits` bits remain.
    pub fn read_bits<U: TryFrom<u32>>(&mut self, num_bits: usize) -> BitReaderResult<U> {
        let value: u32 = self.peek_bits(num_bits)?;
        self.consume(num_bits as u32);

        U::try_from(value).map_err(|_| BitReaderError::ConversionFailed)
    }

    /// Returns the next `num_bits` bits (up to 32) without advancing.
    pub fn peek_bits<U: TryFrom<u32>>(&mut self, num_bits: usize) -> BitReaderResult<U> {
        if num_bits > 32 {
            return Err(BitReaderError::TooManyBitsRequested(num_bits));
        }

        self.fill(num_bits as u32)?;
        if self.cache_bits < num_bits as u32 {
            return Err(BitReaderError::EndOfStream);
        }

        U::try_from(self.top_bits(num_bits as u32)).map_err(|_| BitReaderError::ConversionFailed)
    }

    /// Peeks up to `num_bits` bits. Returns them left-aligned in a
    /// `num_bits`-wide value padded with zeros, together with the number of
    /// bits that are actually present in the stream.
    pub fn peek_bits_padded(&mut self, num_bits: usize) -> BitReaderResult<(u32, usize)> {
        if num_bits > 32 {
            return Err(BitReaderError::TooManyBitsRequested(num_bits));
        }

        self.fill(num_bits as u32)?;
        let available = std::cmp::min(self.cache_bits, num_bits as u32);

        Ok((self.top_bits(num_bits as u32), available as usize))
    }

    /// Skip `num_bits` bits from the stream.
    pub fn skip_bits(&mut self, mut num_bits: usize) -> BitReaderResult<()> {
        while num_bits > 0 {
            let n = std::cmp::min(num_bits, 32);
            self.read_bits::<u32>(n)?;
            num_bits -= n;
        }

        Ok(())
    }

    /// Return the number of decoded bits consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether emulation prevention bytes are being removed.
    pub fn is_ebdu(&self) -> bool {
        self.is_ebdu
    }

    fn top_bits(&self, num_bits: u32) -> u32 {
        if num_bits == 0 {
            0
        } else {
            (self.cache >> (64 - num_bits)) as u32
        }
    }

    fn consume(&mut self, num_bits: u32) {
        self.cache <<= num_bits;
        self.cache_bits -= num_bits;
        self.position += u64::from(num_bits);
    }

    /// Tops up the cache until it holds at least `num_bits` bits or the data
    /// runs out.
    fn fill(&mut self, num_bits: u32) -> BitReaderResult<()> {
        while self.cache_bits < num_bits {
            if !self.is_ebdu && self.cache_bits <= 32 && self.data.len() - self.next_byte >= 4 {
                let word = BigEndian::read_u32(&self.data[self.next_byte..]);
                self.cache |= u64::from(word) << (32 - self.cache_bits);
                self.cache_bits += 32;
                self.next_byte += 4;
                continue;
            }

            match self.next_byte()? {
                Some(byte) => {
                    self.cache |= u64::from(byte) << (56 - self.cache_bits);
                    self.cache_bits += 8;
                }
                None => break,
            }
        }

        Ok(())
    }

    /// Pulls the next decoded byte, dropping emulation prevention bytes. The
    /// state only advances when a byte is produced.
    fn next_byte(&mut self) -> BitReaderResult<Option<u8>> {
        let Some(&byte) = self.data.get(self.next_byte) else {
            return Ok(None);
        };

        if !self.is_ebdu {
            self.next_byte += 1;
            return Ok(Some(byte));
        }

        match self.zero_run {
            0 | 1 => {
                self.zero_run = if byte == 0 { self.zero_run + 1 } else { 0 };
                self.next_byte += 1;
                Ok(Some(byte))
            }
            2 => match byte {
                0x03 => {
                    let next = *self
                        .data
                        .get(self.next_byte + 1)
                        .ok_or(BitReaderError::TruncatedEmulationPrevention)?;
                    if next > 0x03 {
                        return Err(BitReaderError::InvalidEmulationPrevention(next));
                    }

                    self.zero_run = if next == 0 { 1 } else { 0 };
                    self.next_byte += 2;
                    Ok(Some(next))
                }
                0x02 => Err(BitReaderError::ForbiddenStartCodeEmulation),
                _ => {
                    // 0x000000 is tolerated, it can only start a start code.
                    self.zero_run = if byte == 0 { 3 } else { 0 };
                    self.next_byte += 1;
                    Ok(Some(byte))
                }
            },
            _ => match byte {
                0x00 => {
                    self.zero_run += 1;
                    self.next_byte += 1;
                    Ok(Some(byte))
                }
                0x01 => {
                    self.zero_run = 0;
                    self.next_byte += 1;
                    Ok(Some(byte))
                }
                _ => Err(BitReaderError::InvalidZeroRun(byte)),
            },
        }
    }
}

/// Count of zero bytes written since the last escape.
#[derive(Debug, Default)]
struct ZeroRun(u32);

impl ZeroRun {
    /// Accounts for `byte` and returns whether an emulation prevention byte
    /// must be written before it.
    fn push(&mut self, byte: u8) -> bool {
        let escape = self.0 >= 2 && byte <= 0x03;
        if escape {
            self.0 = 0;
        }

        self.0 = if byte == 0 { self.0 + 1 } else { 0 };
        escape
    }
}

/// Wrapper over [`std::io::Write`] producing EBDU data.
pub struct EmulationPrevention<W: Write> {
    out: W,
    zero_run: ZeroRun,
}

impl<W: Write> EmulationPrevention<W> {
    pub fn new(writer: W) -> Self {
        Self {
            out: writer,
            zero_run: ZeroRun::default(),
        }
    }

    /// Writes a start code and its suffix. The start code bypasses emulation
    /// prevention.
    pub fn write_start_code(&mut self, suffix: u8) -> std::io::Result<()> {
        self.out.write_all(&[0x00, 0x00, 0x01, suffix])?;
        self.zero_run = ZeroRun::default();
        Ok(())
    }

    pub fn inner(&self) -> &W {
        &self.out
    }
}

impl<W: Write> Write for EmulationPrevention<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        for &byte in buf {
            if self.zero_run.push(byte) {
                self.out.write_all(&[0x03, byte])?;
            } else {
                self.out.write_all(&[byte])?;
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }
}

/// Returns `data` encapsulated with emulation prevention bytes.
pub fn insert_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut zero_run = ZeroRun::default();
    let mut out = Vec::with_capacity(data.len() + data.len() / 2);

    for &byte in data {
        if zero_run.push(byte) {
            out.push(0x03);
        }
        out.push(byte);
    }

    out
}

#[derive(Error, Debug)]
pub enum BitWriterError {
    #[error("cannot write more than 32 bits at once")]
    InvalidBitCount,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type BitWriterResult<T> = std::result::Result<T, BitWriterError>;

/// MSB-first writer used to synthesize bitstreams. Bits that do not fill a
/// byte yet are held back until the next write, and padded with zeros when
/// the writer is flushed or dropped.
pub struct BitWriter<W: Write> {
    out: W,
    /// Pending bits, right-aligned.
    pending: u8,
    pending_bits: u32,
}

impl<W: Write> BitWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            out: writer,
            pending: 0,
            pending_bits: 0,
        }
    }

    /// Writes the `bits` low bits of `value`, most significant first.
    pub fn write_f<T: Into<u32>>(&mut self, bits: usize, value: T) -> BitWriterResult<usize> {
        if bits > 32 {
            return Err(BitWriterError::InvalidBitCount);
        }

        let value = u64::from(value.into()) & ((1u64 << bits) - 1);
        let acc = (u64::from(self.pending) << bits) | value;
        let mut acc_bits = self.pending_bits + bits as u32;

        while acc_bits >= 8 {
            acc_bits -= 8;
            self.out.write_all(&[(acc >> acc_bits) as u8])?;
        }

        self.pending = (acc & ((1 << acc_bits) - 1)) as u8;
        self.pending_bits = acc_bits;

        Ok(bits)
    }

    /// Writes out the pending bits, zero padded to a byte.
    pub fn flush(&mut self) -> BitWriterResult<()> {
        if self.pending_bits != 0 {
            self.out.write_all(&[self.pending << (8 - self.pending_bits)])?;
            self.pending = 0;
            self.pending_bits = 0;
        }

        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> Drop for BitWriter<W> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::error!("Unable to flush pending bits: {e:?}");
        }
    }
}
