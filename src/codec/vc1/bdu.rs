// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Splitting of Advanced profile elementary streams into bitstream data units
//! (BDUs), each introduced by a `00 00 01` start code and a type suffix.

use std::io::Cursor;

use bytes::Buf;
use enumn::N;
use log::debug;
use thiserror::Error;

const START_CODE_PREFIX: [u8; 3] = [0x00, 0x00, 0x01];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BduError {
    #[error("no start code found in the remaining {0} bytes")]
    NoStartCode(usize),
    #[error("start code at offset {0} is missing its suffix")]
    MissingSuffix(usize),
    #[error("unknown BDU type {0:#04x}")]
    UnknownType(u8),
}

pub type BduResult<T> = std::result::Result<T, BduError>;

/// The start code suffix of a BDU.
#[derive(N, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BduType {
    EndOfSequence = 0x0a,
    Slice = 0x0b,
    Field = 0x0c,
    Frame = 0x0d,
    EntryPoint = 0x0e,
    SequenceHeader = 0x0f,
    SliceUserData = 0x1b,
    FieldUserData = 0x1c,
    FrameUserData = 0x1d,
    EntryPointUserData = 0x1e,
    SequenceUserData = 0x1f,
}

impl BduType {
    pub fn is_user_data(self) -> bool {
        (self as u8) >= 0x1b
    }

    /// Whether the BDU starts with a picture header.
    pub fn has_picture_header(self) -> bool {
        matches!(self, BduType::Frame | BduType::Field)
    }
}

#[derive(Debug)]
pub struct Bdu<T> {
    bdu_type: BduType,
    /// The buffer holding this BDU, possibly shared with other BDUs.
    data: T,

    size: usize,
    offset: usize,
    sc_offset: usize,
}

impl<T> Bdu<T>
where
    T: AsRef<[u8]> + Clone,
{
    fn find_start_code(data: &[u8], offset: usize) -> Option<usize> {
        data[offset..]
            .windows(START_CODE_PREFIX.len())
            .position(|window| window == START_CODE_PREFIX)
    }

    /// Finds the next BDU at or after the position of `cursor`, leaving the
    /// cursor at the end of its payload. Returns `None` once only zero bytes
    /// remain.
    pub fn next(cursor: &mut Cursor<T>) -> BduResult<Option<Bdu<T>>> {
        let data = cursor.get_ref().clone();
        let bytes = data.as_ref();
        let pos = usize::try_from(cursor.position())
            .unwrap_or(usize::MAX)
            .min(bytes.len());

        let current_offset = match Self::find_start_code(bytes, pos) {
            Some(offset) => offset,
            None if bytes[pos..].iter().all(|b| *b == 0) => return Ok(None),
            None => return Err(BduError::NoStartCode(bytes.len() - pos)),
        };

        let mut sc_offset = pos + current_offset;
        let suffix_offset = sc_offset + START_CODE_PREFIX.len();

        let suffix = *bytes
            .get(suffix_offset)
            .ok_or(BduError::MissingSuffix(sc_offset))?;
        let bdu_type = BduType::n(suffix).ok_or(BduError::UnknownType(suffix))?;

        // Zero stuffing before the start code belongs to neither BDU.
        while sc_offset > pos && bytes[sc_offset - 1] == 0 {
            sc_offset -= 1;
        }

        let offset = suffix_offset + 1;
        cursor.set_position(offset as u64);

        let mut size = match Self::find_start_code(bytes, offset) {
            Some(size) => size,
            None => cursor.remaining(),
        };

        while size > 0 && bytes[offset + size - 1] == 0 {
            size -= 1;
        }

        cursor.set_position((offset + size) as u64);

        debug!("Found {:?} BDU at offset {}, size {}", bdu_type, offset, size);

        Ok(Some(Bdu {
            bdu_type,
            data,
            size,
            offset,
            sc_offset,
        }))
    }

    pub fn bdu_type(&self) -> BduType {
        self.bdu_type
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    /// Size of the payload following the start code suffix.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Offset of the payload following the start code suffix.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Offset of the first byte of the start code, including zero stuffing.
    pub fn sc_offset(&self) -> usize {
        self.sc_offset
    }

    /// The BDU with its start code and suffix, as expected by the picture
    /// header parser.
    pub fn with_start_code(&self) -> &[u8] {
        let start = self.offset - START_CODE_PREFIX.len() - 1;
        &self.data.as_ref()[start..self.offset + self.size]
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Bdu<T> {
    fn as_ref(&self) -> &[u8] {
        &self.data.as_ref()[self.offset..self.offset + self.size]
    }
}

/// Iterates over the BDUs of a stream. Iteration stops after the first error.
pub struct BduIterator<T> {
    cursor: Cursor<T>,
    failed: bool,
}

impl<T: AsRef<[u8]> + Clone> BduIterator<T> {
    pub fn new(stream: T) -> Self {
        Self {
            cursor: Cursor::new(stream),
            failed: false,
        }
    }
}

impl<T: AsRef<[u8]> + Clone> Iterator for BduIterator<T> {
    type Item = BduResult<Bdu<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match Bdu::next(&mut self.cursor) {
            Ok(bdu) => bdu.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
