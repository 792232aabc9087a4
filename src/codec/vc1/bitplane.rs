// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Bitplane syntax. The hardware receives raw-coded bitplanes through a
//! separate buffer, so coded bitplanes are only walked over here to find the
//! end of the picture header.

use enumn::N;
use log::debug;
use thiserror::Error;

use crate::bitstream_utils::BitReader;
use crate::bitstream_utils::BitReaderError;
use crate::codec::vc1::vlc;
use crate::codec::vc1::vlc::VlcError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BitplaneError {
    #[error(transparent)]
    Read(#[from] BitReaderError),
    #[error(transparent)]
    Vlc(#[from] VlcError),
    #[error("raw bitplane holds {actual} bytes, {expected} are needed")]
    BufferTooSmall { expected: usize, actual: usize },
}

pub type BitplaneResult<T> = std::result::Result<T, BitplaneError>;

/// IMODE, the coding mode of a bitplane.
#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BitplaneMode {
    #[default]
    Raw = 0,
    Norm2 = 1,
    Diff2 = 2,
    Norm6 = 3,
    Diff6 = 4,
    RowSkip = 5,
    ColSkip = 6,
}

/// The macroblock flag carried by a bitplane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitplaneKind {
    FieldTx,
    AcPred,
    OverFlags,
    MvTypeMb,
    SkipMb,
    DirectMb,
    ForwardMb,
}

/// A bitplane as signaled in the picture header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bitplane {
    pub kind: BitplaneKind,
    /// INVERT flag.
    pub invert: bool,
    pub mode: BitplaneMode,
}

impl Bitplane {
    /// Whether the flags are coded per macroblock in the macroblock layer
    /// rather than in the picture header.
    pub fn is_raw(&self) -> bool {
        self.mode == BitplaneMode::Raw
    }
}

/// Parses a bitplane covering `width_in_mbs` x `height_in_mbs` macroblocks.
pub fn parse_bitplane(
    r: &mut BitReader,
    kind: BitplaneKind,
    width_in_mbs: u32,
    height_in_mbs: u32,
) -> BitplaneResult<Bitplane> {
    let invert = r.read_bit()?;
    let mode = vlc::BITPLANE_MODE.decode(r)?;

    debug!("Parsing {:?} bitplane, mode {:?}", kind, mode);

    match mode {
        BitplaneMode::Norm2 | BitplaneMode::Diff2 => skip_norm2(r, width_in_mbs, height_in_mbs)?,
        BitplaneMode::Norm6 | BitplaneMode::Diff6 => skip_norm6(r, width_in_mbs, height_in_mbs)?,
        BitplaneMode::RowSkip => {
            for _ in 0..height_in_mbs {
                if r.read_bit()? {
                    r.skip_bits(width_in_mbs as usize)?;
                }
            }
        }
        BitplaneMode::ColSkip => {
            for _ in 0..width_in_mbs {
                if r.read_bit()? {
                    r.skip_bits(height_in_mbs as usize)?;
                }
            }
        }
        BitplaneMode::Raw => (),
    }

    Ok(Bitplane { kind, invert, mode })
}

fn skip_norm2(r: &mut BitReader, width: u32, height: u32) -> BitplaneResult<()> {
    let mut count = u64::from(width) * u64::from(height);

    if count & 1 != 0 {
        r.read_bit()?;
        count -= 1;
    }

    // Pairs are coded as 0, 11, 100 or 101.
    for _ in 0..count / 2 {
        if r.read_bit()? && !r.read_bit()? {
            r.read_bit()?;
        }
    }

    Ok(())
}

fn skip_norm6(r: &mut BitReader, width: u32, height: u32) -> BitplaneResult<()> {
    let is_2x3 = width % 3 != 0 && height % 3 == 0;

    let (width_in_tiles, height_in_tiles, residual_x, residual_y) = if is_2x3 {
        (width / 2, height / 3, width & 1, 0)
    } else {
        (width / 3, height / 2, width % 3, height & 1)
    };

    for _ in 0..u64::from(width_in_tiles) * u64::from(height_in_tiles) {
        vlc::TILE.decode(r)?;
    }

    for _ in 0..residual_x {
        if r.read_bit()? {
            r.skip_bits(height as usize)?;
        }
    }

    for _ in 0..residual_y {
        if r.read_bit()? {
            r.skip_bits((width - residual_x) as usize)?;
        }
    }

    Ok(())
}

/// Repacks a raw bitplane buffer holding one nibble per macroblock, row after
/// row without padding, into rows of `ceil(width / 2)` bytes where even
/// macroblocks take the low nibble and odd ones the high nibble.
pub fn pack_raw_bitplane(
    src: &[u8],
    width_in_mbs: usize,
    height_in_mbs: usize,
) -> BitplaneResult<Vec<u8>> {
    let expected = (width_in_mbs * height_in_mbs + 1) / 2;
    if src.len() < expected {
        return Err(BitplaneError::BufferTooSmall {
            expected,
            actual: src.len(),
        });
    }

    let pitch = (width_in_mbs + 1) / 2;
    let mut dst = vec![0u8; pitch * height_in_mbs];

    for i in 0..height_in_mbs {
        let row = &mut dst[i * pitch..(i + 1) * pitch];
        for j in 0..width_in_mbs {
            let idx = i * width_in_mbs + j;
            let shift = if idx & 1 != 0 { 0 } else { 4 };
            let value = (src[idx / 2] >> shift) & 0xf;

            if j % 2 != 0 {
                row[j / 2] |= value << 4;
            } else {
                row[j / 2] = value;
            }
        }
    }

    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream_utils::BitWriter;

    fn stream(fields: &[(usize, u32)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = BitWriter::new(&mut buf);
            for (len, value) in fields {
                writer.write_f(*len, *value).unwrap();
            }
            // Sentinel so we can tell where the bitplane ended.
            writer.write_f(8, 0xa5u32).unwrap();
        }
        buf
    }

    fn parse(buf: &[u8], width: u32, height: u32) -> (Bitplane, u8) {
        let mut r = BitReader::new(buf, false);
        let bp = parse_bitplane(&mut r, BitplaneKind::SkipMb, width, height).unwrap();
        (bp, r.read_bits::<u8>(8).unwrap())
    }

    #[test]
    fn raw() {
        let buf = stream(&[(1, 1), (4, 0b0000)]);
        let (bp, sentinel) = parse(&buf, 10, 10);
        assert_eq!(
            bp,
            Bitplane {
                kind: BitplaneKind::SkipMb,
                invert: true,
                mode: BitplaneMode::Raw
            }
        );
        assert!(bp.is_raw());
        assert_eq!(sentinel, 0xa5);
    }

    #[test]
    fn norm2_odd_count() {
        // 3x1 macroblocks: a lone bit then one pair.
        let buf = stream(&[(1, 0), (2, 0b10), (1, 1), (3, 0b100)]);
        let (bp, sentinel) = parse(&buf, 3, 1);
        assert_eq!(bp.mode, BitplaneMode::Norm2);
        assert!(!bp.invert);
        assert_eq!(sentinel, 0xa5);
    }

    #[test]
    fn diff2_pairs() {
        // 2x2 macroblocks: two pairs coded as "0" and "11".
        let buf = stream(&[(1, 0), (3, 0b001), (1, 0), (2, 0b11)]);
        let (bp, sentinel) = parse(&buf, 2, 2);
        assert_eq!(bp.mode, BitplaneMode::Diff2);
        assert_eq!(sentinel, 0xa5);
    }

    #[test]
    fn norm6_3x2_tiles_with_residuals() {
        // 4x5 macroblocks: two 3x2 tiles, one residual column, one residual row.
        let buf = stream(&[
            (1, 0),
            (2, 0b11),
            // Tile values 1 and 0.
            (4, 0b0010),
            (1, 1),
            // Residual column coded, 5 bits.
            (1, 1),
            (5, 0b10101),
            // Residual row coded, 3 bits.
            (1, 1),
            (3, 0b010),
        ]);
        let (bp, sentinel) = parse(&buf, 4, 5);
        assert_eq!(bp.mode, BitplaneMode::Norm6);
        assert_eq!(sentinel, 0xa5);
    }

    #[test]
    fn diff6_2x3_tiles() {
        // 5x3 macroblocks: two 2x3 tiles and one residual column left uncoded.
        let buf = stream(&[
            (1, 1),
            (4, 0b0001),
            (1, 1),
            // Tile value 63.
            (6, 0b000111),
            (1, 0),
        ]);
        let (bp, sentinel) = parse(&buf, 5, 3);
        assert_eq!(bp.mode, BitplaneMode::Diff6);
        assert!(bp.invert);
        assert_eq!(sentinel, 0xa5);
    }

    #[test]
    fn rowskip_and_colskip() {
        let buf = stream(&[(1, 0), (3, 0b010), (1, 0), (1, 1), (4, 0b1111)]);
        let (bp, sentinel) = parse(&buf, 4, 2);
        assert_eq!(bp.mode, BitplaneMode::RowSkip);
        assert_eq!(sentinel, 0xa5);

        let buf = stream(&[(1, 0), (3, 0b011), (1, 1), (2, 0b01), (1, 0), (1, 0)]);
        let (bp, sentinel) = parse(&buf, 3, 2);
        assert_eq!(bp.mode, BitplaneMode::ColSkip);
        assert_eq!(sentinel, 0xa5);
    }

    #[test]
    fn truncated_bitplane() {
        let buf = [0b0110_0000];
        let mut r = BitReader::new(&buf, false);
        assert_eq!(
            parse_bitplane(&mut r, BitplaneKind::AcPred, 8, 8),
            Err(BitplaneError::Vlc(VlcError::Read(BitReaderError::EndOfStream)))
        );
    }

    #[test]
    fn huge_dimensions_run_out_of_data() {
        let buf = [0b0100_0000];
        let mut r = BitReader::new(&buf, false);
        assert_eq!(
            parse_bitplane(&mut r, BitplaneKind::SkipMb, u32::MAX, u32::MAX),
            Err(BitplaneError::Read(BitReaderError::EndOfStream))
        );

        let buf = [0b0110_0000];
        let mut r = BitReader::new(&buf, false);
        assert_eq!(
            parse_bitplane(&mut r, BitplaneKind::SkipMb, u32::MAX, u32::MAX),
            Err(BitplaneError::Vlc(VlcError::Read(BitReaderError::EndOfStream)))
        );
    }

    #[test]
    fn mode_values() {
        assert_eq!(BitplaneMode::n(5), Some(BitplaneMode::RowSkip));
        assert_eq!(BitplaneMode::n(7), None);
    }

    #[test]
    fn pack_raw() {
        // 3x2 macroblocks, nibbles 1..=6.
        let src = [0x12, 0x34, 0x56];
        let packed = pack_raw_bitplane(&src, 3, 2).unwrap();
        assert_eq!(packed, vec![0x21, 0x03, 0x54, 0x06]);

        assert_eq!(
            pack_raw_bitplane(&src[..2], 3, 2),
            Err(BitplaneError::BufferTooSmall {
                expected: 3,
                actual: 2
            })
        );
    }
}
