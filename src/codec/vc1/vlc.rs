// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Prefix-code tables used by the VC-1 picture layer and their decoder.

use thiserror::Error;

use crate::bitstream_utils::BitReader;
use crate::bitstream_utils::BitReaderError;
use crate::codec::vc1::bitplane::BitplaneMode;
use crate::codec::vc1::parser::FrameType;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VlcError {
    #[error(transparent)]
    Read(#[from] BitReaderError),
    #[error("no code in the table matches the bitstream")]
    InvalidCode,
}

pub type VlcResult<T> = std::result::Result<T, VlcError>;

/// All the codes of a table that share the same length.
#[derive(Debug)]
pub struct VlcGroup<T: 'static> {
    /// Length of the codes in bits.
    pub len: usize,
    /// `(code, value)` pairs, the code being right-aligned.
    pub codes: &'static [(u32, T)],
}

/// A variable-length code table. Groups are stored by increasing code length
/// and matched in that order.
#[derive(Debug)]
pub struct VlcTable<T: 'static> {
    pub max_len: usize,
    pub groups: &'static [VlcGroup<T>],
}

impl<T: Copy + 'static> VlcTable<T> {
    /// Decodes one symbol, consuming exactly the bits of the matched code.
    pub fn decode(&self, r: &mut BitReader) -> VlcResult<T> {
        let (bits, available) = r.peek_bits_padded(self.max_len)?;

        for group in self.groups {
            if group.len > available {
                // A longer code might have matched if the data didn't end here.
                return Err(VlcError::Read(BitReaderError::EndOfStream));
            }

            let candidate = bits >> (self.max_len - group.len);
            if let Some((_, value)) = group.codes.iter().find(|(code, _)| *code == candidate) {
                r.skip_bits(group.len)?;
                return Ok(*value);
            }
        }

        Err(VlcError::InvalidCode)
    }
}

pub static BITPLANE_MODE: VlcTable<BitplaneMode> = VlcTable {
    max_len: 4,
    groups: &[
        VlcGroup {
            len: 2,
            codes: &[(2, BitplaneMode::Norm2), (3, BitplaneMode::Norm6)],
        },
        VlcGroup {
            len: 3,
            codes: &[
                (1, BitplaneMode::Diff2),
                (2, BitplaneMode::RowSkip),
                (3, BitplaneMode::ColSkip),
            ],
        },
        VlcGroup {
            len: 4,
            codes: &[(0, BitplaneMode::Raw), (1, BitplaneMode::Diff6)],
        },
    ],
};

/// Codes for one 2x3 or 3x2 tile of a Norm-6/Diff-6 bitplane.
pub static TILE: VlcTable<u8> = VlcTable {
    max_len: 13,
    groups: &[
        VlcGroup {
            len: 1,
            codes: &[(1, 0)],
        },
        VlcGroup {
            len: 4,
            codes: &[(2, 1), (3, 2), (4, 4), (5, 8), (6, 16), (7, 32)],
        },
        VlcGroup {
            len: 6,
            codes: &[((3 << 1) | 1, 63)],
        },
        VlcGroup {
            len: 8,
            codes: &[
                (0, 3),
                (1, 5),
                (2, 6),
                (3, 9),
                (4, 10),
                (5, 12),
                (6, 17),
                (7, 18),
                (8, 20),
                (9, 24),
                (10, 33),
                (11, 34),
                (12, 36),
                (13, 40),
                (14, 48),
            ],
        },
        VlcGroup {
            len: 9,
            codes: &[
                ((3 << 4) | 7, 31),
                ((3 << 4) | 6, 47),
                ((3 << 4) | 5, 55),
                ((3 << 4) | 4, 59),
                ((3 << 4) | 3, 61),
                ((3 << 4) | 2, 62),
            ],
        },
        VlcGroup {
            len: 10,
            codes: &[
                ((1 << 6) | 11, 11),
                ((1 << 6) | 7, 7),
                ((1 << 6) | 13, 13),
                ((1 << 6) | 14, 14),
                ((1 << 6) | 19, 19),
                ((1 << 6) | 21, 21),
                ((1 << 6) | 22, 22),
                ((1 << 6) | 25, 25),
                ((1 << 6) | 26, 26),
                ((1 << 6) | 28, 28),
                ((1 << 6) | 3, 35),
                ((1 << 6) | 5, 37),
                ((1 << 6) | 6, 38),
                ((1 << 6) | 9, 41),
                ((1 << 6) | 10, 42),
                ((1 << 6) | 12, 44),
                ((1 << 6) | 17, 49),
                ((1 << 6) | 18, 50),
                ((1 << 6) | 20, 52),
                ((1 << 6) | 24, 56),
            ],
        },
        VlcGroup {
            len: 13,
            codes: &[
                ((3 << 8) | 14, 15),
                ((3 << 8) | 13, 23),
                ((3 << 8) | 12, 27),
                ((3 << 8) | 11, 29),
                ((3 << 8) | 10, 30),
                ((3 << 8) | 9, 39),
                ((3 << 8) | 8, 43),
                ((3 << 8) | 7, 45),
                ((3 << 8) | 6, 46),
                ((3 << 8) | 5, 51),
                ((3 << 8) | 4, 53),
                ((3 << 8) | 3, 54),
                ((3 << 8) | 2, 57),
                ((3 << 8) | 1, 58),
                ((3 << 8) | 0, 60),
            ],
        },
    ],
};

/// PTYPE of progressive and interlaced frames.
pub static PICTURE_TYPE: VlcTable<FrameType> = VlcTable {
    max_len: 4,
    groups: &[
        VlcGroup {
            len: 1,
            codes: &[(0, FrameType::P)],
        },
        VlcGroup {
            len: 2,
            codes: &[(2, FrameType::B)],
        },
        VlcGroup {
            len: 3,
            codes: &[(6, FrameType::I)],
        },
        VlcGroup {
            len: 4,
            codes: &[(14, FrameType::BI), (15, FrameType::Skipped)],
        },
    ],
};

/// BFRACTION, decoded to its index in the fraction table.
pub static B_FRACTION: VlcTable<u8> = VlcTable {
    max_len: 7,
    groups: &[
        VlcGroup {
            len: 3,
            codes: &[(0, 0), (1, 1), (2, 2), (3, 3), (4, 4), (5, 5), (6, 6)],
        },
        VlcGroup {
            len: 7,
            codes: &[
                (0x70, 7),
                (0x71, 8),
                (0x72, 9),
                (0x73, 10),
                (0x74, 11),
                (0x75, 12),
                (0x76, 13),
                (0x77, 14),
                (0x78, 15),
                (0x79, 16),
                (0x7a, 17),
                (0x7b, 18),
                (0x7c, 19),
                (0x7d, 20),
            ],
        },
    ],
};

/// The escaped part of REFDIST, used once the 2-bit prefix reads 3.
pub static REF_DIST: VlcTable<u8> = VlcTable {
    max_len: 14,
    groups: &[
        VlcGroup { len: 1, codes: &[(0, 3)] },
        VlcGroup { len: 2, codes: &[(2, 4)] },
        VlcGroup { len: 3, codes: &[(6, 5)] },
        VlcGroup { len: 4, codes: &[(14, 6)] },
        VlcGroup { len: 5, codes: &[(30, 7)] },
        VlcGroup { len: 6, codes: &[(62, 8)] },
        VlcGroup { len: 7, codes: &[(126, 9)] },
        VlcGroup { len: 8, codes: &[(254, 10)] },
        VlcGroup { len: 9, codes: &[(510, 11)] },
        VlcGroup { len: 10, codes: &[(1022, 12)] },
        VlcGroup { len: 11, codes: &[(2046, 13)] },
        VlcGroup { len: 12, codes: &[(4094, 14)] },
        VlcGroup { len: 13, codes: &[(8190, 15)] },
        VlcGroup { len: 14, codes: &[(16382, 16)] },
    ],
};
