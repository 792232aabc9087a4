// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Packing of the motion vectors of a macroblock into the luma and chroma
//! vectors programmed in the hardware macroblock commands.
//!
//! Luma vectors are stored as four `(x, y)` pairs: first forward, first
//! backward, second forward and second backward. For 4MV macroblocks the
//! pairs are the vectors of the four luma blocks instead.

use enumn::N;
use thiserror::Error;

use crate::codec::vc1::parser::PictureParameters;
use crate::codec::vc1::parser::PictureStructure;
use crate::codec::vc1::parser::SequenceFields;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MvError {
    #[error("no field polarity offset for a {0:?} picture")]
    InvalidFieldPolarityOffset(PictureStructure),
}

pub type MvResult<T> = std::result::Result<T, MvError>;

/// Rounding added to a luma component before halving it, indexed by its two
/// low bits.
const CHROMA_ROUNDING: [i16; 4] = [0, 0, 0, 1];

/// Vertical offsets removing the field geometry adjustment of decoded
/// vectors, indexed by same (0) or opposite (1) polarity reference.
const TOP_FIELD_OFFSETS: [i16; 2] = [0, 2];
const BOTTOM_FIELD_OFFSETS: [i16; 2] = [-2, 0];
const FRAME_OFFSETS: [i16; 2] = [0, 0];

/// Which luma blocks of a progressive 4MV macroblock are inter coded, by
/// intra block pattern.
#[derive(Clone, Copy)]
struct InterBlocks {
    count: u8,
    /// Luma component indices of the inter coded blocks.
    indices: [usize; 3],
}

const fn inter(count: u8, a: usize, b: usize, c: usize) -> InterBlocks {
    InterBlocks {
        count,
        indices: [a, b, c],
    }
}

const PROGRESSIVE_INTER_BLOCKS: [InterBlocks; 16] = [
    inter(4, 0, 0, 0),
    inter(3, 0, 2, 4),
    inter(3, 0, 2, 6),
    inter(2, 0, 2, 0),
    inter(3, 0, 4, 6),
    inter(2, 0, 4, 0),
    inter(2, 0, 6, 0),
    inter(0, 0, 0, 0),
    inter(3, 2, 4, 6),
    inter(2, 2, 4, 0),
    inter(2, 2, 6, 0),
    inter(0, 0, 0, 0),
    inter(2, 4, 6, 0),
    inter(0, 0, 0, 0),
    inter(0, 0, 0, 0),
    inter(0, 0, 0, 0),
];

/// Reference field polarity of the luma blocks of a field 4MV macroblock, by
/// field select pattern.
#[derive(Clone, Copy)]
enum FieldBlocks {
    /// All four blocks reference the same field.
    Four { polarity: bool },
    /// Three blocks, at `indices`, reference the same field.
    Three { polarity: bool, indices: [usize; 3] },
    /// Two blocks each. `indices` lists the blocks with a clear field
    /// select first.
    Two { indices: [usize; 4] },
}

const fn four(polarity: bool) -> FieldBlocks {
    FieldBlocks::Four { polarity }
}

const fn three(polarity: bool, a: usize, b: usize, c: usize) -> FieldBlocks {
    FieldBlocks::Three {
        polarity,
        indices: [a, b, c],
    }
}

const fn two(a: usize, b: usize, c: usize, d: usize) -> FieldBlocks {
    FieldBlocks::Two {
        indices: [a, b, c, d],
    }
}

const FIELD_BLOCKS: [FieldBlocks; 16] = [
    four(false),
    three(false, 2, 4, 6),
    three(false, 0, 4, 6),
    two(4, 6, 0, 2),
    three(false, 0, 2, 6),
    two(2, 6, 0, 4),
    two(0, 6, 2, 4),
    three(true, 0, 2, 4),
    three(false, 0, 2, 4),
    two(2, 4, 0, 6),
    two(0, 4, 2, 6),
    three(true, 0, 2, 6),
    two(0, 2, 4, 6),
    three(true, 0, 4, 6),
    three(true, 2, 4, 6),
    four(true),
];

#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MotionType {
    Field = 1,
    #[default]
    Frame = 2,
    DualPrime = 3,
}

/// Macroblock mode flags used to pack motion vectors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MacroblockMode {
    pub motion_forward: bool,
    pub motion_backward: bool,
    pub motion_4mv: bool,
    pub motion_type: MotionType,
    /// Vertical field select of each luma block, block `i` at bit `i`.
    pub field_select: u8,
    /// Intra flags of the four luma blocks, used by progressive 4MV
    /// macroblocks.
    pub block_luma_intra: u8,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackedMotionVectors {
    pub luma: [i16; 8],
    pub chroma: [i16; 2],
    /// Reference field polarity of field pictures.
    pub field_polarity: bool,
    /// Prediction of the bottom field switched to the other reference
    /// field, interlaced frames only.
    pub motion_switch: bool,
}

/// Median of three values.
pub fn median3(a: i16, b: i16, c: i16) -> i16 {
    if a > b {
        if b > c {
            b
        } else if a > c {
            c
        } else {
            a
        }
    } else if a > c {
        a
    } else if b > c {
        c
    } else {
        b
    }
}

/// Mean of the two middle values out of four.
pub fn median4(a: i16, b: i16, c: i16, d: i16) -> i16 {
    let values = [a, b, c, d].map(i32::from);
    let max = values.iter().max().copied().unwrap_or_default();
    let min = values.iter().min().copied().unwrap_or_default();

    ((values.iter().sum::<i32>() - max - min) / 2) as i16
}

/// Derives a chroma vector component from a luma one.
pub fn chroma_mv(luma: i16) -> i16 {
    let rounding = CHROMA_ROUNDING[(luma & 3) as usize];
    ((i32::from(luma) + i32::from(rounding)) >> 1) as i16
}

/// Rounds a chroma vector component to full pel, for FASTUVMC.
pub fn fast_chroma_mv(chroma: i16) -> i16 {
    chroma - chroma % 2
}

fn mean2(a: i16, b: i16) -> i16 {
    ((i32::from(a) + i32::from(b)) / 2) as i16
}

fn polarity_offsets(structure: PictureStructure) -> [i16; 2] {
    match structure {
        PictureStructure::TopField => TOP_FIELD_OFFSETS,
        PictureStructure::BottomField => BOTTOM_FIELD_OFFSETS,
        PictureStructure::Frame | PictureStructure::InterlacedFrame => FRAME_OFFSETS,
    }
}

fn field_polarity_offsets(structure: PictureStructure) -> MvResult<[i16; 2]> {
    if structure.is_field() {
        Ok(polarity_offsets(structure))
    } else {
        Err(MvError::InvalidFieldPolarityOffset(structure))
    }
}

/// Chroma vector of a progressive 4MV macroblock.
pub fn chroma_4mv_progressive(intra_flags: u8, luma: &[i16; 8]) -> [i16; 2] {
    let blocks = PROGRESSIVE_INTER_BLOCKS[usize::from(intra_flags & 0xf)];
    let [i1, i2, i3] = blocks.indices;

    let (x, y) = match blocks.count {
        4 => (
            median4(luma[0], luma[2], luma[4], luma[6]),
            median4(luma[1], luma[3], luma[5], luma[7]),
        ),
        3 => (
            median3(luma[i1], luma[i2], luma[i3]),
            median3(luma[i1 + 1], luma[i2 + 1], luma[i3 + 1]),
        ),
        2 => (mean2(luma[i1], luma[i2]), mean2(luma[i1 + 1], luma[i2 + 1])),
        _ => (0, 0),
    };

    [chroma_mv(x), chroma_mv(y)]
}

/// Chroma vector of a field 4MV macroblock. Vertical luma components are
/// unadjusted in place. Returns the chroma vector and the dominant reference
/// field polarity.
pub fn chroma_4mv_interlaced(
    field_select: u8,
    structure: PictureStructure,
    fast_uvmc: bool,
    luma: &mut [i16; 8],
) -> MvResult<([i16; 2], bool)> {
    let offsets = polarity_offsets(structure);

    let (x, y, polarity) = match FIELD_BLOCKS[usize::from(field_select & 0xf)] {
        FieldBlocks::Four { polarity } => {
            let offset = offsets[usize::from(polarity)];
            for i in [1, 3, 5, 7] {
                luma[i] = luma[i].wrapping_add(offset);
            }

            (
                median4(luma[0], luma[2], luma[4], luma[6]),
                median4(luma[1], luma[3], luma[5], luma[7]),
                polarity,
            )
        }
        FieldBlocks::Three { polarity, indices } => {
            let [i2, i3, i4] = indices;
            // The four indices add up to 12.
            let i1 = 12 - (i2 + i3 + i4);

            let offset = offsets[usize::from(polarity)];
            for i in indices {
                luma[i + 1] = luma[i + 1].wrapping_add(offset);
            }

            let opposite = field_polarity_offsets(structure)?[usize::from(!polarity)];
            luma[i1 + 1] = luma[i1 + 1].wrapping_add(opposite);

            (
                median3(luma[i2], luma[i3], luma[i4]),
                median3(luma[i2 + 1], luma[i3 + 1], luma[i4 + 1]),
                polarity,
            )
        }
        FieldBlocks::Two { indices } => {
            let [t1, t2, b1, b2] = indices;
            let (same, other, polarity) = if structure == PictureStructure::TopField {
                ([t1, t2], [b1, b2], false)
            } else {
                ([b1, b2], [t1, t2], true)
            };

            let offset = offsets[usize::from(polarity)];
            for i in same {
                luma[i + 1] = luma[i + 1].wrapping_add(offset);
            }
            let offset = offsets[usize::from(!polarity)];
            for i in other {
                luma[i + 1] = luma[i + 1].wrapping_add(offset);
            }

            (
                mean2(luma[same[0]], luma[same[1]]),
                mean2(luma[same[0] + 1], luma[same[1] + 1]),
                polarity,
            )
        }
    };

    let mut chroma = [chroma_mv(x), chroma_mv(y)];
    if fast_uvmc {
        chroma = chroma.map(fast_chroma_mv);
    }

    Ok((chroma, polarity))
}

/// Packs the motion vectors `mv` of a macroblock, ordered like the packed
/// luma vectors. The field select flags of `mb` are updated to match the
/// vectors that end up being used.
pub fn pack_motion_vectors(
    seq: &SequenceFields,
    pic: &PictureParameters,
    mb: &mut MacroblockMode,
    mv: &[i16; 8],
) -> MvResult<PackedMotionVectors> {
    let structure = pic.structure;
    let is_p = pic.is_p();
    let fwd = mb.motion_forward;
    let bwd = mb.motion_backward;

    let mut out = PackedMotionVectors::default();
    let luma = &mut out.luma;

    if mb.motion_4mv {
        *luma = *mv;

        if structure == PictureStructure::Frame {
            out.chroma = chroma_4mv_progressive(mb.block_luma_intra, luma);
        } else if structure != PictureStructure::InterlacedFrame {
            let (chroma, polarity) =
                chroma_4mv_interlaced(mb.field_select, structure, seq.fast_uvmc, luma)?;
            out.chroma = chroma;
            out.field_polarity = polarity;
        }
    } else {
        for pair in luma.chunks_exact_mut(2) {
            pair.copy_from_slice(&mv[..2]);
        }
        out.chroma = [chroma_mv(luma[0]), chroma_mv(luma[1])];

        match structure {
            PictureStructure::Frame => {
                if fwd && bwd {
                    // Direct prediction.
                    luma[2] = mv[4];
                    luma[3] = mv[5];
                    luma[6] = mv[4];
                    luma[7] = mv[5];
                }
            }
            PictureStructure::InterlacedFrame => {
                luma[2] = mv[2];
                luma[3] = mv[3];
                luma[6] = mv[2];
                luma[7] = mv[3];

                match mb.motion_type {
                    MotionType::Frame if is_p => {
                        luma[2] = luma[0];
                        luma[3] = luma[1];
                        luma[6] = luma[0];
                        luma[7] = luma[1];
                    }
                    MotionType::Field => luma[4..].copy_from_slice(&mv[4..]),
                    _ => (),
                }
            }
            PictureStructure::TopField | PictureStructure::BottomField => {
                let offsets = field_polarity_offsets(structure)?;
                let sel0 = mb.field_select & 0x1 != 0;
                let sel1 = mb.field_select & 0x2 != 0;

                let (i, polarity, other_polarity) = match (fwd, bwd) {
                    (_, true) => {
                        luma[2] = mv[2];
                        luma[3] = mv[3];
                        luma[6] = mv[2];
                        luma[7] = mv[3];
                        (3, sel1, sel0)
                    }
                    (true, false) => (1, sel0, sel1),
                    // Intra macroblocks keep the vectors as they are.
                    (false, false) => return Ok(out),
                };

                out.field_polarity = polarity;
                luma[i] = luma[i].wrapping_add(offsets[usize::from(polarity)]);
                luma[4 - i] = luma[4 - i].wrapping_add(offsets[usize::from(other_polarity)]);

                if is_p {
                    luma[3] = luma[1];
                    luma[5] = luma[1];
                    luma[7] = luma[1];

                    if sel0 {
                        mb.field_select |= 0xf;
                    }
                } else {
                    luma[5] = luma[1];
                    luma[7] = luma[3];
                }

                out.chroma = [chroma_mv(luma[i - 1]), chroma_mv(luma[i])];
            }
        }
    }

    if structure == PictureStructure::InterlacedFrame && mb.motion_type == MotionType::Field {
        out.motion_switch = fix_field_selects(mb, &mut out.luma, is_p);
    }

    if seq.fast_uvmc {
        out.chroma = out.chroma.map(fast_chroma_mv);
    }

    Ok(out)
}

/// Conceals missing bottom field vectors of field predicted macroblocks in
/// interlaced frames and picks the prediction of single direction
/// macroblocks. Returns whether the bottom field prediction was switched.
fn fix_field_selects(mb: &mut MacroblockMode, luma: &mut [i16; 8], is_p: bool) -> bool {
    let select = mb.field_select & 0xf;
    let mut conceal_second_fwd = false;
    let mut conceal_second_bwd = false;

    if select & 0x4 == 0 {
        conceal_second_fwd = luma[4] == 0 && luma[5] == 0;
        luma[5] = luma[5].wrapping_add(4);
    }
    if select & 0x8 == 0 {
        conceal_second_bwd = luma[6] == 0 && luma[7] == 0;
        luma[7] = luma[7].wrapping_add(4);
    }

    if (mb.motion_forward && mb.motion_backward) || mb.motion_4mv {
        return false;
    }

    let (switch, top_bit, bottom_bit) = if mb.motion_forward {
        let switch = select & 0x2 != 0;
        (switch, 0, if switch { 3 } else { 2 })
    } else {
        let switch = select & 0x1 != 0;
        (switch, 1, if switch { 2 } else { 3 })
    };

    let top_pred = select & (1 << top_bit) != 0;
    let bottom_pred = select & (1 << bottom_bit) != 0;

    if is_p {
        let (top_x, top_y) = (luma[top_bit * 2], luma[top_bit * 2 + 1]);
        let (bottom_x, bottom_y) = (luma[bottom_bit * 2], luma[bottom_bit * 2 + 1]);
        luma[..4].copy_from_slice(&[top_x, top_y, top_x, top_y]);
        luma[4..].copy_from_slice(&[bottom_x, bottom_y, bottom_x, bottom_y]);

        mb.field_select = 0;
        if top_pred {
            mb.field_select |= 0x3;
        }
        if bottom_pred {
            mb.field_select |= 0xc;
        }
    } else if switch {
        if conceal_second_fwd {
            luma[4] = luma[6];
            luma[5] = luma[7];
        }
        if conceal_second_bwd {
            luma[6] = luma[4];
            luma[7] = luma[5];
        }

        mb.field_select = 0;
        if top_pred {
            mb.field_select |= 1 << top_bit;
        }
        if bottom_pred {
            // The bottom field flags are stored swapped.
            mb.field_select |= if bottom_bit == 3 { 0x4 } else { 0x8 };
        }
    }

    switch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::vc1::parser::FieldPictureType;
    use crate::codec::vc1::parser::FrameType;

    const VALUES: [i16; 9] = [-300, -17, -4, -1, 0, 1, 3, 64, 511];

    fn pic(structure: PictureStructure, picture_type: u8) -> PictureParameters {
        PictureParameters {
            structure,
            is_first_field: true,
            picture_type,
            ..Default::default()
        }
    }

    #[test]
    fn median3_properties() {
        for a in VALUES {
            for b in VALUES {
                for c in VALUES {
                    let m = median3(a, b, c);
                    let mut sorted = [a, b, c];
                    sorted.sort();
                    assert_eq!(m, sorted[1], "median3({a}, {b}, {c})");
                    assert!([a, b, c].contains(&m));
                }
            }
        }
    }

    #[test]
    fn median4_properties() {
        for a in VALUES {
            for b in VALUES {
                for c in VALUES {
                    for d in [-9, 0, 12] {
                        let all = [a, b, c, d].map(i32::from);
                        let expected = (all.iter().sum::<i32>()
                            - all.iter().max().unwrap()
                            - all.iter().min().unwrap())
                            / 2;
                        assert_eq!(i32::from(median4(a, b, c, d)), expected);
                        assert_eq!(median4(a, b, c, d), median4(d, c, b, a));
                        assert_eq!(median4(a, b, c, d), median4(c, a, d, b));
                    }
                }
            }
        }
    }

    #[test]
    fn chroma_rounding() {
        assert_eq!(chroma_mv(3), 2);
        assert_eq!(chroma_mv(5), 2);
        assert_eq!(chroma_mv(-1), 0);
        assert_eq!(chroma_mv(-6), -3);
        assert_eq!(fast_chroma_mv(-3), -2);
        assert_eq!(fast_chroma_mv(3), 2);

        for v in -200..200 {
            assert_eq!(fast_chroma_mv(chroma_mv(v)) % 2, 0);
        }
    }

    #[test]
    fn progressive_4mv_chroma() {
        let luma = [4, 8, 10, 2, -6, 6, 100, 100];

        // One intra block, chroma from the median of the other three.
        assert_eq!(chroma_4mv_progressive(0b0001, &luma), [2, 3]);
        // All blocks inter coded.
        assert_eq!(
            chroma_4mv_progressive(0, &luma),
            [chroma_mv(median4(4, 10, -6, 100)), chroma_mv(median4(8, 2, 6, 100))]
        );
        // Two inter blocks are averaged.
        assert_eq!(chroma_4mv_progressive(0b0011, &luma), [chroma_mv(7), chroma_mv(5)]);
        // Three or more intra blocks.
        assert_eq!(chroma_4mv_progressive(0b0111, &luma), [0, 0]);
    }

    #[test]
    fn field_4mv_same_polarity() {
        let mut luma = [2, 10, 4, 12, 6, 14, 8, 16];
        let (chroma, polarity) =
            chroma_4mv_interlaced(0, PictureStructure::BottomField, false, &mut luma).unwrap();
        assert_eq!(luma, [2, 8, 4, 10, 6, 12, 8, 14]);
        assert_eq!(chroma, [2, 6]);
        assert!(!polarity);

        let mut luma = [2, 10, 4, 12, 6, 14, 8, 16];
        let (chroma, polarity) =
            chroma_4mv_interlaced(0xf, PictureStructure::TopField, true, &mut luma).unwrap();
        assert_eq!(luma, [2, 12, 4, 14, 6, 16, 8, 18]);
        assert_eq!(chroma, [2, 8]);
        assert!(polarity);
    }

    #[test]
    fn field_4mv_three_and_two() {
        let mut luma = [2, 10, 4, 12, 6, 14, 8, 16];
        let (chroma, polarity) =
            chroma_4mv_interlaced(1, PictureStructure::TopField, true, &mut luma).unwrap();
        assert_eq!(luma[1], 12);
        assert_eq!(chroma, [2, 6]);
        assert!(!polarity);

        let mut luma = [2, 10, 4, 12, 6, 14, 8, 16];
        let (chroma, polarity) =
            chroma_4mv_interlaced(3, PictureStructure::TopField, false, &mut luma).unwrap();
        assert_eq!(luma, [2, 12, 4, 14, 6, 14, 8, 16]);
        assert_eq!(chroma, [4, 8]);
        assert!(!polarity);

        let mut luma = [0; 8];
        assert_eq!(
            chroma_4mv_interlaced(1, PictureStructure::Frame, false, &mut luma),
            Err(MvError::InvalidFieldPolarityOffset(PictureStructure::Frame))
        );
    }

    #[test]
    fn progressive_1mv() {
        let seq = SequenceFields::default();
        let mv = [1, 2, 3, 4, 5, 6, 7, 8];

        let mut mb = MacroblockMode {
            motion_forward: true,
            ..Default::default()
        };
        let packed = pack_motion_vectors(
            &seq,
            &pic(PictureStructure::Frame, FrameType::P as u8),
            &mut mb,
            &mv,
        )
        .unwrap();
        assert_eq!(packed.luma, [1, 2, 1, 2, 1, 2, 1, 2]);
        assert_eq!(packed.chroma, [0, 1]);

        let mut mb = MacroblockMode {
            motion_forward: true,
            motion_backward: true,
            ..Default::default()
        };
        let packed = pack_motion_vectors(
            &seq,
            &pic(PictureStructure::Frame, FrameType::B as u8),
            &mut mb,
            &mv,
        )
        .unwrap();
        assert_eq!(packed.luma, [1, 2, 5, 6, 1, 2, 5, 6]);
    }

    #[test]
    fn progressive_4mv_uses_intra_pattern() {
        let seq = SequenceFields {
            fast_uvmc: true,
            ..Default::default()
        };
        let mut mb = MacroblockMode {
            motion_forward: true,
            motion_4mv: true,
            block_luma_intra: 0b0001,
            ..Default::default()
        };
        let mv = [4, 8, 10, 2, -6, 6, 100, 100];

        let packed = pack_motion_vectors(
            &seq,
            &pic(PictureStructure::Frame, FrameType::P as u8),
            &mut mb,
            &mv,
        )
        .unwrap();
        assert_eq!(packed.luma, mv);
        assert_eq!(packed.chroma, [2, 2]);
    }

    #[test]
    fn field_1mv_forward_p() {
        let seq = SequenceFields::default();
        let mut mb = MacroblockMode {
            motion_forward: true,
            field_select: 0b0001,
            ..Default::default()
        };
        let mv = [6, 10, 0, 0, 0, 0, 0, 0];

        let packed = pack_motion_vectors(
            &seq,
            &pic(PictureStructure::TopField, FieldPictureType::PP as u8),
            &mut mb,
            &mv,
        )
        .unwrap();

        assert!(packed.field_polarity);
        assert_eq!(packed.luma, [6, 12, 6, 12, 6, 12, 6, 12]);
        assert_eq!(packed.chroma, [3, 6]);
        assert_eq!(mb.field_select, 0xf);
    }

    #[test]
    fn field_1mv_backward_b() {
        let seq = SequenceFields::default();
        let mut mb = MacroblockMode {
            motion_backward: true,
            field_select: 0b0001,
            ..Default::default()
        };
        let mv = [6, 10, 20, 30, 0, 0, 0, 0];

        let packed = pack_motion_vectors(
            &seq,
            &pic(PictureStructure::BottomField, FieldPictureType::BB as u8),
            &mut mb,
            &mv,
        )
        .unwrap();

        // Backward vector references the same field, forward the other one.
        assert!(!packed.field_polarity);
        assert_eq!(packed.luma, [6, 10, 20, 28, 6, 10, 20, 28]);
        assert_eq!(packed.chroma, [chroma_mv(20), chroma_mv(28)]);
        assert_eq!(mb.field_select, 0b0001);
    }

    #[test]
    fn interlaced_frame_field_motion_p() {
        let seq = SequenceFields::default();
        let mut mb = MacroblockMode {
            motion_forward: true,
            motion_type: MotionType::Field,
            ..Default::default()
        };
        let mv = [1, 2, 3, 4, 0, 0, 7, 8];

        let packed = pack_motion_vectors(
            &seq,
            &pic(PictureStructure::InterlacedFrame, FrameType::P as u8),
            &mut mb,
            &mv,
        )
        .unwrap();

        assert_eq!(packed.luma, [1, 2, 1, 2, 0, 4, 0, 4]);
        assert_eq!(packed.chroma, [0, 1]);
        assert!(!packed.motion_switch);
        assert_eq!(mb.field_select, 0);
    }

    #[test]
    fn interlaced_frame_field_motion_b_switch() {
        let seq = SequenceFields::default();
        let mut mb = MacroblockMode {
            motion_forward: true,
            motion_type: MotionType::Field,
            field_select: 0b0010,
            ..Default::default()
        };
        let mv = [1, 2, 3, 4, 0, 0, 7, 8];

        let packed = pack_motion_vectors(
            &seq,
            &pic(PictureStructure::InterlacedFrame, FrameType::B as u8),
            &mut mb,
            &mv,
        )
        .unwrap();

        // The lost second forward vector is replaced by the backward one.
        assert_eq!(packed.luma, [1, 2, 3, 4, 7, 12, 7, 12]);
        assert!(packed.motion_switch);
        assert_eq!(mb.field_select, 0);

        let mut mb = MacroblockMode {
            motion_backward: true,
            motion_type: MotionType::Field,
            field_select: 0b1011,
            ..Default::default()
        };
        let packed = pack_motion_vectors(
            &seq,
            &pic(PictureStructure::InterlacedFrame, FrameType::B as u8),
            &mut mb,
            &mv,
        )
        .unwrap();
        assert!(packed.motion_switch);
        assert_eq!(mb.field_select, 0b0010);
    }

    #[test]
    fn interlaced_frame_frame_motion_p() {
        let seq = SequenceFields::default();
        let mut mb = MacroblockMode {
            motion_forward: true,
            ..Default::default()
        };
        let mv = [1, 2, 3, 4, 5, 6, 7, 8];

        let packed = pack_motion_vectors(
            &seq,
            &pic(PictureStructure::InterlacedFrame, FrameType::P as u8),
            &mut mb,
            &mv,
        )
        .unwrap();
        assert_eq!(packed.luma, [1, 2, 1, 2, 1, 2, 1, 2]);

        let packed = pack_motion_vectors(
            &seq,
            &pic(PictureStructure::InterlacedFrame, FrameType::B as u8),
            &mut mb,
            &mv,
        )
        .unwrap();
        assert_eq!(packed.luma, [1, 2, 3, 4, 1, 2, 3, 4]);
    }
}
