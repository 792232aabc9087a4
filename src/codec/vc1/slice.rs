// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Per-slice data placement for the hardware slice descriptors.

use log::debug;
use log::warn;

use crate::bitstream_utils::BitReader;
use crate::codec::vc1::parser::parse_advanced_picture_header;
use crate::codec::vc1::parser::ParseResult;
use crate::codec::vc1::parser::PictureParameters;
use crate::codec::vc1::parser::SequenceFields;

/// Length of the `00 00 01` start code prefix.
pub const START_CODE_PREFIX_LEN: u32 = 3;
/// Stuffing bytes preceding Simple and Main profile short format slices.
pub const STUFFING_BYTES: u32 = 64;
/// Macroblock offset signaling a skipped frame in Advanced profile short
/// format.
pub const SKIPPED_FRAME_MB_OFFSET: u32 = 0xffff;

const SC_SUFFIX_BITS: usize = 8;
const SLICE_ADDR_BITS: usize = 9;

/// Slice parameters as provided by the host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SliceParameters {
    /// Byte offset of the slice in the bitstream buffer.
    pub slice_data_offset: u32,
    /// Size of the slice data in bits.
    pub slice_data_size: u32,
    /// Bit offset of the first macroblock from the slice start.
    pub macroblock_offset: u32,
    /// First macroblock row of the slice.
    pub slice_vertical_position: u32,
    pub number_macroblocks: u32,
}

/// Where the hardware finds the data of one slice.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SliceRecord {
    /// Byte offset of the macroblock data from the slice start.
    pub offset: u32,
    /// Number of bytes from `offset` to the end of the slice.
    pub length: u32,
    /// First macroblock row of the slice.
    pub y_offset: u32,
    /// First macroblock row of the next slice, or the picture height.
    pub next_y_offset: u32,
    /// The slice is inconsistent with the buffer or with the previous slices
    /// and must not be sent to the hardware.
    pub skip: bool,
}

/// Whether a short format picture is a skipped frame, from its first slice.
pub fn is_skipped_frame(seq: &SequenceFields, first_slice: &SliceParameters) -> bool {
    let num_mbs = u64::from(seq.width_in_mbs()) * u64::from(seq.height_in_mbs());

    if u64::from(first_slice.number_macroblocks) != num_mbs {
        return false;
    }

    if seq.is_advanced() {
        first_slice.macroblock_offset == SKIPPED_FRAME_MB_OFFSET
    } else {
        matches!(first_slice.slice_data_size, 0 | 8)
    }
}

/// Maps a byte offset in the slice data with emulation prevention bytes
/// removed to the matching offset in `data`.
fn raw_byte_offset(data: &[u8], offset: usize) -> usize {
    let is_epb = |j: usize| {
        data.get(j..j + 4)
            .map_or(false, |w| w[0] == 0 && w[1] == 0 && w[2] == 0x03 && w[3] < 0x04)
    };

    let mut i = 0;
    let mut j = 0;
    while i < offset - 1 && j < data.len() {
        if is_epb(j) {
            i += 1;
            j += 2;
        }
        i += 1;
        j += 1;
    }

    if i == offset - 1 {
        if is_epb(j) {
            j += 1;
        }
        j += 1;
    }

    j
}

/// Builds the slice records of a picture. `data` is the whole bitstream
/// buffer of the picture.
pub struct SliceResolver<'a> {
    data: &'a [u8],
    seq: &'a SequenceFields,
    pic: &'a PictureParameters,
    short_format: bool,
}

impl<'a> SliceResolver<'a> {
    pub fn new(
        data: &'a [u8],
        seq: &'a SequenceFields,
        pic: &'a PictureParameters,
        short_format: bool,
    ) -> Self {
        Self {
            data,
            seq,
            pic,
            short_format,
        }
    }

    /// Computes the record of every slice and updates the macroblock offsets
    /// and vertical positions of `slices` the way the hardware expects them.
    pub fn resolve(&self, slices: &mut [SliceParameters]) -> ParseResult<Vec<SliceRecord>> {
        let records = self.build_records(slices);

        if self.short_format && self.seq.is_advanced() {
            self.resolve_macroblock_offsets(slices, &records)?;
        }

        Ok(records)
    }

    /// Validates the slices and places their macroblock data.
    pub fn build_records(&self, slices: &mut [SliceParameters]) -> Vec<SliceRecord> {
        let height_in_mbs = self.pic.structure.height_in_mbs(self.seq.height_in_mbs());
        let mut records = Vec::with_capacity(slices.len());
        // Index and coded row of the last slice kept.
        let mut prev_valid: Option<(usize, u32)> = None;

        for (i, slice) in slices.iter_mut().enumerate() {
            let y_offset = slice.slice_vertical_position;
            records.push(SliceRecord {
                y_offset,
                next_y_offset: height_in_mbs,
                ..Default::default()
            });

            let Some((offset, length)) = self.place(i, slice) else {
                warn!("Skipping slice {}: data is out of bounds", i);
                records[i].skip = true;
                continue;
            };

            match prev_valid {
                Some((_, prev_y)) if y_offset <= prev_y => {
                    warn!(
                        "Skipping slice {}: starts at row {}, previous slice at row {}",
                        i, y_offset, prev_y
                    );
                    records[i].skip = true;
                    continue;
                }
                Some((prev, _)) => records[prev].next_y_offset = y_offset,
                None => {
                    records[i].y_offset = 0;
                    slice.slice_vertical_position = 0;
                }
            }

            if self.short_format && !self.seq.is_advanced() {
                slice.macroblock_offset += STUFFING_BYTES << 3;
                slice.macroblock_offset &= !0x7;
            } else if self.short_format && i == 0 {
                slice.macroblock_offset = START_CODE_PREFIX_LEN << 3;
            }

            records[i].offset = offset;
            records[i].length = length - offset;
            prev_valid = Some((i, y_offset));
        }

        records
    }

    /// Returns the macroblock data offset and the length of a slice, in
    /// bytes, or `None` if the slice cannot be decoded.
    fn place(&self, index: usize, slice: &SliceParameters) -> Option<(u32, u32)> {
        let start = slice.slice_data_offset as usize;
        let slice_data = self.data.get(start..)?;
        let available = u32::try_from(slice_data.len()).unwrap_or(u32::MAX);
        let length = std::cmp::min(slice.slice_data_size >> 3, available);

        // Emulation prevention bytes only move the offset forward.
        let mut offset = slice.macroblock_offset >> 3;
        if offset > length {
            return None;
        }

        if offset > START_CODE_PREFIX_LEN && self.seq.is_advanced() {
            offset = raw_byte_offset(slice_data, offset as usize) as u32;
            if offset > length {
                return None;
            }
        }

        if !self.short_format {
            return Some((offset, length));
        }

        if self.seq.is_advanced() {
            if slice.macroblock_offset >> 3 < START_CODE_PREFIX_LEN {
                debug!("Slice {} has no room for a start code", index);
                return None;
            }
            Some((START_CODE_PREFIX_LEN, length))
        } else {
            Some((STUFFING_BYTES - 1, length + STUFFING_BYTES))
        }
    }

    /// Parses the headers of the slices following the first one to find
    /// where their macroblock data starts. Slices repeating the picture
    /// header all share the offset found in the first of them.
    pub fn resolve_macroblock_offsets(
        &self,
        slices: &mut [SliceParameters],
        records: &[SliceRecord],
    ) -> ParseResult<()> {
        let mut macroblock_offset = None;

        for (slice, record) in slices.iter_mut().zip(records).skip(1) {
            if record.skip {
                continue;
            }

            let start = slice.slice_data_offset as usize + record.offset as usize;
            let end = std::cmp::min(start + record.length as usize, self.data.len());
            let mut r = BitReader::new(self.data.get(start..end).unwrap_or_default(), true);

            r.skip_bits(SC_SUFFIX_BITS)?;
            let address: u32 = r.read_bits(SLICE_ADDR_BITS)?;
            let pic_header_flag = r.read_bit()?;
            debug!("Slice at row {} repeats the picture header: {}", address, pic_header_flag);

            if !pic_header_flag {
                continue;
            }

            let offset = match macroblock_offset {
                Some(offset) => offset,
                None => {
                    parse_advanced_picture_header(&mut r, self.seq, self.pic)?;
                    let offset = r.position() as u32 + (START_CODE_PREFIX_LEN << 3);
                    macroblock_offset = Some(offset);
                    offset
                }
            };

            slice.macroblock_offset = offset;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::bitstream_utils::BitWriter;
    use crate::bitstream_utils::EmulationPrevention;
    use crate::codec::vc1::parser::FrameType;
    use crate::codec::vc1::parser::PictureStructure;
    use crate::codec::vc1::parser::Profile;

    fn bdu(suffix: u8, fields: &[(usize, u32)], payload_len: usize) -> Vec<u8> {
        let mut ep = EmulationPrevention::new(Vec::new());
        ep.write_start_code(suffix).unwrap();
        {
            let mut writer = BitWriter::new(&mut ep);
            for (len, value) in fields {
                writer.write_f(*len, *value).unwrap();
            }
        }
        ep.write_all(&vec![0x5a; payload_len]).unwrap();
        ep.inner().clone()
    }

    fn main_seq() -> SequenceFields {
        SequenceFields {
            profile: Profile::Main,
            coded_width: 128,
            coded_height: 128,
            ..Default::default()
        }
    }

    fn advanced_seq() -> SequenceFields {
        SequenceFields {
            profile: Profile::Advanced,
            ..main_seq()
        }
    }

    fn slice(offset: u32, size: u32, mb_offset: u32, y: u32) -> SliceParameters {
        SliceParameters {
            slice_data_offset: offset,
            slice_data_size: size * 8,
            macroblock_offset: mb_offset,
            slice_vertical_position: y,
            number_macroblocks: 8,
        }
    }

    #[test]
    fn out_of_order_slice_is_skipped() {
        let data = [0x5au8; 100];
        let seq = main_seq();
        let pic = PictureParameters::default();
        let mut slices = [slice(0, 50, 32, 5), slice(50, 50, 32, 3)];

        let records = SliceResolver::new(&data, &seq, &pic, false)
            .resolve(&mut slices)
            .unwrap();

        assert_eq!(
            records[0],
            SliceRecord {
                offset: 4,
                length: 46,
                y_offset: 0,
                next_y_offset: 8,
                skip: false,
            }
        );
        assert!(records[1].skip);
        assert_eq!(slices[0].slice_vertical_position, 0);
        assert_eq!(slices[1].slice_vertical_position, 3);
    }

    #[test]
    fn next_row_links_valid_slices() {
        let data = [0x5au8; 96];
        let seq = main_seq();
        let pic = PictureParameters {
            structure: PictureStructure::TopField,
            ..Default::default()
        };
        let mut slices = [
            slice(0, 32, 8, 0),
            slice(32, 32, 8, 2),
            // Starts past the end of the buffer.
            slice(200, 32, 8, 3),
            slice(64, 32, 8, 3),
        ];

        let records = SliceResolver::new(&data, &seq, &pic, false).build_records(&mut slices);

        let rows: Vec<_> = records
            .iter()
            .map(|r| (r.y_offset, r.next_y_offset, r.skip))
            .collect();
        assert_eq!(rows, vec![(0, 2, false), (2, 3, false), (3, 4, true), (3, 4, false)]);
    }

    #[test]
    fn bounds_are_checked() {
        let data = [0x5au8; 40];
        let seq = main_seq();
        let pic = PictureParameters::default();
        let mut slices = [
            // Claims more data than the buffer holds.
            slice(0, 64, 16, 0),
            // Macroblock data starts after the slice end.
            slice(20, 2, 32, 1),
        ];

        let records = SliceResolver::new(&data, &seq, &pic, false).build_records(&mut slices);
        assert_eq!((records[0].offset, records[0].length), (2, 38));
        assert!(!records[0].skip);
        assert!(records[1].skip);
    }

    #[test]
    fn emulation_prevention_shifts_the_offset() {
        let mut data = vec![0x00, 0x00, 0x01, 0x0b, 0x00, 0x00, 0x03, 0x01, 0xaa];
        data.extend_from_slice(&[0x5a; 23]);
        let seq = advanced_seq();
        let pic = PictureParameters::default();
        let mut slices = [slice(0, 32, 8 * 8 + 3, 0)];

        let records = SliceResolver::new(&data, &seq, &pic, false).build_records(&mut slices);
        assert_eq!(records[0].offset, 9);
        assert_eq!(records[0].length, 23);

        // Without emulation prevention bytes the offsets match.
        assert_eq!(raw_byte_offset(&[0x11; 16], 8), 8);
    }

    #[test]
    fn huge_macroblock_offset_is_skipped() {
        let data = [0x5au8; 100];
        let seq = advanced_seq();
        let pic = PictureParameters::default();
        let mut slices = [slice(0, 100, 0xffff_fff8, 0), slice(0, 100, 0x7_fff8, 1)];

        let records = SliceResolver::new(&data, &seq, &pic, false).build_records(&mut slices);
        assert!(records[0].skip);
        assert!(records[1].skip);

        // The translated offset never runs past the data.
        assert_eq!(raw_byte_offset(&[0x00, 0x00, 0x03, 0x01], 1000), 4);
    }

    #[test]
    fn short_format_simple_main() {
        let data = [0x5au8; 64];
        let seq = main_seq();
        let pic = PictureParameters::default();
        let mut slices = [slice(0, 64, 13, 0)];

        let records = SliceResolver::new(&data, &seq, &pic, true)
            .resolve(&mut slices)
            .unwrap();
        assert_eq!(records[0].offset, 63);
        assert_eq!(records[0].length, 64 + 64 - 63);
        assert_eq!(slices[0].macroblock_offset, (13 + 512) & !7);
    }

    #[test]
    fn short_format_advanced_resolves_macroblock_offsets() {
        let seq = advanced_seq();
        let pic = PictureParameters {
            picture_type: FrameType::I as u8,
            pic_quantizer_scale: 9,
            ..Default::default()
        };

        let header = [
            (3, 0b110),
            (1, 0),
            (5, 9),
            // ACPRED, raw.
            (1, 0),
            (4, 0),
            (1, 0),
            (1, 0),
            (1, 0),
        ];

        let mut data = bdu(0x0d, &header, 30);
        let first_len = data.len() as u32;

        let mut with_header = vec![(9, 4), (1, 1)];
        with_header.extend_from_slice(&header);
        let second = bdu(0x0b, &with_header, 20);
        let second_len = second.len() as u32;
        data.extend_from_slice(&second);

        let third = bdu(0x0b, &[(9, 6), (1, 0)], 20);
        let third_len = third.len() as u32;
        data.extend_from_slice(&third);

        let mut slices = [
            slice(0, first_len, 40, 0),
            slice(first_len, second_len, 40, 4),
            slice(first_len + second_len, third_len, 42, 6),
        ];

        let records = SliceResolver::new(&data, &seq, &pic, true)
            .resolve(&mut slices)
            .unwrap();

        assert!(records.iter().all(|r| !r.skip && r.offset == 3));
        assert_eq!(records[1].length, second_len - 3);
        assert_eq!(slices[0].macroblock_offset, 24);
        assert_eq!(slices[1].macroblock_offset, 24 + 8 + 9 + 1 + 17);
        assert_eq!(slices[2].macroblock_offset, 42);
    }

    #[test]
    fn short_format_advanced_needs_a_start_code() {
        let data = [0x5au8; 32];
        let seq = advanced_seq();
        let pic = PictureParameters::default();
        let mut slices = [slice(0, 16, 16, 0), slice(16, 16, 32, 1)];

        let records = SliceResolver::new(&data, &seq, &pic, true).build_records(&mut slices);
        assert!(records[0].skip);
        assert!(!records[1].skip);
        assert_eq!(records[1].y_offset, 0);
    }

    #[test]
    fn skipped_frames() {
        let seq = advanced_seq();
        let mut first = SliceParameters {
            macroblock_offset: SKIPPED_FRAME_MB_OFFSET,
            number_macroblocks: 64,
            ..Default::default()
        };
        assert!(is_skipped_frame(&seq, &first));
        first.number_macroblocks = 63;
        assert!(!is_skipped_frame(&seq, &first));

        let seq = main_seq();
        let first = SliceParameters {
            slice_data_size: 8,
            number_macroblocks: 64,
            ..Default::default()
        };
        assert!(is_skipped_frame(&seq, &first));
        let first = SliceParameters {
            slice_data_size: 16,
            ..first
        };
        assert!(!is_skipped_frame(&seq, &first));

        let seq = SequenceFields {
            coded_width: u32::MAX,
            coded_height: u32::MAX,
            ..advanced_seq()
        };
        let first = SliceParameters {
            macroblock_offset: SKIPPED_FRAME_MB_OFFSET,
            number_macroblocks: u32::MAX,
            ..Default::default()
        };
        assert!(!is_skipped_frame(&seq, &first));
    }
}
