// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use enumn::N;
use log::debug;
use thiserror::Error;

use crate::bitstream_utils::BitReader;
use crate::bitstream_utils::BitReaderError;
use crate::codec::vc1::bitplane::parse_bitplane;
use crate::codec::vc1::bitplane::Bitplane;
use crate::codec::vc1::bitplane::BitplaneError;
use crate::codec::vc1::bitplane::BitplaneKind;
use crate::codec::vc1::vlc;
use crate::codec::vc1::vlc::VlcError;

const START_CODE_PREFIX: [u8; 3] = [0x00, 0x00, 0x01];
/// Start code prefix plus suffix byte.
const START_CODE_LEN: usize = 4;

const PAN_SCAN_WINDOW_BITS: usize = 18 + 18 + 14 + 14;
const LUMSCALE_LUMSHIFT_BITS: usize = 6 + 6;

/// Scale factors indexed by the decoded BFRACTION.
const B_FRACTION_SCALE_FACTORS: [u8; 21] = [
    128, 85, 170, 64, 192, 51, 102, 153, 204, 43, 215, 37, 74, 111, 148, 185, 222, 32, 96, 160,
    224,
];

/// BFRACTION code signaling a BI picture in Simple and Main profiles.
pub const B_FRACTION_BI: u8 = 0x7f;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error(transparent)]
    Read(#[from] BitReaderError),
    #[error(transparent)]
    Vlc(#[from] VlcError),
    #[error(transparent)]
    Bitplane(#[from] BitplaneError),
    #[error("RNDCTRL must be 0 for I and BI pictures")]
    NonZeroRoundingControl,
    #[error("picture type {0} is not valid for a {1:?} picture")]
    UnsupportedPictureType(u8, PictureStructure),
    #[error("picture data does not start with a start code")]
    MissingStartCode,
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Simple = 0,
    Main = 1,
    Advanced = 3,
}

/// How the current picture is laid out. The values match the picture flags
/// used by the hardware.
#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PictureStructure {
    TopField = 1,
    BottomField = 2,
    #[default]
    Frame = 4,
    InterlacedFrame = 8,
}

impl PictureStructure {
    /// Derives the structure from FCM and the field order.
    pub fn from_frame_coding_mode(
        fcm: FrameCodingMode,
        is_first_field: bool,
        top_field_first: bool,
    ) -> Self {
        match fcm {
            FrameCodingMode::Progressive => PictureStructure::Frame,
            FrameCodingMode::InterlacedFrame => PictureStructure::InterlacedFrame,
            FrameCodingMode::InterlacedField => {
                if is_first_field ^ top_field_first {
                    PictureStructure::BottomField
                } else {
                    PictureStructure::TopField
                }
            }
        }
    }

    pub fn is_field(self) -> bool {
        matches!(self, PictureStructure::TopField | PictureStructure::BottomField)
    }

    /// Height of the picture in macroblocks, given the frame height.
    pub fn height_in_mbs(self, frame_height_in_mbs: u32) -> u32 {
        if self.is_field() {
            frame_height_in_mbs.div_ceil(2)
        } else {
            frame_height_in_mbs
        }
    }
}

/// FCM syntax element.
#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameCodingMode {
    #[default]
    Progressive = 0,
    InterlacedFrame = 1,
    InterlacedField = 2,
}

/// Coding type of a frame or of a single field.
#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameType {
    #[default]
    I = 0,
    P = 1,
    B = 2,
    BI = 3,
    Skipped = 4,
}

impl FrameType {
    /// Simple and Main profile BI pictures are announced as I pictures with a
    /// BI fraction code.
    pub fn infer_bi(self, b_picture_fraction: u8) -> Self {
        if self == FrameType::I && b_picture_fraction == B_FRACTION_BI {
            FrameType::BI
        } else {
            self
        }
    }
}

/// FPTYPE, the coding types of the two fields of a field-interlaced frame.
#[derive(N, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldPictureType {
    II = 0,
    IP = 1,
    PI = 2,
    PP = 3,
    BB = 4,
    BBI = 5,
    BIB = 6,
    BIBI = 7,
}

impl FieldPictureType {
    /// Returns the coding types of the first and second fields.
    pub fn field_types(self) -> (FrameType, FrameType) {
        match self {
            FieldPictureType::II => (FrameType::I, FrameType::I),
            FieldPictureType::IP => (FrameType::I, FrameType::P),
            FieldPictureType::PI => (FrameType::P, FrameType::I),
            FieldPictureType::PP => (FrameType::P, FrameType::P),
            FieldPictureType::BB => (FrameType::B, FrameType::B),
            FieldPictureType::BBI => (FrameType::B, FrameType::BI),
            FieldPictureType::BIB => (FrameType::BI, FrameType::B),
            FieldPictureType::BIBI => (FrameType::BI, FrameType::BI),
        }
    }
}

/// Motion vector mode of a P or B picture.
#[derive(N, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MvMode {
    OneMvHalfPelBilinear = 0,
    OneMvHalfPel = 1,
    OneMv = 2,
    MixedMv = 3,
    IntensityCompensation = 4,
}

const LOW_RATE_MV_MODES: [MvMode; 5] = [
    MvMode::OneMvHalfPelBilinear,
    MvMode::OneMv,
    MvMode::OneMvHalfPel,
    MvMode::MixedMv,
    MvMode::IntensityCompensation,
];

const HIGH_RATE_MV_MODES: [MvMode; 5] = [
    MvMode::OneMv,
    MvMode::MixedMv,
    MvMode::OneMvHalfPel,
    MvMode::OneMvHalfPelBilinear,
    MvMode::IntensityCompensation,
];

/// Sequence and entry-point level settings, as provided by the host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SequenceFields {
    pub profile: Profile,
    /// Content may be coded as interlaced frames or fields.
    pub interlace: bool,
    /// Pulldown syntax elements are present in picture headers.
    pub pulldown: bool,
    /// TFCNTR is present in picture headers.
    pub tfcntrflag: bool,
    /// INTERPFRM is present in picture headers.
    pub finterpflag: bool,
    /// RANGEREDFRM is present in Simple/Main picture headers.
    pub rangered: bool,
    pub max_b_frames: u8,
    pub overlap: bool,
    /// Pan-scan windows may be present.
    pub panscan_flag: bool,
    pub extended_mv: bool,
    pub extended_dmv: bool,
    /// DQUANT, the macroblock quantization mode.
    pub dquant: u8,
    /// QUANTIZER, 1 means PQUANTIZER is explicitly coded.
    pub quantizer: u8,
    pub variable_sized_transform: bool,
    /// REFDIST_FLAG.
    pub reference_distance_flag: bool,
    /// POSTPROCFLAG.
    pub post_processing: bool,
    pub fast_uvmc: bool,
    pub coded_width: u32,
    pub coded_height: u32,
}

impl SequenceFields {
    pub fn width_in_mbs(&self) -> u32 {
        self.coded_width.div_ceil(16)
    }

    pub fn height_in_mbs(&self) -> u32 {
        self.coded_height.div_ceil(16)
    }

    pub fn is_advanced(&self) -> bool {
        self.profile == Profile::Advanced
    }
}

/// Per-picture settings provided by the host alongside the bitstream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PictureParameters {
    pub structure: PictureStructure,
    pub is_first_field: bool,
    /// A [`FrameType`] for frames, a [`FieldPictureType`] for fields.
    pub picture_type: u8,
    /// PQUANT.
    pub pic_quantizer_scale: u8,
    pub reference_picture_flag: bool,
}

impl PictureParameters {
    /// The coding type of the current frame, or of the current field.
    pub fn frame_type(&self) -> ParseResult<FrameType> {
        let invalid = || ParseError::UnsupportedPictureType(self.picture_type, self.structure);

        if self.structure.is_field() {
            let (first, second) = FieldPictureType::n(self.picture_type)
                .ok_or_else(invalid)?
                .field_types();
            Ok(if self.is_first_field { first } else { second })
        } else {
            FrameType::n(self.picture_type).ok_or_else(invalid)
        }
    }

    pub fn is_i(&self) -> bool {
        matches!(self.frame_type(), Ok(FrameType::I))
    }

    pub fn is_p(&self) -> bool {
        matches!(self.frame_type(), Ok(FrameType::P))
    }

    pub fn is_b(&self) -> bool {
        matches!(self.frame_type(), Ok(FrameType::B))
    }

    pub fn is_bi(&self) -> bool {
        matches!(self.frame_type(), Ok(FrameType::BI))
    }
}

/// VOPDQUANT syntax elements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VopDquant {
    /// DQUANTFRM, the picture uses an alternative quantizer.
    pub dquantfrm: bool,
    /// DQPROFILE: all four edges, double edges, single edge or all
    /// macroblocks.
    pub dqprofile: u8,
    /// DQSBEDGE or DQDBEDGE, depending on the profile.
    pub dqedge: u8,
    /// DQBILEVEL.
    pub dqbilevel: bool,
    /// PQDIFF, 7 means ABSPQ follows.
    pub pqdiff: u8,
    /// ABSPQ.
    pub abspq: u8,
}

impl VopDquant {
    /// Returns the alternative quantizer when one is signaled.
    pub fn alt_pquant(&self, pquant: u8) -> Option<u8> {
        if !self.dquantfrm || (self.dqprofile == 3 && !self.dqbilevel) {
            return None;
        }

        if self.pqdiff == 7 {
            Some(self.abspq)
        } else {
            Some(pquant + self.pqdiff + 1)
        }
    }

    /// Returns the `(config, edge mask)` pair the hardware uses to pick
    /// between PQUANT and ALTPQUANT.
    pub fn alt_pquant_config(&self, dquant: u8) -> (u8, u8) {
        match dquant {
            0 => (0, 0),
            1 if !self.dquantfrm => (0, 0),
            1 => match self.dqprofile {
                0 => (1, 0xf),
                1 if self.dqedge == 3 => (1, 0x9),
                1 => (1, 0x3 << self.dqedge),
                2 => (1, 0x1 << self.dqedge),
                _ if self.dqbilevel => (3, 0),
                _ => (2, 0),
            },
            _ => (1, 0xf),
        }
    }
}

/// Maps a decoded BFRACTION to its scale factor. Out of range values use the
/// factor of 1/2.
pub fn b_fraction_scale_factor(b_picture_fraction: u8) -> u8 {
    B_FRACTION_SCALE_FACTORS
        .get(usize::from(b_picture_fraction))
        .copied()
        .unwrap_or(B_FRACTION_SCALE_FACTORS[0])
}

/// A parsed picture header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PictureHeader {
    /// FCM, present when the sequence is interlaced.
    pub fcm: FrameCodingMode,
    /// PTYPE as coded in a frame header.
    pub coded_frame_type: Option<FrameType>,
    /// FPTYPE as coded in a field header.
    pub field_picture_type: Option<FieldPictureType>,
    /// TFCNTR.
    pub tfcntr: u8,
    /// RPTFRM, for progressive sequences with pulldown.
    pub rptfrm: u8,
    /// TFF, for interlaced sequences with pulldown.
    pub tff: bool,
    /// RFF, for interlaced sequences with pulldown.
    pub rff: bool,
    /// Whether pan-scan windows were present and skipped.
    pub ps_present: bool,
    /// RNDCTRL.
    pub rndctrl: bool,
    /// UVSAMP.
    pub uvsamp: bool,
    /// INTERPFRM.
    pub interpfrm: bool,
    /// FRMCNT, Simple and Main only.
    pub frmcnt: u8,
    /// RANGEREDFRM, Simple and Main only.
    pub rangeredfrm: bool,
    /// Decoded BFRACTION index, or [`B_FRACTION_BI`].
    pub b_picture_fraction: Option<u8>,
    /// REFDIST.
    pub reference_distance: Option<u8>,
    /// PQINDEX.
    pub pqindex: u8,
    /// HALFQP, only present for PQINDEX <= 8.
    pub halfqp: bool,
    /// PQUANTIZER.
    pub pquantizer: bool,
    /// POSTPROC.
    pub postproc: u8,
    /// CONDOVER: 0 no overlap smoothing, 2 all macroblocks, 3 signaled by
    /// the OVERFLAGS bitplane.
    pub condover: u8,
    /// NUMREF, two reference fields are used.
    pub num_ref: bool,
    /// REFFIELD, when a single reference field is used.
    pub ref_field: bool,
    /// MVRANGE index.
    pub mv_range: u8,
    /// DMVRANGE index.
    pub dmv_range: u8,
    /// Effective motion vector mode.
    pub mv_mode: Option<MvMode>,
    /// Intensity compensation is signaled.
    pub intensity_compensation: bool,
    /// Bitplanes coded in the picture header, in bitstream order.
    pub bitplanes: Vec<Bitplane>,
    pub vop_dquant: VopDquant,
    /// TTMBF.
    pub ttmbf: bool,
    /// TTFRM.
    pub ttfrm: u8,
    /// TRANSACFRM index.
    pub transacfrm: u8,
    /// TRANSACFRM2 index.
    pub transacfrm2: u8,
    /// TRANSDCTAB.
    pub transdctab: bool,
    /// Number of decoded bits in the header.
    pub header_bits: u64,
}

impl PictureHeader {
    /// Whether at least one bitplane is coded in the header rather than in
    /// the macroblock layer.
    pub fn bitplane_present(&self) -> bool {
        self.bitplanes.iter().any(|bp| !bp.is_raw())
    }

    pub fn bitplane(&self, kind: BitplaneKind) -> Option<&Bitplane> {
        self.bitplanes.iter().find(|bp| bp.kind == kind)
    }
}

/// Which picture layer syntax follows the common header fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PictureLayer {
    Intra,
    ProgressiveP,
    ProgressiveB,
    InterlacedP,
    InterlacedB,
    /// Skipped pictures carry no further header.
    None,
}

/// Walks the header of one picture.
struct HeaderParser<'a, 'r> {
    r: &'r mut BitReader<'a>,
    seq: &'r SequenceFields,
    pic: &'r PictureParameters,
    frame_type: FrameType,
    hdr: PictureHeader,
}

impl<'a, 'r> HeaderParser<'a, 'r> {
    fn new(
        r: &'r mut BitReader<'a>,
        seq: &'r SequenceFields,
        pic: &'r PictureParameters,
    ) -> ParseResult<Self> {
        Ok(Self {
            frame_type: pic.frame_type()?,
            r,
            seq,
            pic,
            hdr: Default::default(),
        })
    }

    fn finish(mut self, start: u64) -> PictureHeader {
        self.hdr.header_bits = self.r.position() - start;
        self.hdr
    }

    fn is_intra(&self) -> bool {
        matches!(self.frame_type, FrameType::I | FrameType::BI)
    }

    fn layer(&self) -> PictureLayer {
        let interlaced = self.pic.structure != PictureStructure::Frame;

        match (self.frame_type, interlaced) {
            (FrameType::I | FrameType::BI, _) => PictureLayer::Intra,
            (FrameType::P, false) => PictureLayer::ProgressiveP,
            (FrameType::B, false) => PictureLayer::ProgressiveB,
            (FrameType::P, true) => PictureLayer::InterlacedP,
            (FrameType::B, true) => PictureLayer::InterlacedB,
            (FrameType::Skipped, _) => PictureLayer::None,
        }
    }

    fn bitplane_dimensions(&self) -> (u32, u32) {
        (
            self.seq.width_in_mbs(),
            self.pic.structure.height_in_mbs(self.seq.height_in_mbs()),
        )
    }

    fn parse_bitplane(&mut self, kind: BitplaneKind) -> ParseResult<()> {
        let (width, height) = self.bitplane_dimensions();
        let bitplane = parse_bitplane(self.r, kind, width, height)?;
        self.hdr.bitplanes.push(bitplane);
        Ok(())
    }

    /// Reads a code of the 0, 10, 110, 111 family, returning 0 to 3.
    fn read_ladder(&mut self) -> ParseResult<u8> {
        let mut index = 0;
        while index < 3 && self.r.read_bit()? {
            index += 1;
        }
        Ok(index)
    }

    /// Reads a unary-coded table index of at most `max_bits` bits. The last
    /// bit of a full-length code selects between the two longest entries,
    /// with its meaning flipped when `inverted` is set.
    fn read_mv_mode_index(&mut self, max_bits: usize, inverted: bool) -> ParseResult<usize> {
        let mut bit_count = 1;
        let mut value = self.r.read_bit()?;
        while !value && bit_count < max_bits {
            value = self.r.read_bit()?;
            bit_count += 1;
        }

        if bit_count < max_bits {
            Ok(bit_count - 1)
        } else {
            Ok(bit_count + usize::from(value ^ inverted) - 1)
        }
    }

    fn mv_mode_table(&self) -> &'static [MvMode; 5] {
        if self.pic.pic_quantizer_scale > 12 {
            &LOW_RATE_MV_MODES
        } else {
            &HIGH_RATE_MV_MODES
        }
    }

    fn parse_simple_main(&mut self) -> ParseResult<()> {
        debug!("Parsing VC1 simple/main picture header.");

        if self.seq.finterpflag {
            self.hdr.interpfrm = self.r.read_bit()?;
        }

        self.hdr.frmcnt = self.r.read_bits(2)?;

        if self.seq.rangered {
            self.hdr.rangeredfrm = self.r.read_bit()?;
        }

        if self.r.read_bit()? {
            self.hdr.coded_frame_type = Some(FrameType::P);
        } else if self.seq.max_b_frames == 0 || self.r.read_bit()? {
            self.hdr.coded_frame_type = Some(FrameType::I);
        } else if self.r.peek_bits::<u8>(7).ok() == Some(B_FRACTION_BI) {
            self.r.skip_bits(7)?;
            self.hdr.coded_frame_type = Some(FrameType::BI);
            self.hdr.b_picture_fraction = Some(B_FRACTION_BI);
        } else {
            self.hdr.coded_frame_type = Some(FrameType::B);
            self.hdr.b_picture_fraction = Some(vlc::B_FRACTION.decode(self.r)?);
        }

        Ok(())
    }

    fn parse_advanced(&mut self) -> ParseResult<()> {
        debug!("Parsing VC1 advanced picture header.");

        let structure = self.pic.structure;

        if self.seq.interlace {
            self.hdr.fcm = if !self.r.read_bit()? {
                FrameCodingMode::Progressive
            } else if !self.r.read_bit()? {
                FrameCodingMode::InterlacedFrame
            } else {
                FrameCodingMode::InterlacedField
            };
        }

        if structure.is_field() {
            // Every 3-bit value is a valid FPTYPE.
            self.hdr.field_picture_type = FieldPictureType::n(self.r.read_bits::<u8>(3)?);
        } else {
            self.hdr.coded_frame_type = Some(vlc::PICTURE_TYPE.decode(self.r)?);
        }

        if self.seq.tfcntrflag {
            self.hdr.tfcntr = self.r.read_bits(8)?;
        }

        if self.seq.pulldown {
            if !self.seq.interlace {
                self.hdr.rptfrm = self.r.read_bits(2)?;
            } else {
                self.hdr.tff = self.r.read_bit()?;
                self.hdr.rff = self.r.read_bit()?;
            }
        }

        if self.seq.panscan_flag {
            let num_windows = match (structure.is_field(), self.seq.pulldown) {
                (false, false) => 1,
                (false, true) => 1 + usize::from(self.hdr.rptfrm),
                (true, false) => 2,
                (true, true) => 2 + usize::from(self.hdr.rff),
            };

            self.hdr.ps_present = self.r.read_bit()?;
            if self.hdr.ps_present {
                self.r.skip_bits(PAN_SCAN_WINDOW_BITS * num_windows)?;
            }
        }

        self.hdr.rndctrl = self.r.read_bit()?;
        if self.is_intra() && self.hdr.rndctrl {
            return Err(ParseError::NonZeroRoundingControl);
        }

        if self.seq.interlace {
            self.hdr.uvsamp = self.r.read_bit()?;
        }

        if self.seq.finterpflag && structure == PictureStructure::Frame {
            self.hdr.interpfrm = self.r.read_bit()?;
        }

        if structure != PictureStructure::InterlacedFrame
            && (self.frame_type == FrameType::B
                || (structure.is_field() && self.frame_type == FrameType::BI))
        {
            self.hdr.b_picture_fraction = Some(vlc::B_FRACTION.decode(self.r)?);
        }

        if structure.is_field()
            && self.seq.reference_distance_flag
            && self.pic.reference_picture_flag
        {
            let mut refdist = self.r.read_bits::<u8>(2)?;
            if refdist == 3 {
                refdist = vlc::REF_DIST.decode(self.r)?;
            }
            self.hdr.reference_distance = Some(refdist);
        }

        self.hdr.pqindex = self.r.read_bits(5)?;
        if self.hdr.pqindex <= 8 {
            self.hdr.halfqp = self.r.read_bit()?;
        }

        if self.seq.quantizer == 1 {
            self.hdr.pquantizer = self.r.read_bit()?;
        }

        if self.seq.post_processing {
            self.hdr.postproc = self.r.read_bits(2)?;
        }

        match self.layer() {
            PictureLayer::Intra => self.parse_intra_layer(),
            PictureLayer::ProgressiveP => self.parse_progressive_p_layer(),
            PictureLayer::ProgressiveB => self.parse_progressive_b_layer(),
            PictureLayer::InterlacedP => self.parse_interlaced_p_layer(),
            PictureLayer::InterlacedB => self.parse_interlaced_b_layer(),
            PictureLayer::None => Ok(()),
        }
    }

    fn parse_intra_layer(&mut self) -> ParseResult<()> {
        if self.pic.structure == PictureStructure::InterlacedFrame {
            self.parse_bitplane(BitplaneKind::FieldTx)?;
        }

        self.parse_bitplane(BitplaneKind::AcPred)?;

        if self.seq.overlap && self.pic.pic_quantizer_scale <= 8 && self.r.read_bit()? {
            if self.r.read_bit()? {
                self.hdr.condover = 3;
                self.parse_bitplane(BitplaneKind::OverFlags)?;
            } else {
                self.hdr.condover = 2;
            }
        }

        self.hdr.transacfrm = self.read_transacfrm()?;
        self.hdr.transacfrm2 = self.read_transacfrm()?;
        self.hdr.transdctab = self.r.read_bit()?;

        self.parse_vop_dquant()
    }

    fn parse_progressive_p_layer(&mut self) -> ParseResult<()> {
        if self.seq.extended_mv {
            self.hdr.mv_range = self.read_ladder()?;
        }

        self.parse_progressive_mv_mode()?;

        if self.hdr.mv_mode == Some(MvMode::MixedMv) {
            self.parse_bitplane(BitplaneKind::MvTypeMb)?;
        }

        self.parse_bitplane(BitplaneKind::SkipMb)?;

        // MVTAB and CBPTAB.
        self.r.skip_bits(2 + 2)?;

        self.parse_vop_dquant()?;
        self.parse_transform_type()?;
        self.hdr.transacfrm = self.read_transacfrm()?;
        self.hdr.transdctab = self.r.read_bit()?;

        Ok(())
    }

    fn parse_progressive_b_layer(&mut self) -> ParseResult<()> {
        if self.seq.extended_mv {
            self.hdr.mv_range = self.read_ladder()?;
        }

        // MVMODE is a single bit for B pictures.
        self.hdr.mv_mode = Some(if self.r.read_bit()? {
            MvMode::OneMv
        } else {
            MvMode::OneMvHalfPelBilinear
        });

        self.parse_bitplane(BitplaneKind::DirectMb)?;
        self.parse_bitplane(BitplaneKind::SkipMb)?;

        // MVTAB and CBPTAB.
        self.r.skip_bits(2 + 2)?;

        self.parse_vop_dquant()?;
        self.parse_transform_type()?;
        self.hdr.transacfrm = self.read_transacfrm()?;
        self.hdr.transdctab = self.r.read_bit()?;

        Ok(())
    }

    fn parse_interlaced_p_layer(&mut self) -> ParseResult<()> {
        let structure = self.pic.structure;

        if structure.is_field() {
            self.hdr.num_ref = self.r.read_bit()?;
            if !self.hdr.num_ref {
                self.hdr.ref_field = self.r.read_bit()?;
            }
        }

        if self.seq.extended_mv {
            self.hdr.mv_range = self.read_ladder()?;
        }

        if self.seq.extended_dmv {
            self.hdr.dmv_range = self.read_ladder()?;
        }

        if structure.is_field() {
            self.parse_interlaced_mv_mode(true)?;
        } else {
            // 4MVSWITCH.
            self.hdr.mv_mode = Some(if self.r.read_bit()? {
                MvMode::MixedMv
            } else {
                MvMode::OneMv
            });

            self.hdr.intensity_compensation = self.r.read_bit()?;
            if self.hdr.intensity_compensation {
                self.r.skip_bits(LUMSCALE_LUMSHIFT_BITS)?;
            }

            self.parse_bitplane(BitplaneKind::SkipMb)?;
        }

        let interlaced_frame = structure == PictureStructure::InterlacedFrame;
        // MBMODETAB, MVTAB, CBPTAB, 2MVBPTAB and 4MVBPTAB.
        let mut skip = if interlaced_frame { 2 } else { 3 };
        skip += if self.hdr.num_ref { 3 } else { 2 };
        skip += 3;
        if interlaced_frame {
            skip += 2;
        }
        if self.hdr.mv_mode == Some(MvMode::MixedMv) {
            skip += 2;
        }
        self.r.skip_bits(skip)?;

        self.parse_vop_dquant()?;
        self.parse_transform_type()?;
        self.hdr.transacfrm = self.read_transacfrm()?;
        self.hdr.transdctab = self.r.read_bit()?;

        Ok(())
    }

    fn parse_interlaced_b_layer(&mut self) -> ParseResult<()> {
        let structure = self.pic.structure;
        let interlaced_frame = structure == PictureStructure::InterlacedFrame;

        if interlaced_frame {
            self.hdr.b_picture_fraction = Some(vlc::B_FRACTION.decode(self.r)?);
        }

        if self.seq.extended_mv {
            self.hdr.mv_range = self.read_ladder()?;
        }

        if self.seq.extended_dmv {
            self.hdr.dmv_range = self.read_ladder()?;
        }

        if structure.is_field() {
            self.parse_interlaced_mv_mode(false)?;
        } else {
            self.hdr.intensity_compensation = self.r.read_bit()?;
            if self.hdr.intensity_compensation {
                debug!("INTCOMP set in an interlaced B frame");
            }
            self.hdr.mv_mode = Some(MvMode::OneMv);

            self.parse_bitplane(BitplaneKind::DirectMb)?;
            self.parse_bitplane(BitplaneKind::SkipMb)?;
        }

        if structure.is_field() {
            self.parse_bitplane(BitplaneKind::ForwardMb)?;
        }

        // MBMODETAB, MVTAB, CBPTAB, 2MVBPTAB and 4MVBPTAB.
        let mut skip = if interlaced_frame { 2 } else { 3 };
        skip += if structure.is_field() { 3 } else { 2 };
        skip += 3;
        if interlaced_frame {
            skip += 2;
        }
        if self.hdr.mv_mode == Some(MvMode::MixedMv) || interlaced_frame {
            skip += 2;
        }
        self.r.skip_bits(skip)?;

        self.parse_vop_dquant()?;
        self.parse_transform_type()?;
        self.hdr.transacfrm = self.read_transacfrm()?;
        self.hdr.transdctab = self.r.read_bit()?;

        Ok(())
    }

    fn parse_progressive_mv_mode(&mut self) -> ParseResult<()> {
        let table = self.mv_mode_table();

        let mut mv_mode = table[self.read_mv_mode_index(4, false)?];
        if mv_mode == MvMode::IntensityCompensation {
            self.hdr.intensity_compensation = true;
            mv_mode = table[self.read_mv_mode_index(3, true)?];
            self.r.skip_bits(LUMSCALE_LUMSHIFT_BITS)?;
        }

        self.hdr.mv_mode = Some(mv_mode);
        Ok(())
    }

    fn parse_interlaced_mv_mode(&mut self, is_p: bool) -> ParseResult<()> {
        let table = self.mv_mode_table();

        let index = if is_p {
            self.read_mv_mode_index(4, false)?
        } else {
            self.read_mv_mode_index(3, true)?
        };

        let mut mv_mode = table[index];
        if mv_mode == MvMode::IntensityCompensation {
            self.hdr.intensity_compensation = true;
            mv_mode = table[self.read_mv_mode_index(3, true)?];

            // INTCOMPFIELD: 1 for both reference fields, 0x for only one.
            if self.r.read_bit()? {
                self.r.skip_bits(2 * LUMSCALE_LUMSHIFT_BITS)?;
            } else {
                self.r.skip_bits(1 + LUMSCALE_LUMSHIFT_BITS)?;
            }
        }

        self.hdr.mv_mode = Some(mv_mode);
        Ok(())
    }

    fn parse_vop_dquant(&mut self) -> ParseResult<()> {
        let dquant = self.seq.dquant;
        let dq = &mut self.hdr.vop_dquant;

        match dquant {
            1 | 3 => {
                dq.dquantfrm = self.r.read_bit()?;
                if dq.dquantfrm {
                    dq.dqprofile = self.r.read_bits(2)?;
                    match dq.dqprofile {
                        1 | 2 => dq.dqedge = self.r.read_bits(2)?,
                        3 => dq.dqbilevel = self.r.read_bit()?,
                        _ => (),
                    }
                }
            }
            2 => dq.dquantfrm = true,
            _ => (),
        }

        if dq.dquantfrm && (dquant == 2 || !(dq.dqprofile == 3 && !dq.dqbilevel)) {
            dq.pqdiff = self.r.read_bits(3)?;
            if dq.pqdiff == 7 {
                dq.abspq = self.r.read_bits(5)?;
            }
        }

        Ok(())
    }

    fn parse_transform_type(&mut self) -> ParseResult<()> {
        if self.seq.variable_sized_transform {
            self.hdr.ttmbf = self.r.read_bit()?;
            if self.hdr.ttmbf {
                self.hdr.ttfrm = self.r.read_bits(2)?;
            }
        }

        Ok(())
    }

    /// TRANSACFRM and TRANSACFRM2 are coded as 0, 10 or 11.
    fn read_transacfrm(&mut self) -> ParseResult<u8> {
        if !self.r.read_bit()? {
            Ok(0)
        } else {
            Ok(1 + u8::from(self.r.read_bit()?))
        }
    }
}

/// Parses an Advanced profile picture header. `r` must be positioned right
/// after the frame, field or slice header preceding it.
pub fn parse_advanced_picture_header(
    r: &mut BitReader,
    seq: &SequenceFields,
    pic: &PictureParameters,
) -> ParseResult<PictureHeader> {
    let start = r.position();
    let mut parser = HeaderParser::new(r, seq, pic)?;
    parser.parse_advanced()?;
    Ok(parser.finish(start))
}

/// Parses a Simple or Main profile picture header, up to BFRACTION.
pub fn parse_simple_main_picture_header(
    r: &mut BitReader,
    seq: &SequenceFields,
    pic: &PictureParameters,
) -> ParseResult<PictureHeader> {
    let start = r.position();
    let mut parser = HeaderParser::new(r, seq, pic)?;
    parser.parse_simple_main()?;
    Ok(parser.finish(start))
}

/// Values that hosts do not reliably provide and that were recovered from
/// the bitstream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveredFields {
    pub b_picture_fraction: Option<u8>,
    pub reference_distance: Option<u8>,
}

/// Parses VC-1 picture headers. Keeps the reference distance of the first
/// field of a frame so it can be applied to the second one.
#[derive(Debug, Default)]
pub struct Parser {
    reference_distance: u8,
}

impl Parser {
    /// Parses the picture header of `data`, which holds a whole frame or
    /// field. Advanced profile data starts with its start code.
    pub fn parse_picture_header(
        &mut self,
        data: &[u8],
        seq: &SequenceFields,
        pic: &PictureParameters,
    ) -> ParseResult<PictureHeader> {
        if seq.is_advanced() {
            if data.len() < START_CODE_LEN || data[..3] != START_CODE_PREFIX {
                return Err(ParseError::MissingStartCode);
            }

            let mut r = BitReader::new(&data[START_CODE_LEN..], true);
            parse_advanced_picture_header(&mut r, seq, pic)
        } else {
            let mut r = BitReader::new(data, false);
            parse_simple_main_picture_header(&mut r, seq, pic)
        }
    }

    /// Whether the picture header has to be parsed to recover the
    /// B fraction or the reference distance.
    pub fn needs_picture_header(seq: &SequenceFields, pic: &PictureParameters) -> bool {
        Self::needs_reference_distance(seq, pic) || (pic.is_b() && pic.is_first_field)
    }

    fn needs_reference_distance(seq: &SequenceFields, pic: &PictureParameters) -> bool {
        seq.is_advanced()
            && pic.structure.is_field()
            && (pic.is_i() || pic.is_p())
            && seq.reference_distance_flag
    }

    /// Recovers the B fraction and reference distance of the current
    /// picture. The second field of a frame reuses the reference distance
    /// found in the first one.
    pub fn recover_fields(
        &mut self,
        data: &[u8],
        seq: &SequenceFields,
        pic: &PictureParameters,
    ) -> ParseResult<RecoveredFields> {
        let mut fields = RecoveredFields::default();

        if Self::needs_reference_distance(seq, pic) {
            if pic.is_first_field {
                let hdr = self.parse_picture_header(data, seq, pic)?;
                self.reference_distance = hdr.reference_distance.unwrap_or(0);
            } else {
                debug!(
                    "Reusing reference distance {} for the second field",
                    self.reference_distance
                );
            }
            fields.reference_distance = Some(self.reference_distance);
        }

        if pic.is_b() && pic.is_first_field {
            let hdr = self.parse_picture_header(data, seq, pic)?;
            fields.b_picture_fraction = hdr.b_picture_fraction;
        }

        Ok(fields)
    }
}
