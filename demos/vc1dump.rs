// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! vc1dump, splits an Advanced profile VC-1 elementary stream into BDUs and
//! prints the picture headers found in it. Sequence level settings are not
//! parsed from the stream and must be given on the command line.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use argh::FromArgs;
use cros_vc1::bitstream_utils::BitReader;
use cros_vc1::codec::vc1::bdu::BduIterator;
use cros_vc1::codec::vc1::bdu::BduType;
use cros_vc1::codec::vc1::parser::FrameCodingMode;
use cros_vc1::codec::vc1::parser::Parser;
use cros_vc1::codec::vc1::parser::PictureParameters;
use cros_vc1::codec::vc1::parser::PictureStructure;
use cros_vc1::codec::vc1::parser::Profile;
use cros_vc1::codec::vc1::parser::SequenceFields;
use cros_vc1::codec::vc1::vlc;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
struct ProfileArg(Profile);

impl FromStr for ProfileArg {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(ProfileArg(Profile::Simple)),
            "main" => Ok(ProfileArg(Profile::Main)),
            "advanced" => Ok(ProfileArg(Profile::Advanced)),
            _ => Err("unrecognized profile. Valid values: simple, main, advanced"),
        }
    }
}

/// Dumps the picture headers of a VC-1 elementary stream
#[derive(Debug, FromArgs)]
struct Args {
    /// input file
    #[argh(positional)]
    input: PathBuf,

    /// stream profile. Only advanced streams can be split. Default: advanced
    #[argh(option, default = "ProfileArg(Profile::Advanced)")]
    profile: ProfileArg,

    /// coded width in pixels
    #[argh(option)]
    width: u32,

    /// coded height in pixels
    #[argh(option)]
    height: u32,

    /// INTERLACE is set
    #[argh(switch)]
    interlace: bool,

    /// PULLDOWN is set
    #[argh(switch)]
    pulldown: bool,

    /// TFCNTRFLAG is set
    #[argh(switch)]
    tfcntrflag: bool,

    /// FINTERPFLAG is set
    #[argh(switch)]
    finterpflag: bool,

    /// PANSCAN_FLAG is set
    #[argh(switch)]
    panscan: bool,

    /// REFDIST_FLAG is set
    #[argh(switch)]
    refdist_flag: bool,

    /// EXTENDED_MV is set
    #[argh(switch)]
    extended_mv: bool,

    /// EXTENDED_DMV is set
    #[argh(switch)]
    extended_dmv: bool,

    /// VSTRANSFORM is set
    #[argh(switch)]
    vstransform: bool,

    /// OVERLAP is set
    #[argh(switch)]
    overlap: bool,

    /// DQUANT value. Default: 0
    #[argh(option, default = "0")]
    dquant: u8,

    /// QUANTIZER value. Default: 0
    #[argh(option, default = "0")]
    quantizer: u8,

    /// PQUANT used to select the motion vector mode tables. Default: 8
    #[argh(option, default = "8")]
    pquant: u8,

    /// whether field pictures start with the top field. Default: true
    #[argh(option, default = "true")]
    top_field_first: bool,

    /// print every parsed header field
    #[argh(switch)]
    verbose: bool,
}

/// FCM and the coded picture type, read ahead of the full header parse.
fn peek_picture_type(
    payload: &[u8],
    seq: &SequenceFields,
) -> anyhow::Result<(FrameCodingMode, u8)> {
    let mut r = BitReader::new(payload, true);

    let fcm = if !seq.interlace || !r.read_bit()? {
        FrameCodingMode::Progressive
    } else if !r.read_bit()? {
        FrameCodingMode::InterlacedFrame
    } else {
        FrameCodingMode::InterlacedField
    };

    let picture_type = match fcm {
        FrameCodingMode::InterlacedField => r.read_bits::<u8>(3)?,
        _ => vlc::PICTURE_TYPE.decode(&mut r)? as u8,
    };

    Ok((fcm, picture_type))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Args = argh::from_env();

    if args.profile.0 != Profile::Advanced {
        anyhow::bail!("only advanced profile streams carry start codes");
    }

    let input = {
        let mut buf = Vec::new();
        File::open(&args.input)
            .with_context(|| format!("error opening {}", args.input.display()))?
            .read_to_end(&mut buf)
            .context("error reading input file")?;
        buf
    };

    let seq = SequenceFields {
        profile: args.profile.0,
        interlace: args.interlace,
        pulldown: args.pulldown,
        tfcntrflag: args.tfcntrflag,
        finterpflag: args.finterpflag,
        panscan_flag: args.panscan,
        reference_distance_flag: args.refdist_flag,
        extended_mv: args.extended_mv,
        extended_dmv: args.extended_dmv,
        variable_sized_transform: args.vstransform,
        overlap: args.overlap,
        dquant: args.dquant,
        quantizer: args.quantizer,
        max_b_frames: 7,
        coded_width: args.width,
        coded_height: args.height,
        ..Default::default()
    };

    let mut parser = Parser::default();
    // Frame coding mode and picture type of the last frame, used by its
    // second field.
    let mut last_frame = None;

    for (index, bdu) in BduIterator::new(&input[..]).enumerate() {
        let bdu = bdu.context("error splitting stream")?;
        println!(
            "BDU {}: {:?} at offset {:#x}, {} bytes",
            index,
            bdu.bdu_type(),
            bdu.sc_offset(),
            bdu.size()
        );

        let (fcm, picture_type, is_first_field) = match bdu.bdu_type() {
            BduType::Frame => {
                let (fcm, picture_type) = peek_picture_type(bdu.as_ref(), &seq)?;
                last_frame = Some((fcm, picture_type));
                (fcm, picture_type, true)
            }
            BduType::Field => match last_frame {
                Some((fcm, picture_type)) => (fcm, picture_type, false),
                None => {
                    log::warn!("Field BDU without a preceding frame, skipping");
                    continue;
                }
            },
            _ => continue,
        };

        let structure =
            PictureStructure::from_frame_coding_mode(fcm, is_first_field, args.top_field_first);
        let pic = PictureParameters {
            structure,
            is_first_field,
            picture_type,
            pic_quantizer_scale: args.pquant,
            reference_picture_flag: false,
        };
        let pic = PictureParameters {
            reference_picture_flag: pic.is_i() || pic.is_p(),
            ..pic
        };

        println!(
            "  {:?} {:?}, header needed: {}",
            structure,
            pic.frame_type()?,
            Parser::needs_picture_header(&seq, &pic)
        );

        let recovered = parser.recover_fields(bdu.with_start_code(), &seq, &pic)?;
        println!("  recovered: {:?}", recovered);

        if is_first_field {
            let hdr = parser.parse_picture_header(bdu.with_start_code(), &seq, &pic)?;
            println!(
                "  {} header bits, mv mode {:?}, {} bitplanes",
                hdr.header_bits,
                hdr.mv_mode,
                hdr.bitplanes.len()
            );
            if args.verbose {
                println!("{:#?}", hdr);
            }
        }
    }

    Ok(())
}
