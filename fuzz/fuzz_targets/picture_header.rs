#![no_main]

use cros_vc1::codec::vc1::parser::Parser;
use cros_vc1::codec::vc1::parser::PictureParameters;
use cros_vc1::codec::vc1::parser::PictureStructure;
use cros_vc1::codec::vc1::parser::Profile;
use cros_vc1::codec::vc1::parser::SequenceFields;
use cros_vc1::codec::vc1::slice::SliceParameters;
use cros_vc1::codec::vc1::slice::SliceResolver;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The first bytes select the sequence and picture settings.
    let [flags, picture_type, structure, size, stream @ ..] = data else {
        return;
    };

    let seq = SequenceFields {
        profile: if flags & 0x1 != 0 { Profile::Advanced } else { Profile::Main },
        interlace: flags & 0x2 != 0,
        pulldown: flags & 0x4 != 0,
        tfcntrflag: flags & 0x8 != 0,
        finterpflag: flags & 0x10 != 0,
        panscan_flag: flags & 0x20 != 0,
        reference_distance_flag: flags & 0x40 != 0,
        variable_sized_transform: flags & 0x80 != 0,
        overlap: true,
        extended_mv: true,
        extended_dmv: true,
        dquant: 1,
        quantizer: 1,
        max_b_frames: 7,
        coded_width: u32::from(size & 0xf) * 16 + 16,
        coded_height: u32::from(size >> 4) * 16 + 16,
        ..Default::default()
    };

    let pic = PictureParameters {
        structure: PictureStructure::n(1u8 << (structure & 0x3)).unwrap_or_default(),
        is_first_field: structure & 0x4 != 0,
        picture_type: *picture_type & 0x7,
        pic_quantizer_scale: 8,
        ..Default::default()
    };

    let mut parser = Parser::default();
    let _ = parser.parse_picture_header(stream, &seq, &pic);
    let _ = parser.recover_fields(stream, &seq, &pic);

    let mut slices = [
        SliceParameters {
            slice_data_size: (stream.len() * 8) as u32,
            ..Default::default()
        },
        SliceParameters {
            slice_data_offset: (stream.len() / 2) as u32,
            slice_data_size: (stream.len() * 4) as u32,
            slice_vertical_position: u32::from(size & 0x7),
            ..Default::default()
        },
    ];
    let _ = SliceResolver::new(stream, &seq, &pic, structure & 0x8 != 0).resolve(&mut slices);
});
