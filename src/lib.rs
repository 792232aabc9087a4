// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Parsing of VC-1 elementary streams for hardware-accelerated decoders.
//!
//! The crate extracts what a decoder front-end needs to program the hardware
//! but that the host API does not provide: picture header fields, slice
//! layout and macroblock data offsets, and the packed form of macroblock
//! motion vectors.

pub mod bitstream_utils;
pub mod codec;
