// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

pub mod bdu;
pub mod bitplane;
pub mod mv;
pub mod parser;
pub mod slice;
pub mod vlc;
