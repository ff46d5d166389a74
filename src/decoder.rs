// Copyright 2023 the bivcodec developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Decoding side: fold received records into a tree and render it.

use crate::bsp::ImageBsp;
use crate::frame::Frame;
use crate::matrix::ImageMatrix;
use crate::{ColorSpace, Result};

/// Mirror of [Encoder](crate::Encoder): accumulates records into a
/// partition tree and renders it at any output width.
///
/// Records may be applied straight from wire bytes; a malformed buffer is
/// reported without touching the tree. After a truncated stream, call
/// [Decoder::repair] before rendering so placeholder nodes are resolved.
pub struct Decoder {
    bsp: ImageBsp,
}

impl Decoder {
    /// Create a decoder with an empty tree.
    pub fn new(color_mode: ColorSpace) -> Self {
        Self {
            bsp: ImageBsp::new(color_mode),
        }
    }

    /// Apply one already-parsed record.
    pub fn apply_record(&mut self, frame: &Frame) {
        self.bsp.apply_frame(frame);
    }

    /// Parse one record from `data` and apply it.
    pub fn apply_bytes(&mut self, data: &[u8]) -> Result<()> {
        let frame = Frame::deserialize(data)?;
        self.bsp.apply_frame(&frame);
        Ok(())
    }

    /// Apply a record sequence, left to right.
    pub fn apply_chain(&mut self, frames: &[Frame]) {
        self.bsp.apply_frame_chain(frames);
    }

    /// Reconcile the tree after a partial stream; see [ImageBsp::repair].
    pub fn repair(&mut self) {
        self.bsp.repair();
    }

    /// Render the current tree at the given output width.
    pub fn render(&self, out_width: u32) -> ImageMatrix {
        self.bsp.as_image_matrix(out_width)
    }

    /// Number of image records applied so far.
    pub fn frames_applied(&self) -> u32 {
        self.bsp.frames_applied()
    }

    /// The accumulated tree.
    pub fn bsp(&self) -> &ImageBsp {
        &self.bsp
    }
}
