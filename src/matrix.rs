// Copyright 2023 the bivcodec developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Dense pixel matrices.

#[cfg(feature = "backtrace")]
use std::backtrace::Backtrace;

use crate::geometry::Rect;
use crate::{ColorSpace, Error, Result};

/// A dense row-major matrix of scalar samples.
///
/// Samples are finite reals; hosts commonly keep them in `0..=255` but the
/// codec imposes no clamp until values reach the wire. Out-of-range accesses
/// are caller bugs and abort, they are not recoverable errors.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMatrix {
    /// The width of the matrix, in fragments
    pub width: u32,
    /// The height of the matrix, in fragments
    pub height: u32,
    color_mode: ColorSpace,
    data: Vec<f32>,
}

impl ImageMatrix {
    /// Create a zero-filled matrix.
    pub fn new(width: u32, height: u32, color_mode: ColorSpace) -> Self {
        Self {
            width,
            height,
            color_mode,
            data: vec![0.0; width as usize * height as usize],
        }
    }

    /// Create a matrix from a byte source, one byte per sample.
    pub fn from_bytes(
        width: u32,
        height: u32,
        color_mode: ColorSpace,
        bytes: &[u8],
    ) -> Result<Self> {
        if bytes.len() != width as usize * height as usize {
            return Err(Error::DataShapeProblem {
                msg: "byte source length must equal width * height",
                #[cfg(feature = "backtrace")]
                backtrace: Backtrace::capture(),
            });
        }
        Ok(Self {
            width,
            height,
            color_mode,
            data: bytes.iter().map(|byte| f32::from(*byte)).collect(),
        })
    }

    /// The matrix color space.
    pub fn color_mode(&self) -> ColorSpace {
        self.color_mode
    }

    /// All samples in row-major order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Read the sample at `(x, y)`.
    ///
    /// The channel index is accepted for interface stability but ignored in
    /// the grayscale core.
    #[inline]
    pub fn sample(&self, x: u32, y: u32, _channel: u8) -> f32 {
        assert!(x < self.width);
        assert!(y < self.height);

        self.data[(y * self.width + x) as usize]
    }

    /// Read the sample at a row-major linear index.
    #[inline]
    pub fn sample_at(&self, id: usize) -> f32 {
        assert!(id < self.data.len());

        self.data[id]
    }

    /// Overwrite the sample at `(x, y)`.
    #[inline]
    pub fn set_sample(&mut self, x: u32, y: u32, _channel: u8, value: f32) {
        assert!(x < self.width);
        assert!(y < self.height);

        self.data[(y * self.width + x) as usize] = value;
    }

    /// Overwrite the sample at a row-major linear index.
    #[inline]
    pub fn set_sample_at(&mut self, id: usize, value: f32) {
        assert!(id < self.data.len());

        self.data[id] = value;
    }

    /// Arithmetic mean of all samples inside `roi`.
    pub fn average(&self, roi: &Rect) -> f32 {
        assert!(roi.area() > 0);
        assert!(roi.x + roi.width <= self.width);
        assert!(roi.y + roi.height <= self.height);

        let mut acc = 0.0;
        for j in 0..roi.height {
            for i in 0..roi.width {
                acc += self.sample(roi.x + i, roi.y + j, 0);
            }
        }

        acc / roi.area() as f32
    }

    /// Set every sample inside `roi` to `value`.
    pub fn fill(&mut self, roi: &Rect, value: f32) {
        assert!(roi.x + roi.width <= self.width);
        assert!(roi.y + roi.height <= self.height);

        for j in 0..roi.height {
            for i in 0..roi.width {
                self.set_sample(roi.x + i, roi.y + j, 0, value);
            }
        }
    }

    /// Apply `fun` to every sample, producing a new matrix.
    pub fn map(&self, fun: impl Fn(f32) -> f32) -> ImageMatrix {
        ImageMatrix {
            width: self.width,
            height: self.height,
            color_mode: self.color_mode,
            data: self.data.iter().map(|value| fun(*value)).collect(),
        }
    }

    /// Combine two equally-shaped matrices sample by sample.
    pub fn zip_map(&self, other: &ImageMatrix, fun: impl Fn(f32, f32) -> f32) -> ImageMatrix {
        assert_eq!(self.width, other.width);
        assert_eq!(self.height, other.height);

        ImageMatrix {
            width: self.width,
            height: self.height,
            color_mode: self.color_mode,
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| fun(*a, *b))
                .collect(),
        }
    }
}
