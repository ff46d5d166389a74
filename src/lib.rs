// Copyright 2023 the bivcodec developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! binary image/video codec (BIVCodec) library
//!
//! This module contains a pure Rust implementation of an experimental
//! progressive image and video codec. Instead of transmitting pixels it
//! transmits fixed-size *records*, each refining a recursive binary space
//! partition (BSP) of the image canvas. A receiver holding only a prefix of
//! the record stream can still render a meaningful approximation of the
//! image; every further record refines one rectangular region. Across a
//! video, records describing regions that changed little are given low
//! priority and may be dropped first, which gives natural rate control.
//!
//! Only the grayscale color space is implemented; the HSL and RGB tags and
//! the per-record channel byte are carried through unchanged for future
//! multi-channel use.
#![cfg_attr(feature = "backtrace", feature(error_generic_member_access))]
#![deny(unsafe_code)]

#[cfg(feature = "backtrace")]
use std::backtrace::Backtrace;

pub mod geometry;
pub use geometry::{split_rect, Rect};

pub mod matrix;
pub use matrix::ImageMatrix;

pub mod frame;
pub use frame::{Frame, FrameImageData, FrameLocation, FrameSyncData, RECORD_SIZE};

pub mod bsp;
pub use bsp::{ImageBsp, LayerOrdering, SeededShuffle};

mod encoder;
pub use encoder::{Encoder, TruncationPolicy};

mod decoder;
pub use decoder::Decoder;

mod writer;
pub use writer::{BfpsReader, BfpsWriter};

/// Maximum node depth of a partition tree.
///
/// A 24 bit path is enough to halve a 4K canvas down to single fragments.
pub const MAX_LAYERS: u8 = 24;

// Error type ----------------------

/// A BIVCodec encoding or decoding error.
#[derive(Debug)]
pub enum Error {
    DataShapeProblem {
        msg: &'static str,
        #[cfg(feature = "backtrace")]
        backtrace: Backtrace,
    },
    TruncatedRecord {
        #[cfg(feature = "backtrace")]
        backtrace: Backtrace,
    },
    UnknownRecordType {
        found: u8,
        #[cfg(feature = "backtrace")]
        backtrace: Backtrace,
    },
    UnsupportedFormat {
        found: u8,
        #[cfg(feature = "backtrace")]
        backtrace: Backtrace,
    },
    InconsistentState {
        #[cfg(feature = "backtrace")]
        backtrace: Backtrace,
    },
    IoError {
        source: std::io::Error,
        #[cfg(feature = "backtrace")]
        backtrace: Backtrace,
    },
}
type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::IoError {
            source,
            #[cfg(feature = "backtrace")]
            backtrace: Backtrace::capture(),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError {
                source,
                #[cfg(feature = "backtrace")]
                    backtrace: _,
            } => Some(source),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        match self {
            Error::DataShapeProblem {
                msg,
                #[cfg(feature = "backtrace")]
                    backtrace: _,
            } => {
                write!(f, "Image data shape is problematic: {msg}")
            }
            Error::TruncatedRecord {
                #[cfg(feature = "backtrace")]
                    backtrace: _,
            } => {
                write!(f, "truncated record: {RECORD_SIZE} bytes expected")
            }
            Error::UnknownRecordType {
                found,
                #[cfg(feature = "backtrace")]
                    backtrace: _,
            } => {
                write!(f, "unknown record type byte: {found:#04x}")
            }
            Error::UnsupportedFormat {
                found,
                #[cfg(feature = "backtrace")]
                    backtrace: _,
            } => {
                write!(f, "unsupported color format byte: {found:#04x}")
            }
            Error::InconsistentState {
                #[cfg(feature = "backtrace")]
                    backtrace: _,
            } => {
                write!(f, "internal error: inconsistent state")
            }
            Error::IoError {
                source,
                #[cfg(feature = "backtrace")]
                    backtrace: _,
            } => {
                write!(f, "IO error: {source}")
            }
        }
    }
}

// Color space ------------------

/// Color space of a pixel matrix or record stream.
///
/// Only [ColorSpace::Grayscale] has an encoder; the other tags exist so that
/// the wire format does not need to change for multi-channel extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum ColorSpace {
    Grayscale,
    HSL,
    RGB,
}

impl ColorSpace {
    pub(crate) fn color_format_byte(&self) -> u8 {
        match self {
            Self::Grayscale => 0,
            Self::HSL => 1,
            Self::RGB => 2,
        }
    }

    pub(crate) fn from_color_format_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Grayscale),
            1 => Some(Self::HSL),
            2 => Some(Self::RGB),
            _ => None,
        }
    }
}
