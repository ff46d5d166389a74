// Copyright 2023 the bivcodec developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Frame records and their 8 byte wire format.
//!
//! A record stream is a flat concatenation of 8 byte records with no framing
//! and no footer; readers dispatch on the leading type byte. Two kinds
//! exist: a *sync* record carrying canvas metadata and an *image* record
//! carrying the two child summary values of one tree node.

#[cfg(feature = "backtrace")]
use std::backtrace::Backtrace;

use bitvec::prelude::{BitVec, Lsb0};

use crate::{ColorSpace, Error, Result, MAX_LAYERS};

/// Serialized size of every record, in bytes.
pub const RECORD_SIZE: usize = 8;

const RECORD_TYPE_IMAGE: u8 = 0;
const RECORD_TYPE_SYNC: u8 = 1;

/// The left/right choices leading to a node; `false` descends left.
pub type NodePath = BitVec<u8, Lsb0>;

/// Position of a node within the partition tree.
///
/// The node's layer is the path length, so it is not stored separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLocation {
    pub path: NodePath,
}

impl FrameLocation {
    /// The location of the root node.
    pub fn root() -> Self {
        Self {
            path: NodePath::new(),
        }
    }

    /// Depth of the node below the root.
    pub fn layer(&self) -> u8 {
        self.path.len() as u8
    }

    /// The location one layer down, descending right iff `right`.
    pub fn child(&self, right: bool) -> Self {
        let mut path = self.path.clone();
        path.push(right);
        Self { path }
    }

    /// Pack the path into its 24 bit wire form, bit `i` = `path[i]`.
    pub fn fuse(&self) -> u32 {
        let mut fusion = 0u32;
        for (i, bit) in self.path.iter().by_vals().enumerate() {
            if bit {
                fusion |= 1u32 << i;
            }
        }
        fusion
    }

    /// Unpack a 24 bit wire path of the given layer.
    pub fn defuse(fusion: u32, layer: u8) -> Self {
        let mut path = NodePath::with_capacity(layer as usize);
        for i in 0..layer {
            path.push(fusion & (1u32 << i) != 0);
        }
        Self { path }
    }
}

/// Payload of an image record: the summary values of the two children of
/// the node at `location`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameImageData {
    pub location: FrameLocation,
    /// Pass-through channel index; always 0 in the grayscale core.
    pub channel: u8,
    pub value_l: f32,
    pub value_r: f32,
}

/// Payload of a sync record: canvas metadata of the stream that follows.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSyncData {
    pub width: u16,
    /// Canvas aspect ratio, height over width.
    pub ratio: f32,
    pub color_format: ColorSpace,
    pub id: i8,
    /// Host clock seconds; truncated to 16 bits on the wire.
    pub timestamp: u32,
}

/// One record of a frame chain.
///
/// The wire type byte is the discriminant of this enum.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Image(FrameImageData),
    Sync(FrameSyncData),
}

/// Clamp a floating summary value into its unsigned byte wire form.
#[inline]
fn quantize(value: f32) -> u8 {
    value.clamp(0.0, 255.0) as u8
}

impl Frame {
    /// Whether this is a sync record.
    pub fn is_sync(&self) -> bool {
        matches!(self, Frame::Sync(_))
    }

    /// Whether this is an image record.
    pub fn is_image(&self) -> bool {
        matches!(self, Frame::Image(_))
    }

    /// The image payload, if this is an image record.
    pub fn image_data(&self) -> Option<&FrameImageData> {
        match self {
            Frame::Image(data) => Some(data),
            Frame::Sync(_) => None,
        }
    }

    /// The sync payload, if this is a sync record.
    pub fn sync_data(&self) -> Option<&FrameSyncData> {
        match self {
            Frame::Image(_) => None,
            Frame::Sync(data) => Some(data),
        }
    }

    /// Serialize to the fixed 8 byte wire form.
    pub fn serialize(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];

        match self {
            Frame::Image(img) => {
                let path = img.location.fuse();

                buf[0] = RECORD_TYPE_IMAGE;
                buf[1] = img.location.layer();
                buf[2] = path as u8;
                buf[3] = (path >> 8) as u8;
                buf[4] = (path >> 16) as u8;
                buf[5] = img.channel;
                buf[6] = quantize(img.value_l);
                buf[7] = quantize(img.value_r);
            }
            Frame::Sync(sync) => {
                buf[0] = RECORD_TYPE_SYNC;
                buf[1..3].copy_from_slice(&sync.width.to_le_bytes());
                buf[3] = quantize(sync.ratio * 128.0);
                buf[4] = sync.color_format.color_format_byte();
                buf[5] = sync.id as u8;
                // Wire keeps only the low 16 timestamp bits.
                buf[6..8].copy_from_slice(&(sync.timestamp as u16).to_le_bytes());
            }
        }

        buf
    }

    /// Deserialize one record from the head of `data`.
    ///
    /// Fails without side effects on a short buffer, an unknown type byte,
    /// an unknown color format byte or a layer beyond [MAX_LAYERS].
    pub fn deserialize(data: &[u8]) -> Result<Frame> {
        if data.len() < RECORD_SIZE {
            return Err(Error::TruncatedRecord {
                #[cfg(feature = "backtrace")]
                backtrace: Backtrace::capture(),
            });
        }

        match data[0] {
            RECORD_TYPE_IMAGE => {
                let layer = data[1];
                if layer > MAX_LAYERS {
                    return Err(Error::DataShapeProblem {
                        msg: "record layer exceeds the 24 bit path depth",
                        #[cfg(feature = "backtrace")]
                        backtrace: Backtrace::capture(),
                    });
                }

                let path = u32::from(data[2]) | u32::from(data[3]) << 8 | u32::from(data[4]) << 16;

                Ok(Frame::Image(FrameImageData {
                    location: FrameLocation::defuse(path, layer),
                    channel: data[5],
                    value_l: f32::from(data[6]),
                    value_r: f32::from(data[7]),
                }))
            }
            RECORD_TYPE_SYNC => {
                let color_format = ColorSpace::from_color_format_byte(data[4]).ok_or_else(|| {
                    Error::UnsupportedFormat {
                        found: data[4],
                        #[cfg(feature = "backtrace")]
                        backtrace: Backtrace::capture(),
                    }
                })?;

                Ok(Frame::Sync(FrameSyncData {
                    width: u16::from_le_bytes([data[1], data[2]]),
                    ratio: f32::from(data[3]) / 128.0,
                    color_format,
                    id: data[5] as i8,
                    timestamp: u32::from(u16::from_le_bytes([data[6], data[7]])),
                }))
            }
            found => Err(Error::UnknownRecordType {
                found,
                #[cfg(feature = "backtrace")]
                backtrace: Backtrace::capture(),
            }),
        }
    }

    /// Record equality up to the byte quantization of the wire format.
    ///
    /// Image records compare location and channel exactly and the summary
    /// values within one quantization step; sync records compare by width.
    pub fn quantized_eq(&self, other: &Frame) -> bool {
        match (self, other) {
            (Frame::Image(a), Frame::Image(b)) => {
                a.location == b.location
                    && a.channel == b.channel
                    && (a.value_l - b.value_l).abs() < 1.01
                    && (a.value_r - b.value_r).abs() < 1.01
            }
            (Frame::Sync(a), Frame::Sync(b)) => a.width == b.width,
            _ => false,
        }
    }
}
