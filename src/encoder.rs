// Copyright 2023 the bivcodec developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! High-level video encoder emitting prioritized record streams.
//!
//! Successive images share one partition shape, so each candidate record
//! can be scored against the record the receiver already holds for the same
//! node. Records are emitted largest change first, which lets a host drop
//! the tail of each image's stream with the least visible damage.

#[cfg(feature = "backtrace")]
use std::backtrace::Backtrace;

use std::collections::VecDeque;

use crate::bsp::ImageBsp;
use crate::frame::Frame;
use crate::matrix::ImageMatrix;
use crate::{ColorSpace, Error, Result};

/// How much of each image's record stream is kept.
///
/// The first image is always emitted whole, whatever the policy, so the
/// receiver starts from a complete picture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TruncationPolicy {
    /// Keep every record.
    None,
    /// Keep the first `K` image records after the sync record.
    Length(usize),
    /// Keep records until the expected decode error falls below a
    /// mean-squared-error target. Declared for wire/API stability;
    /// currently keeps every record.
    // TODO: accumulate per-record squared error against the previous tree
    // and stop once the remainder is below the target.
    Mse(f32),
}

enum EncoderPhase {
    Uninitialized,
    Steady,
}

fn system_time_secs() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};

    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as u32,
        Err(_) => 0,
    }
}

/// Convert a sequence of input images into a prioritized record stream.
///
/// The encoder owns the previously transmitted tree, initially all zero,
/// and mirrors every kept record into it so its state is exactly what the
/// receiver has decoded. Records leave [Encoder::pop] in emission order;
/// records of one image are contiguous and images never interleave.
pub struct Encoder {
    width: u32,
    height: u32,
    policy: TruncationPolicy,
    phase: EncoderPhase,
    previous_bsp: ImageBsp,
    previous_chain: Vec<Frame>,
    frame_stream: VecDeque<Frame>,
    clock: fn() -> u32,
}

impl Encoder {
    /// Initialize an encoder for a fixed canvas size, stamping sync records
    /// from the host clock.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::with_clock(width, height, system_time_secs)
    }

    /// Initialize an encoder with an injected clock, for deterministic
    /// record streams in tests.
    pub fn with_clock(width: u32, height: u32, clock: fn() -> u32) -> Result<Self> {
        if width < 2 || height < 1 {
            return Err(Error::DataShapeProblem {
                msg: "encoder canvas must be at least 2x1",
                #[cfg(feature = "backtrace")]
                backtrace: Backtrace::capture(),
            });
        }

        let black = ImageMatrix::new(width, height, ColorSpace::Grayscale);
        let previous_bsp = ImageBsp::from_matrix(&black);
        let previous_chain = previous_bsp.as_frame_chain(clock());

        Ok(Self {
            width,
            height,
            policy: TruncationPolicy::None,
            phase: EncoderPhase::Uninitialized,
            previous_bsp,
            previous_chain,
            frame_stream: VecDeque::new(),
            clock,
        })
    }

    /// Encode the next image of the video.
    ///
    /// Builds the image's tree, scores every record against the previously
    /// transmitted chain, enqueues sync plus the kept records largest
    /// change first, and folds the kept records back into the previous
    /// tree. Images of the wrong size are rejected; both chains must index
    /// the same partition shape for the record pairing to line up.
    pub fn push(&mut self, matrix: &ImageMatrix) -> Result<()> {
        if matrix.width != self.width || matrix.height != self.height {
            return Err(Error::DataShapeProblem {
                msg: "image dimensions differ from the encoder canvas",
                #[cfg(feature = "backtrace")]
                backtrace: Backtrace::capture(),
            });
        }

        let bsp = ImageBsp::from_matrix(matrix);
        let chain = bsp.as_frame_chain((self.clock)());
        debug_assert_eq!(chain.len(), self.previous_chain.len());

        let mut scored: Vec<(f32, &Frame)> = chain[1..]
            .iter()
            .zip(self.previous_chain[1..].iter())
            .map(|(candidate, previous)| (change_cost(candidate, previous), candidate))
            .collect();

        // Stable sort: equal-cost records keep their scattered layer order.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let keep = match (&self.phase, self.policy) {
            (EncoderPhase::Uninitialized, _) => scored.len(),
            (EncoderPhase::Steady, TruncationPolicy::None) => scored.len(),
            (EncoderPhase::Steady, TruncationPolicy::Length(max_records)) => {
                max_records.min(scored.len())
            }
            (EncoderPhase::Steady, TruncationPolicy::Mse(_)) => scored.len(),
        };

        let mut kept = Vec::with_capacity(keep + 1);
        kept.push(chain[0].clone());
        kept.extend(scored.drain(..keep).map(|(_, frame)| frame.clone()));

        self.frame_stream.extend(kept.iter().cloned());
        self.previous_bsp.apply_frame_chain(&kept);
        self.previous_chain = self.previous_bsp.as_frame_chain((self.clock)());
        self.phase = EncoderPhase::Steady;

        Ok(())
    }

    /// Dequeue the oldest pending record.
    pub fn pop(&mut self) -> Option<Frame> {
        self.frame_stream.pop_front()
    }

    /// The oldest pending record, left in the queue.
    pub fn peek(&self) -> Option<&Frame> {
        self.frame_stream.front()
    }

    /// Whether any records are pending.
    pub fn is_empty(&self) -> bool {
        self.frame_stream.is_empty()
    }

    /// Discard all pending records. The previously transmitted tree is not
    /// reverted.
    pub fn clear(&mut self) {
        self.frame_stream.clear();
    }

    /// Replace the truncation policy.
    pub fn set_policy(&mut self, policy: TruncationPolicy) {
        self.policy = policy;
    }

    /// Keep at most `max_records` image records per image after the sync
    /// record.
    pub fn set_max_chain_length(&mut self, max_records: usize) {
        self.policy = TruncationPolicy::Length(max_records);
    }

    /// Switch to the mean-squared-error bounded policy (see
    /// [TruncationPolicy::Mse]).
    pub fn set_max_mse(&mut self, max_mse: f32) {
        self.policy = TruncationPolicy::Mse(max_mse);
    }

    /// The active truncation policy.
    pub fn policy(&self) -> TruncationPolicy {
        self.policy
    }

    /// The mean-squared-error target, if that policy is active.
    pub fn max_mse(&self) -> Option<f32> {
        match self.policy {
            TruncationPolicy::Mse(max_mse) => Some(max_mse),
            _ => None,
        }
    }
}

/// Priority of retransmitting one record: the summary value change scaled
/// down by depth, so coarse structural changes trump fine detail.
fn change_cost(candidate: &Frame, previous: &Frame) -> f32 {
    let (Frame::Image(a), Frame::Image(b)) = (candidate, previous) else {
        debug_assert!(false, "sync record past the head of a chain");
        return 0.0;
    };

    ((a.value_l - b.value_l).abs() + (a.value_r - b.value_r).abs())
        / (f32::from(a.location.layer()) + 1.0)
}
