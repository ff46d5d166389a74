// Copyright 2023 the bivcodec developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Associates an encoder with a writer to stream records to `.bfps` files.

use std::io::{Read, Write};

use super::{Encoder, Error, Frame, ImageMatrix, Result, TruncationPolicy, RECORD_SIZE};

/// An encoding session ready to start but which has not yet necessarily
/// encoded its first image.
///
/// This mainly exists to hold the writer but defer creating the encoder
/// until the first image reveals the canvas size (in the `Configured`
/// variant). After the first image is written, it will be in the
/// `Recording` variant. (The `MovedOut` variant should never be observed
/// and represents a temporary internal state.)
enum WriteState<W> {
    Configured(W),
    Recording(RecordingState<W>),
    MovedOut,
}

impl<W: Write> WriteState<W> {
    fn write_image(&mut self, image: &ImageMatrix, policy: TruncationPolicy) -> Result<()> {
        // Temporarily replace ourself with a dummy value.
        let orig_state = std::mem::replace(self, WriteState::MovedOut);
        let state = match orig_state {
            WriteState::Configured(fd) => {
                let mut encoder = Encoder::new(image.width, image.height)?;
                encoder.set_policy(policy);
                let mut state = RecordingState { wtr: fd, encoder };
                state.encode_and_flush(image)?;
                state
            }
            WriteState::Recording(mut state) => {
                state.encode_and_flush(image)?;
                state
            }
            WriteState::MovedOut => {
                return Err(Error::InconsistentState {
                    #[cfg(feature = "backtrace")]
                    backtrace: std::backtrace::Backtrace::capture(),
                })
            }
        };

        // Restore ourself to the correct state.
        *self = WriteState::Recording(state);

        Ok(())
    }
}

/// Small helper struct holding writer and encoder for an ongoing encoding
/// session.
struct RecordingState<W> {
    wtr: W,
    encoder: Encoder,
}

impl<W: Write> RecordingState<W> {
    fn encode_and_flush(&mut self, image: &ImageMatrix) -> Result<()> {
        self.encoder.push(image)?;
        while let Some(frame) = self.encoder.pop() {
            self.wtr.write_all(&frame.serialize())?;
        }
        Ok(())
    }
}

/// Write images to an [std::io::Write] implementation in `.bfps` format:
/// 8 byte records back to back, no framing and no footer.
pub struct BfpsWriter<W> {
    inner: WriteState<W>,
    policy: TruncationPolicy,
}

impl<W: Write> BfpsWriter<W> {
    /// Create a new [BfpsWriter] from an [std::io::Write] implementation.
    ///
    /// The canvas size is taken from the first image written.
    pub fn new(wtr: W) -> Result<Self> {
        Self::with_policy(wtr, TruncationPolicy::None)
    }

    /// Create a [BfpsWriter] truncating each image's stream per `policy`.
    pub fn with_policy(wtr: W, policy: TruncationPolicy) -> Result<Self> {
        Ok(Self {
            inner: WriteState::Configured(wtr),
            policy,
        })
    }

    /// Retrieve the underlying [std::io::Write] implementation.
    pub fn into_inner(self) -> W {
        match self.inner {
            WriteState::Configured(w) => w,
            WriteState::Recording(state) => state.wtr,
            WriteState::MovedOut => {
                unreachable!("inconsistent internal state");
            }
        }
    }

    /// Encode and write one image.
    pub fn write(&mut self, image: &ImageMatrix) -> Result<()> {
        self.inner.write_image(image, self.policy)
    }
}

/// Pull records out of an [std::io::Read] implementation 8 bytes at a
/// time.
pub struct BfpsReader<R> {
    rdr: R,
}

impl<R: Read> BfpsReader<R> {
    /// Create a new [BfpsReader] from an [std::io::Read] implementation.
    pub fn new(rdr: R) -> Self {
        Self { rdr }
    }

    /// Read the next record.
    ///
    /// Returns `Ok(None)` at a clean end of stream. A stream ending inside
    /// a record reports [Error::TruncatedRecord]. Short reads from the
    /// underlying reader are retried until a full record arrives.
    pub fn next_record(&mut self) -> Result<Option<Frame>> {
        let mut buf = [0u8; RECORD_SIZE];
        let mut filled = 0;

        while filled < buf.len() {
            let count = self.rdr.read(&mut buf[filled..])?;
            if count == 0 {
                break;
            }
            filled += count;
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled < buf.len() {
            return Err(Error::TruncatedRecord {
                #[cfg(feature = "backtrace")]
                backtrace: std::backtrace::Backtrace::capture(),
            });
        }

        Frame::deserialize(&buf).map(Some)
    }

    /// Retrieve the underlying [std::io::Read] implementation.
    pub fn into_inner(self) -> R {
        self.rdr
    }
}
