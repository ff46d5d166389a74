// Copyright 2023 the bivcodec developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io::{Seek, SeekFrom, Write};

use testbench::*;

use bivcodec::{
    BfpsReader, BfpsWriter, ColorSpace, Decoder, Encoder, Frame, ImageBsp, TruncationPolicy,
    RECORD_SIZE,
};

const fn test_clock() -> u32 {
    1000
}

#[test]
fn test_render_roundtrip_at_many_widths() -> anyhow::Result<()> {
    for pattern in [
        TestPattern::Gradient,
        TestPattern::Checkerboard,
        TestPattern::Noise(11),
    ] {
        let mat = generate_matrix(&pattern, 64, 64)?;
        let bsp = ImageBsp::from_matrix(&mat);

        // Ship the whole chain through the wire format into a fresh tree.
        let mut decoder = Decoder::new(ColorSpace::Grayscale);
        for frame in &bsp.as_frame_chain(test_clock()) {
            decoder.apply_bytes(&frame.serialize())?;
        }

        // Both trees must render alike at any output width, the received
        // one being off by at most the byte quantization of the wire.
        for out_width in [16u32, 64, 100, 512] {
            let original = bsp.as_image_matrix(out_width);
            let decoded = decoder.render(out_width);

            assert_eq!(original.width, decoded.width);
            assert_eq!(original.height, decoded.height);
            assert!(
                max_abs_error(&original, &decoded) < 1.01,
                "{} at width {}",
                pattern.as_str(),
                out_width
            );
        }
    }
    Ok(())
}

#[test]
fn test_truncated_chain_gives_coarse_approximation() -> anyhow::Result<()> {
    let mat = generate_matrix(&TestPattern::Noise(5), 64, 64)?;
    let chain = ImageBsp::from_matrix(&mat).as_frame_chain(test_clock());

    // Keep five percent of the image records.
    let keep = 1 + (chain.len() - 1).div_ceil(20);
    let mut decoder = Decoder::new(ColorSpace::Grayscale);
    decoder.apply_chain(&chain[..keep]);
    decoder.repair();

    let rendered = decoder.render(64);
    assert_eq!(rendered.height, 64);

    // Defined everywhere and bounded by the input's dynamic range.
    assert!(max_abs_error(&mat, &rendered) <= 255.0);
    assert!(rendered
        .data()
        .iter()
        .all(|sample| (0.0..=255.0).contains(sample)));

    // More records must not give a worse picture.
    let mut fuller = Decoder::new(ColorSpace::Grayscale);
    fuller.apply_chain(&chain[..chain.len() / 2]);
    fuller.repair();
    let better = fuller.render(64);
    assert!(mean_squared_error(&mat, &better) <= mean_squared_error(&mat, &rendered));

    Ok(())
}

#[test]
fn test_wire_roundtrip_of_long_chain() -> anyhow::Result<()> {
    let mat = generate_matrix(&TestPattern::Noise(23), 64, 64)?;
    let chain = ImageBsp::from_matrix(&mat).as_frame_chain(test_clock());
    assert!(chain.len() > 1000);

    for frame in chain.iter().take(1000) {
        let wire = frame.serialize();
        assert_eq!(wire.len(), RECORD_SIZE);

        let back = Frame::deserialize(&wire)?;
        assert!(back.quantized_eq(frame));
    }
    Ok(())
}

#[test]
fn test_bfps_file_roundtrip() -> anyhow::Result<()> {
    let images = [
        generate_matrix(&TestPattern::Uniform(40.0), 32, 32)?,
        generate_matrix(&TestPattern::Gradient, 32, 32)?,
        generate_matrix(&TestPattern::Checkerboard, 32, 32)?,
    ];

    let mut fd = tempfile::tempfile()?;
    {
        let mut writer = BfpsWriter::new(&mut fd)?;
        for image in &images {
            writer.write(image)?;
        }
    }
    fd.flush()?;
    fd.seek(SeekFrom::Start(0))?;

    // Play the stream back one record at a time.
    let mut reader = BfpsReader::new(fd);
    let mut decoder = Decoder::new(ColorSpace::Grayscale);
    let mut syncs = 0;
    while let Some(frame) = reader.next_record()? {
        if frame.is_sync() {
            syncs += 1;
        }
        decoder.apply_record(&frame);
    }
    assert_eq!(syncs, images.len());

    decoder.repair();
    let rendered = decoder.render(32);
    assert!(max_abs_error(&images[2], &rendered) < 1.01);

    Ok(())
}

#[test]
fn test_truncated_video_update_tracks_local_change() -> anyhow::Result<()> {
    let mut encoder = Encoder::with_clock(32, 32, test_clock)?;
    encoder.set_policy(TruncationPolicy::Length(200));

    let before = generate_matrix(&TestPattern::Noise(9), 32, 32)?;
    let mut after = before.clone();
    for y in 0..8 {
        for x in 0..8 {
            after.set_sample(x, y, 0, 255.0);
        }
    }

    let mut decoder = Decoder::new(ColorSpace::Grayscale);
    for image in [&before, &after] {
        encoder.push(image)?;
        while let Some(frame) = encoder.pop() {
            decoder.apply_bytes(&frame.serialize())?;
        }
    }
    decoder.repair();

    // Only the changed block and its ancestors carry nonzero cost, well
    // under the 200-record budget, so every dropped record was one the
    // receiver already held and the picture tracks the change exactly.
    let rendered = decoder.render(32);
    assert!(max_abs_error(&after, &rendered) < 1.01);

    Ok(())
}

#[test]
fn test_encoder_state_tracks_receiver() -> anyhow::Result<()> {
    // What the encoder believes the receiver holds must match what a
    // receiver actually decodes, including under truncation.
    let mut encoder = Encoder::with_clock(16, 16, test_clock)?;
    encoder.set_max_chain_length(10);

    let mut decoder = Decoder::new(ColorSpace::Grayscale);
    for seed in 0..4 {
        encoder.push(&generate_matrix(&TestPattern::Noise(seed), 16, 16)?)?;
        while let Some(frame) = encoder.pop() {
            decoder.apply_record(&frame);
        }
    }

    // The encoder's next full-length emission encodes exactly the delta to
    // its previous tree; an identical push must therefore cost nothing and
    // reproduce the receiver state.
    encoder.set_policy(TruncationPolicy::None);
    encoder.push(&generate_matrix(&TestPattern::Noise(3), 16, 16)?)?;
    while let Some(frame) = encoder.pop() {
        decoder.apply_record(&frame);
    }
    decoder.repair();

    let target = generate_matrix(&TestPattern::Noise(3), 16, 16)?;
    assert!(max_abs_error(&target, &decoder.render(16)) < 1.01);
    Ok(())
}
