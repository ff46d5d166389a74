//! Decode progressively longer prefixes of one image's record stream and
//! report how the picture sharpens as records arrive.

use testbench::*;

use bivcodec::{ColorSpace, Decoder, ImageBsp};

fn main() -> anyhow::Result<()> {
    let mat = generate_matrix(&TestPattern::Checkerboard, 64, 64)?;
    let chain = ImageBsp::from_matrix(&mat).as_frame_chain(0);

    println!("chain of {} records ({} bytes)", chain.len(), chain.len() * 8);

    for percent in [1usize, 5, 10, 25, 50, 100] {
        let keep = 1 + (chain.len() - 1) * percent / 100;

        let mut decoder = Decoder::new(ColorSpace::Grayscale);
        for frame in &chain[..keep] {
            decoder.apply_bytes(&frame.serialize())?;
        }
        decoder.repair();

        let rendered = decoder.render(64);
        println!(
            "{percent:>3}% ({keep:>5} records): max error {:>5.1}, mse {:>8.1}",
            max_abs_error(&mat, &rendered),
            mean_squared_error(&mat, &rendered),
        );
    }

    Ok(())
}
