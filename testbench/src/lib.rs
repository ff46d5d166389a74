use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use bivcodec::{ColorSpace, ImageMatrix};

/// Test image content generators.
#[derive(Clone, Debug, PartialEq)]
pub enum TestPattern {
    /// Every sample zero.
    Zero,
    /// Every sample the given value.
    Uniform(f32),
    /// Samples ramp 0..=255 left to right.
    Gradient,
    /// 8x8 tiles alternating between 0 and 255.
    Checkerboard,
    /// Uniform noise in 0..=255 from the given seed.
    Noise(u64),
}

impl TestPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zero => "zero",
            Self::Uniform(_) => "uniform",
            Self::Gradient => "gradient",
            Self::Checkerboard => "checkerboard",
            Self::Noise(_) => "noise",
        }
    }
}

/// Generate a grayscale matrix filled with the given pattern.
pub fn generate_matrix(pattern: &TestPattern, width: u32, height: u32) -> Result<ImageMatrix> {
    if width < 2 {
        anyhow::bail!("canvas width must be at least 2");
    }

    let mut mat = ImageMatrix::new(width, height, ColorSpace::Grayscale);

    match pattern {
        TestPattern::Zero => {}
        TestPattern::Uniform(value) => {
            for id in 0..(width * height) as usize {
                mat.set_sample_at(id, *value);
            }
        }
        TestPattern::Gradient => {
            for y in 0..height {
                for x in 0..width {
                    mat.set_sample(x, y, 0, (x * 255 / (width - 1)) as f32);
                }
            }
        }
        TestPattern::Checkerboard => {
            for y in 0..height {
                for x in 0..width {
                    let value = if (x / 8 + y / 8) % 2 == 0 { 0.0 } else { 255.0 };
                    mat.set_sample(x, y, 0, value);
                }
            }
        }
        TestPattern::Noise(seed) => {
            let mut rng = StdRng::seed_from_u64(*seed);
            for id in 0..(width * height) as usize {
                mat.set_sample_at(id, rng.random_range(0.0..=255.0));
            }
        }
    }

    Ok(mat)
}

/// Largest per-sample absolute difference between two matrices.
pub fn max_abs_error(a: &ImageMatrix, b: &ImageMatrix) -> f32 {
    a.zip_map(b, |x, y| (x - y).abs())
        .data()
        .iter()
        .fold(0.0f32, |acc, err| acc.max(*err))
}

/// Mean squared per-sample difference between two matrices.
pub fn mean_squared_error(a: &ImageMatrix, b: &ImageMatrix) -> f32 {
    let diff = a.zip_map(b, |x, y| (x - y) * (x - y));
    diff.data().iter().sum::<f32>() / diff.data().len() as f32
}

#[test]
fn test_generate_matrix_shapes() {
    for pattern in [
        TestPattern::Zero,
        TestPattern::Uniform(128.0),
        TestPattern::Gradient,
        TestPattern::Checkerboard,
        TestPattern::Noise(42),
    ] {
        let mat = generate_matrix(&pattern, 32, 16).unwrap();
        assert_eq!(mat.width, 32);
        assert_eq!(mat.height, 16);
        assert!(
            mat.data().iter().all(|s| (0.0..=255.0).contains(s)),
            "{} out of range",
            pattern.as_str()
        );
    }

    assert!(generate_matrix(&TestPattern::Zero, 1, 4).is_err());
}

#[test]
fn test_noise_is_deterministic() {
    let a = generate_matrix(&TestPattern::Noise(7), 16, 16).unwrap();
    let b = generate_matrix(&TestPattern::Noise(7), 16, 16).unwrap();
    assert_eq!(a.data(), b.data());

    let c = generate_matrix(&TestPattern::Noise(8), 16, 16).unwrap();
    assert_ne!(a.data(), c.data());
}

#[test]
fn test_error_metrics() {
    let a = generate_matrix(&TestPattern::Uniform(10.0), 4, 4).unwrap();
    let b = generate_matrix(&TestPattern::Uniform(13.0), 4, 4).unwrap();

    assert_eq!(max_abs_error(&a, &b), 3.0);
    assert_eq!(mean_squared_error(&a, &b), 9.0);
}
