// Copyright 2023 the bivcodec developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Canvas rectangle geometry.
//!
//! [split_rect] is the single definition of how the canvas is partitioned.
//! Everything else in the crate (tree construction, rendering) calls it
//! rather than re-deriving child rectangles.

/// An axis-aligned integer rectangle on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Create a new [Rect].
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle is horizontal iff it is strictly wider than tall.
    pub const fn is_horizontal(&self) -> bool {
        self.width > self.height
    }

    /// Squares count as vertical so that ties split top/bottom.
    pub const fn is_vertical(&self) -> bool {
        !self.is_horizontal()
    }

    /// Length of the longer side.
    pub const fn longer_side(&self) -> u32 {
        if self.width > self.height {
            self.width
        } else {
            self.height
        }
    }

    /// Number of fragments covered.
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Bisect a rectangle along its longer side.
///
/// A horizontal rectangle splits into a left half of width `w / 2` and a
/// right half of width `w - w / 2`; a vertical one splits top/bottom
/// analogously. The two halves are disjoint and tile the input exactly.
pub const fn split_rect(rect: Rect) -> (Rect, Rect) {
    if rect.is_horizontal() {
        (
            Rect::new(rect.x, rect.y, rect.width / 2, rect.height),
            Rect::new(
                rect.x + rect.width / 2,
                rect.y,
                rect.width - rect.width / 2,
                rect.height,
            ),
        )
    } else {
        (
            Rect::new(rect.x, rect.y, rect.width, rect.height / 2),
            Rect::new(
                rect.x,
                rect.y + rect.height / 2,
                rect.width,
                rect.height - rect.height / 2,
            ),
        )
    }
}

#[test]
fn test_split_tiles_exactly() {
    for width in 1..=48u32 {
        for height in 1..=48u32 {
            let rect = Rect::new(3, 5, width, height);
            let (left, right) = split_rect(rect);

            assert_eq!(left.area() + right.area(), rect.area());

            if rect.is_horizontal() {
                assert_eq!(left.height, rect.height);
                assert_eq!(right.height, rect.height);
                assert_eq!(left.x + left.width, right.x);
                assert_eq!(left.width + right.width, rect.width);
            } else {
                assert_eq!(left.width, rect.width);
                assert_eq!(right.width, rect.width);
                assert_eq!(left.y + left.height, right.y);
                assert_eq!(left.height + right.height, rect.height);
            }
        }
    }
}

#[test]
fn test_square_splits_vertically() {
    let rect = Rect::new(0, 0, 4, 4);
    assert!(rect.is_vertical());

    let (top, bottom) = split_rect(rect);
    assert_eq!(top, Rect::new(0, 0, 4, 2));
    assert_eq!(bottom, Rect::new(0, 2, 4, 2));
}

#[test]
fn test_odd_split_sizes() {
    let (left, right) = split_rect(Rect::new(0, 0, 5, 1));
    assert_eq!(left.width, 2);
    assert_eq!(right.width, 3);

    let (top, bottom) = split_rect(Rect::new(0, 0, 1, 5));
    assert_eq!(top.height, 2);
    assert_eq!(bottom.height, 3);
}
