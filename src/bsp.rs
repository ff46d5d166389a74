// Copyright 2023 the bivcodec developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Recursive binary space partition of an image canvas.
//!
//! Every node summarizes one implicit rectangle with a single scalar. The
//! rectangle is never stored: it follows from the canvas and the left/right
//! path to the node, with [split_rect](crate::geometry::split_rect) as the
//! only authority on how rectangles divide. Internal nodes carry the mean
//! of their children's summaries, so any prefix of a record stream yields a
//! coarse but complete picture.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::frame::{Frame, FrameImageData, FrameLocation, FrameSyncData, NodePath};
use crate::geometry::{split_rect, Rect};
use crate::matrix::ImageMatrix;
use crate::{ColorSpace, MAX_LAYERS};

/// Summary value of placeholder nodes created while applying records whose
/// path crosses regions not yet received. [ImageBsp::repair] resolves them.
pub const EMPTY_COLOR: f32 = -1.0;

const SHUFFLE_SEED: u64 = 0;

/// Permutation applied to one layer's records before they join the chain.
pub trait LayerOrdering {
    fn permute(&self, layer: u8, records: &mut [Frame]);
}

/// The default ordering: a fixed-seed shuffle, one fresh generator per
/// layer, so a truncated chain prefix scatters across the canvas instead of
/// clustering in one corner. Deterministic across runs.
pub struct SeededShuffle;

impl LayerOrdering for SeededShuffle {
    fn permute(&self, _layer: u8, records: &mut [Frame]) {
        let mut rng = StdRng::seed_from_u64(SHUFFLE_SEED);
        records.shuffle(&mut rng);
    }
}

struct ImageNode {
    value: f32,
    layer: u8,
    left: Option<Box<ImageNode>>,
    right: Option<Box<ImageNode>>,
}

impl ImageNode {
    fn new(value: f32, layer: u8) -> Self {
        Self {
            value,
            layer,
            left: None,
            right: None,
        }
    }

    fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// A binary space partition of one image.
pub struct ImageBsp {
    width: u32,
    ratio: f32,
    color_mode: ColorSpace,
    root: ImageNode,
    frames: u32,
}

impl ImageBsp {
    /// Create an empty tree awaiting records.
    pub fn new(color_mode: ColorSpace) -> Self {
        Self {
            width: 1,
            ratio: 1.0,
            color_mode,
            root: ImageNode::new(EMPTY_COLOR, 0),
            frames: 0,
        }
    }

    /// Build a tree summarizing `src`.
    ///
    /// The canvas must be at least 2x1; a single fragment cannot be split.
    pub fn from_matrix(src: &ImageMatrix) -> Self {
        Self::from_matrix_parallel(src, 1)
    }

    /// Build a tree summarizing `src`, fanning the recursion out over up to
    /// `threads` worker threads. The budget halves at each level; all
    /// workers are joined before this returns.
    pub fn from_matrix_parallel(src: &ImageMatrix, threads: usize) -> Self {
        assert!(src.width >= 2);
        assert!(src.height >= 1);

        let canvas = Rect::new(0, 0, src.width, src.height);
        Self {
            width: src.width,
            ratio: src.height as f32 / src.width as f32,
            color_mode: src.color_mode(),
            root: Self::build_node(src, canvas, 0, threads.max(1)),
            frames: 0,
        }
    }

    /// Post-order construction: children are built first, and a node's value
    /// is the mean of its children's subtree averages. For an unbalanced
    /// split this differs from the plain rectangle average, and it is what
    /// makes bottom-up reconstruction by [ImageBsp::repair] exact.
    fn build_node(src: &ImageMatrix, roi: Rect, layer: u8, threads: usize) -> ImageNode {
        if roi.longer_side() <= 1 || layer > MAX_LAYERS {
            return ImageNode::new(src.average(&roi), layer);
        }

        let (rect_left, rect_right) = split_rect(roi);

        let (left, right) = if threads > 1 {
            std::thread::scope(|scope| {
                let worker =
                    scope.spawn(move || Self::build_node(src, rect_left, layer + 1, threads / 2));
                let right = Self::build_node(src, rect_right, layer + 1, threads - threads / 2);
                let left = worker
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
                (left, right)
            })
        } else {
            (
                Self::build_node(src, rect_left, layer + 1, 1),
                Self::build_node(src, rect_right, layer + 1, 1),
            )
        };

        let mut node = ImageNode::new((left.value + right.value) / 2.0, layer);
        node.left = Some(Box::new(left));
        node.right = Some(Box::new(right));
        node
    }

    /// Canvas width carried by sync records.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Canvas aspect ratio, height over width.
    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    /// Color space of the canvas.
    pub fn color_mode(&self) -> ColorSpace {
        self.color_mode
    }

    /// Number of image records applied so far.
    pub fn frames_applied(&self) -> u32 {
        self.frames
    }

    /// Apply one record of either kind.
    pub fn apply_frame(&mut self, frame: &Frame) {
        match frame {
            Frame::Image(data) => self.apply_image_data(data),
            Frame::Sync(data) => self.apply_sync_data(data),
        }
    }

    /// Fold a record sequence into the tree, left to right.
    pub fn apply_frame_chain(&mut self, frames: &[Frame]) {
        for frame in frames {
            self.apply_frame(frame);
        }
    }

    /// Apply one image record: walk the record's path from the root,
    /// creating placeholder nodes as needed, then overwrite the target's
    /// children with the recorded summaries and the target itself with
    /// their mean.
    ///
    /// A record whose path crosses not-yet-received regions is fine; the
    /// placeholders it leaves behind are reconciled by [ImageBsp::repair].
    /// Not safe for concurrent mutation.
    pub fn apply_image_data(&mut self, data: &FrameImageData) {
        let target_layer = data.location.layer();
        assert!(target_layer <= MAX_LAYERS);

        let mut node = &mut self.root;
        while node.layer < target_layer {
            let next_layer = node.layer + 1;
            let child = if data.location.path[node.layer as usize] {
                &mut node.right
            } else {
                &mut node.left
            };
            node =
                &mut **child.get_or_insert_with(|| Box::new(ImageNode::new(EMPTY_COLOR, next_layer)));
        }

        let child_layer = node.layer + 1;
        node.left
            .get_or_insert_with(|| Box::new(ImageNode::new(EMPTY_COLOR, child_layer)))
            .value = data.value_l;
        node.right
            .get_or_insert_with(|| Box::new(ImageNode::new(EMPTY_COLOR, child_layer)))
            .value = data.value_r;
        node.value = (data.value_l + data.value_r) / 2.0;

        self.frames += 1;
    }

    /// Apply a sync record: overwrite canvas metadata, leaving the node
    /// structure untouched.
    pub fn apply_sync_data(&mut self, data: &FrameSyncData) {
        self.width = u32::from(data.width);
        self.ratio = data.ratio;
        self.color_mode = data.color_format;
    }

    /// Render the tree into a matrix of the given width; the height follows
    /// from the aspect ratio. A missing child is painted with its parent's
    /// summary, so partially-received trees degrade gracefully instead of
    /// leaving holes.
    pub fn as_image_matrix(&self, out_width: u32) -> ImageMatrix {
        let out_height = (out_width as f32 * self.ratio).round() as u32;
        let mut image = ImageMatrix::new(out_width, out_height, self.color_mode);

        Self::render_node(&mut image, Rect::new(0, 0, out_width, out_height), &self.root);

        image
    }

    fn render_node(dst: &mut ImageMatrix, roi: Rect, node: &ImageNode) {
        if node.is_leaf() {
            dst.fill(&roi, node.value);
            return;
        }

        if roi.longer_side() <= 1 {
            return;
        }

        let (rect_left, rect_right) = split_rect(roi);

        match &node.left {
            Some(left) => Self::render_node(dst, rect_left, left),
            None => dst.fill(&rect_left, node.value),
        }
        match &node.right {
            Some(right) => Self::render_node(dst, rect_right, right),
            None => dst.fill(&rect_right, node.value),
        }
    }

    /// Serialize the tree into a frame chain with the default per-layer
    /// [SeededShuffle] ordering.
    pub fn as_frame_chain(&self, timestamp: u32) -> Vec<Frame> {
        self.as_frame_chain_with(timestamp, &SeededShuffle)
    }

    /// Serialize the tree into a frame chain: one sync record, then one
    /// image record per node with both children present, grouped by layer
    /// in ascending order with `ordering` permuting each group.
    ///
    /// Nodes missing a child are the product of [ImageBsp::repair] on a
    /// truncated stream and are never re-emitted; leaves travel inside
    /// their parent's record.
    pub fn as_frame_chain_with(&self, timestamp: u32, ordering: &dyn LayerOrdering) -> Vec<Frame> {
        let mut chain = vec![Frame::Sync(FrameSyncData {
            width: self.width as u16,
            ratio: self.ratio,
            color_format: self.color_mode,
            id: -1,
            timestamp,
        })];

        let mut layers: BTreeMap<u8, Vec<Frame>> = BTreeMap::new();
        let mut path = NodePath::new();
        Self::push_node_records(&self.root, &mut path, &mut layers);

        for (layer, mut records) in layers {
            ordering.permute(layer, &mut records);
            chain.extend(records);
        }

        chain
    }

    fn push_node_records(node: &ImageNode, path: &mut NodePath, layers: &mut BTreeMap<u8, Vec<Frame>>) {
        let (left, right) = match (&node.left, &node.right) {
            (Some(left), Some(right)) => (left, right),
            _ => return,
        };

        layers
            .entry(node.layer)
            .or_default()
            .push(Frame::Image(FrameImageData {
                location: FrameLocation { path: path.clone() },
                channel: 0,
                value_l: left.value,
                value_r: right.value,
            }));

        path.push(false);
        Self::push_node_records(left, path, layers);
        path.pop();

        path.push(true);
        Self::push_node_records(right, path, layers);
        path.pop();
    }

    /// Reconcile a partially-received tree bottom-up so it renders without
    /// gaps and satisfies the mean invariant again.
    ///
    /// Placeholder parents take their single child's summary; a parent with
    /// a known summary `p` and one child `c` grows a mirror sibling valued
    /// `2p - c`, the unique value whose mean with `c` restores `p`.
    /// Idempotent.
    pub fn repair(&mut self) {
        Self::repair_node(&mut self.root);
    }

    fn repair_node(node: &mut ImageNode) -> f32 {
        // Take the children out while rewriting the node, as the repair of
        // a one-child node may grow the sibling slot.
        let left = node.left.take();
        let right = node.right.take();

        match (left, right) {
            (Some(mut left), Some(mut right)) => {
                node.value = (Self::repair_node(&mut left) + Self::repair_node(&mut right)) / 2.0;
                node.left = Some(left);
                node.right = Some(right);
            }
            (Some(mut left), None) => {
                let child_value = Self::repair_node(&mut left);
                if node.value == EMPTY_COLOR {
                    node.value = child_value;
                } else {
                    node.right = Some(Box::new(ImageNode::new(
                        2.0 * node.value - child_value,
                        node.layer + 1,
                    )));
                }
                node.left = Some(left);
            }
            (None, Some(mut right)) => {
                let child_value = Self::repair_node(&mut right);
                if node.value == EMPTY_COLOR {
                    node.value = child_value;
                } else {
                    node.left = Some(Box::new(ImageNode::new(
                        2.0 * node.value - child_value,
                        node.layer + 1,
                    )));
                }
                node.right = Some(right);
            }
            (None, None) => {}
        }

        node.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_matrix(width: u32, height: u32, value: f32) -> ImageMatrix {
        let mut mat = ImageMatrix::new(width, height, ColorSpace::Grayscale);
        mat.fill(&Rect::new(0, 0, width, height), value);
        mat
    }

    fn assert_mean_invariant(node: &ImageNode) {
        if let (Some(left), Some(right)) = (&node.left, &node.right) {
            assert!((node.value - (left.value + right.value) / 2.0).abs() < 1e-4);
            assert_eq!(left.layer, node.layer + 1);
            assert_eq!(right.layer, node.layer + 1);
            assert_mean_invariant(left);
            assert_mean_invariant(right);
        }
    }

    #[test]
    fn test_zero_canvas() {
        let mat = ImageMatrix::new(4, 4, ColorSpace::Grayscale);
        let bsp = ImageBsp::from_matrix(&mat);

        assert_eq!(bsp.root.value, 0.0);
        assert_mean_invariant(&bsp.root);

        // 4x4 canvas: 16 leaves, 15 internal nodes, plus the sync record.
        let chain = bsp.as_frame_chain(0);
        assert_eq!(chain.len(), 16);
        assert!(chain[0].is_sync());
        assert!(chain[1..].iter().all(Frame::is_image));

        let rendered = bsp.as_image_matrix(4);
        assert_eq!(rendered.height, 4);
        assert!(rendered.data().iter().all(|sample| *sample == 0.0));
    }

    #[test]
    fn test_uniform_canvas() {
        let bsp = ImageBsp::from_matrix(&uniform_matrix(8, 8, 128.0));

        for frame in &bsp.as_frame_chain(0)[1..] {
            let img = frame.image_data().unwrap();
            assert_eq!(img.value_l, 128.0);
            assert_eq!(img.value_r, 128.0);
        }

        // Output widths at or above the leaf resolution, so every output
        // fragment is covered by some leaf fill.
        for out_width in [8, 20, 64] {
            let rendered = bsp.as_image_matrix(out_width);
            assert_eq!(rendered.height, out_width);
            assert!(rendered.data().iter().all(|sample| *sample == 128.0));
        }
    }

    #[test]
    fn test_two_color_canvas() {
        let mat = ImageMatrix::from_bytes(2, 1, ColorSpace::Grayscale, &[0, 255]).unwrap();
        let bsp = ImageBsp::from_matrix(&mat);

        assert_eq!(bsp.root.value, 127.5);

        let chain = bsp.as_frame_chain(0);
        assert_eq!(chain.len(), 2);

        let img = chain[1].image_data().unwrap();
        assert_eq!(img.location.layer(), 0);
        assert_eq!(img.value_l, 0.0);
        assert_eq!(img.value_r, 255.0);
    }

    #[test]
    fn test_leaves_hold_rectangle_averages() {
        let mat =
            ImageMatrix::from_bytes(4, 1, ColorSpace::Grayscale, &[10, 20, 30, 40]).unwrap();
        let bsp = ImageBsp::from_matrix(&mat);

        // Leaves are single fragments here, so rendering at the source
        // width must reproduce the input exactly.
        let rendered = bsp.as_image_matrix(4);
        assert_eq!(rendered.data(), mat.data());
        assert_mean_invariant(&bsp.root);

        // Layer 1 summaries are the averages of the two halves.
        let chain = bsp.as_frame_chain(0);
        let root_record = chain
            .iter()
            .filter_map(Frame::image_data)
            .find(|img| img.location.layer() == 0)
            .unwrap();
        assert_eq!(root_record.value_l, 15.0);
        assert_eq!(root_record.value_r, 35.0);
    }

    #[test]
    fn test_parallel_build_matches_sequential() {
        let mut mat = ImageMatrix::new(16, 16, ColorSpace::Grayscale);
        for y in 0..16 {
            for x in 0..16 {
                mat.set_sample(x, y, 0, (x * 16 + y) as f32);
            }
        }

        let sequential = ImageBsp::from_matrix(&mat);
        let parallel = ImageBsp::from_matrix_parallel(&mat, 4);

        let a = sequential.as_image_matrix(16);
        let b = parallel.as_image_matrix(16);
        assert_eq!(a.data(), b.data());

        let chain_a = sequential.as_frame_chain(0);
        let chain_b = parallel.as_frame_chain(0);
        assert_eq!(chain_a, chain_b);
    }

    #[test]
    fn test_chain_reconstructs_tree() {
        let mat = ImageMatrix::from_bytes(
            4,
            2,
            ColorSpace::Grayscale,
            &[0, 50, 100, 150, 200, 250, 30, 60],
        )
        .unwrap();
        let bsp = ImageBsp::from_matrix(&mat);
        let chain: Vec<Frame> = bsp
            .as_frame_chain(7)
            .iter()
            .map(|frame| Frame::deserialize(&frame.serialize()).unwrap())
            .collect();

        let mut rebuilt = ImageBsp::new(ColorSpace::Grayscale);
        rebuilt.apply_frame_chain(&chain);

        assert_eq!(rebuilt.width(), 4);
        assert_eq!(rebuilt.ratio(), 0.5);
        assert_eq!(rebuilt.frames_applied(), chain.len() as u32 - 1);

        let original = bsp.as_image_matrix(4);
        let decoded = rebuilt.as_image_matrix(4);
        for (a, b) in original.data().iter().zip(decoded.data().iter()) {
            // Values crossed the byte quantization once.
            assert!((a - b).abs() < 1.01);
        }
    }

    #[test]
    fn test_chain_is_layer_ordered_and_shuffle_is_deterministic() {
        let mut mat = ImageMatrix::new(8, 8, ColorSpace::Grayscale);
        for id in 0..64 {
            mat.set_sample_at(id, id as f32);
        }
        let bsp = ImageBsp::from_matrix(&mat);

        let chain = bsp.as_frame_chain(0);
        let layers: Vec<u8> = chain[1..]
            .iter()
            .filter_map(Frame::image_data)
            .map(|img| img.location.layer())
            .collect();
        let mut sorted = layers.clone();
        sorted.sort_unstable();
        assert_eq!(layers, sorted);

        assert_eq!(chain, bsp.as_frame_chain(0));
    }

    #[test]
    fn test_partial_chain_renders_after_repair() {
        let mut mat = ImageMatrix::new(16, 16, ColorSpace::Grayscale);
        for id in 0..256 {
            mat.set_sample_at(id, (id % 251) as f32);
        }
        let bsp = ImageBsp::from_matrix(&mat);
        let chain = bsp.as_frame_chain(0);

        let keep = 1 + (chain.len() - 1) / 20;
        let mut partial = ImageBsp::new(ColorSpace::Grayscale);
        partial.apply_frame_chain(&chain[..keep]);
        partial.repair();

        let rendered = partial.as_image_matrix(16);
        for sample in rendered.data() {
            assert!(*sample != EMPTY_COLOR);
            assert!((0.0..=255.0).contains(sample));
        }
        assert_mean_invariant(&partial.root);
    }

    #[test]
    fn test_repair_adopts_child_value_into_empty_parent() {
        // A lone layer-1 record leaves the root EMPTY and half the canvas
        // unknown; repair fills the root from below without inventing a
        // sibling, as there is no parent summary to mirror against.
        let mut bsp = ImageBsp::new(ColorSpace::Grayscale);
        bsp.apply_image_data(&FrameImageData {
            location: FrameLocation::root().child(false),
            channel: 0,
            value_l: 10.0,
            value_r: 30.0,
        });

        bsp.repair();

        assert_eq!(bsp.root.value, 20.0);
        assert!(bsp.root.right.is_none());

        let left = bsp.root.left.as_ref().unwrap();
        assert_eq!(left.value, 20.0);
        assert_eq!(left.left.as_ref().unwrap().value, 10.0);
        assert_eq!(left.right.as_ref().unwrap().value, 30.0);
    }

    #[test]
    fn test_repair_mirror_synthesis() {
        // Records at layers 0 and 2 but none at layer 1: the layer-1 node
        // on the path holds a known summary (10) and a single child whose
        // repaired value is also 10, so repair grows the missing sibling at
        // 2 * 10 - 10 = 10, keeping the parent mean intact.
        let mut bsp = ImageBsp::new(ColorSpace::Grayscale);
        bsp.apply_image_data(&FrameImageData {
            location: FrameLocation::root(),
            channel: 0,
            value_l: 10.0,
            value_r: 30.0,
        });
        bsp.apply_image_data(&FrameImageData {
            location: FrameLocation::root().child(false).child(false),
            channel: 0,
            value_l: 5.0,
            value_r: 15.0,
        });

        bsp.repair();

        assert_eq!(bsp.root.value, 20.0);

        let left = bsp.root.left.as_ref().unwrap();
        assert_eq!(left.value, 10.0);

        let mirrored = left.right.as_ref().unwrap();
        assert_eq!(mirrored.value, 10.0);
        assert!(mirrored.is_leaf());
        assert_eq!(mirrored.layer, 2);

        // The repaired tree renders with no trace of the placeholder.
        bsp.apply_sync_data(&FrameSyncData {
            width: 4,
            ratio: 1.0,
            color_format: ColorSpace::Grayscale,
            id: -1,
            timestamp: 0,
        });
        let rendered = bsp.as_image_matrix(4);
        assert!(rendered.data().iter().all(|sample| *sample >= 0.0));
    }

    #[test]
    fn test_repair_is_idempotent() {
        let mut mat = ImageMatrix::new(8, 8, ColorSpace::Grayscale);
        for id in 0..64 {
            mat.set_sample_at(id, (id * 3 % 255) as f32);
        }
        let chain = ImageBsp::from_matrix(&mat).as_frame_chain(0);

        let mut partial = ImageBsp::new(ColorSpace::Grayscale);
        partial.apply_frame_chain(&chain[..chain.len() / 3]);

        partial.repair();
        let once = partial.as_image_matrix(8);
        let chain_once = partial.as_frame_chain(0);

        partial.repair();
        let twice = partial.as_image_matrix(8);
        let chain_twice = partial.as_frame_chain(0);

        assert_eq!(once.data(), twice.data());
        assert_eq!(chain_once, chain_twice);
    }

    #[test]
    #[should_panic]
    fn test_single_fragment_canvas_panics() {
        let mat = ImageMatrix::new(1, 1, ColorSpace::Grayscale);
        let _ = ImageBsp::from_matrix(&mat);
    }
}
