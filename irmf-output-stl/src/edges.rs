//! Per-pixel boundary edge flags for labeled regions.

use crate::labels::{Key, Label};
use std::collections::BTreeMap;

/// The exposed edges of one label pixel, one bit per side.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Edge(pub u8);

pub const TOP: Edge = Edge(1);
pub const LEFT: Edge = Edge(2);
pub const BOTTOM: Edge = Edge(4);
pub const RIGHT: Edge = Edge(8);

impl Edge {
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
    pub fn has(self, e: Edge) -> bool {
        self.0 & e.0 == e.0
    }
    #[must_use]
    pub fn add(self, e: Edge) -> Edge {
        Edge(self.0 | e.0)
    }
    #[must_use]
    pub fn remove(self, e: Edge) -> Edge {
        Edge(self.0 & !e.0)
    }
}

/// The boundary of a label: pixel key to exposed-edge mask.
pub type Outline = BTreeMap<Key, Edge>;

/// Computes the edge mask of every label pixel, dropping interior pixels
/// (mask zero). An edge bit is set iff the neighbor on that side is not a
/// member of the same label.
pub fn find_edges(label: &Label) -> Outline {
    let mut edges = Outline::new();
    for &(v, u) in &label.pixels {
        let mut e = Edge::default();
        if !label.pixels.contains(&(v - 1, u)) {
            e = e.add(TOP);
        }
        if !label.pixels.contains(&(v, u - 1)) {
            e = e.add(LEFT);
        }
        if !label.pixels.contains(&(v + 1, u)) {
            e = e.add(BOTTOM);
        }
        if !label.pixels.contains(&(v, u + 1)) {
            e = e.add(RIGHT);
        }
        if !e.is_empty() {
            edges.insert((v, u), e);
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label_of(pixels: &[Key]) -> Label {
        Label {
            pixels: pixels.iter().copied().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_find_edges_blob() {
        let label = label_of(&[
            (0, 1),
            (0, 2),
            (0, 3),
            (1, 0),
            (1, 1),
            (1, 3),
            (1, 4),
            (2, 1),
            (2, 2),
            (2, 3),
        ]);
        let want: Outline = [
            ((0, 1), Edge(0x3)),
            ((0, 2), Edge(0x5)),
            ((0, 3), Edge(0x9)),
            ((1, 0), Edge(0x7)),
            ((1, 1), Edge(0x8)),
            ((1, 3), Edge(0x2)),
            ((1, 4), Edge(0xd)),
            ((2, 1), Edge(0x6)),
            ((2, 2), Edge(0x5)),
            ((2, 3), Edge(0xc)),
        ]
        .into_iter()
        .collect();

        assert_eq!(find_edges(&label), want);
    }

    #[test]
    fn test_find_edges_wikipedia_blob_a() {
        let label = label_of(&crate::labels::tests::blob_a_pixels().into_iter().collect::<Vec<_>>());
        let want: Outline = [
            ((1, 2), Edge(0x3)),
            ((1, 3), Edge(0x9)),
            ((1, 6), Edge(0x3)),
            ((1, 7), Edge(0x9)),
            ((2, 1), Edge(0x7)),
            ((2, 2), Edge(0x4)),
            ((2, 4), Edge(0x1)),
            ((2, 5), Edge(0x1)),
            ((2, 7), Edge(0x4)),
            ((2, 8), Edge(0xd)),
            ((3, 3), Edge(0x2)),
            ((3, 6), Edge(0xc)),
            ((4, 2), Edge(0x3)),
            ((4, 4), Edge(0x4)),
            ((4, 5), Edge(0xc)),
            ((5, 1), Edge(0x7)),
            ((5, 3), Edge(0x8)),
            ((5, 6), Edge(0x7)),
            ((5, 7), Edge(0xd)),
            ((6, 2), Edge(0x6)),
            ((6, 3), Edge(0xc)),
        ]
        .into_iter()
        .collect();

        assert_eq!(find_edges(&label), want);
    }

    #[test]
    fn test_edge_bit_count_equals_perimeter() {
        // A full rectangle's exposed edge bits sum to its 4-neighborhood
        // perimeter.
        let mut pixels = Vec::new();
        for v in 0..3 {
            for u in 0..5 {
                pixels.push((v, u));
            }
        }
        let edges = find_edges(&label_of(&pixels));
        let total_bits: u32 = edges.values().map(|e| e.0.count_ones()).sum();
        assert_eq!(total_bits, 2 * (3 + 5));
    }
}
