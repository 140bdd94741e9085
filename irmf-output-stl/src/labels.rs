//! Two-pass 8-connected component labeling of binary slice images.

use image::{DynamicImage, GenericImageView};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Pixel (and corner) coordinates as `(row, col)`.
///
/// The derived ordering sorts by row, then column, which is the canonical
/// traversal order for outlines and hulls.
pub type Key = (i32, i32);

/// A connected region of set pixels within one slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Label {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
    pub pixels: BTreeSet<Key>,
}

/// Labels the set pixels of `img` (R channel non-zero), 8-connected.
///
/// Returned labels are keyed by the minimum provisional label of their
/// equivalence class, so label numbering is stable across runs.
pub fn connected_component_labeling(img: &DynamicImage) -> BTreeMap<usize, Label> {
    let (width, height) = img.dimensions();
    let on = |u: i32, v: i32| {
        if u < 0 || v < 0 || u >= width as i32 || v >= height as i32 {
            return false;
        }
        img.get_pixel(u as u32, v as u32)[0] != 0
    };

    // First pass: provisional labels plus a union structure over label
    // equivalences. Union by minimum so each class's representative is its
    // smallest member.
    let mut parent: Vec<usize> = vec![0]; // 1-based
    let mut provisional: HashMap<Key, usize> = HashMap::new();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for v in 0..height as i32 {
        for u in 0..width as i32 {
            if !on(u, v) {
                continue;
            }

            let neighbors = [(v, u - 1), (v - 1, u - 1), (v - 1, u), (v - 1, u + 1)];
            let mut min_label = 0usize;
            for n in neighbors {
                if let Some(&label) = provisional.get(&n) {
                    if min_label == 0 || label < min_label {
                        min_label = label;
                    }
                }
            }

            if min_label == 0 {
                min_label = parent.len();
                parent.push(min_label);
            } else {
                for n in neighbors {
                    if let Some(&label) = provisional.get(&n) {
                        let a = find(&mut parent, label);
                        let b = find(&mut parent, min_label);
                        let root = a.min(b);
                        parent[a] = root;
                        parent[b] = root;
                    }
                }
            }
            provisional.insert((v, u), min_label);
        }
    }

    // Second pass: rewrite each pixel to its class representative and group
    // into labels with bounding boxes, in sorted pixel order.
    let sorted: BTreeMap<Key, usize> = provisional.into_iter().collect();
    let mut labels: BTreeMap<usize, Label> = BTreeMap::new();
    for (key, label) in sorted {
        let root = find(&mut parent, label);
        let (y, x) = key;
        let entry = labels.entry(root).or_default();
        if entry.pixels.is_empty() {
            entry.xmin = x;
            entry.xmax = x;
            entry.ymin = y;
            entry.ymax = y;
        } else {
            entry.xmin = entry.xmin.min(x);
            entry.xmax = entry.xmax.max(x);
            entry.ymin = entry.ymin.min(y);
            entry.ymax = entry.ymax.max(y);
        }
        entry.pixels.insert(key);
    }

    labels
}

#[cfg(test)]
pub(crate) fn image_from_rows(width: u32, height: u32, data: &[u8]) -> DynamicImage {
    let mut img = image::GrayImage::new(width, height);
    for v in 0..height {
        for u in 0..width {
            let val = data[(v * width + u) as usize];
            img.put_pixel(u, v, image::Luma([val * 255]));
        }
    }
    DynamicImage::ImageLuma8(img)
}
