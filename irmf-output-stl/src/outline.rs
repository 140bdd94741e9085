//! Reduced-outline STL emitter.
//!
//! Each Z slice is labeled into connected components; every component's
//! boundary is traced, reduced to its convex hull, refined by concavity
//! re-injection, and emitted as side-wall quads spanning the slice
//! thickness. Top and bottom caps are left to a later pass; only the `+Z`
//! sweep emits geometry.

use crate::concavity::correct_concavity;
use crate::edges::find_edges;
use crate::hull::convex_hull;
use crate::labels::{connected_component_labeling, Key};
use crate::paths::{edges_to_paths, Path};
use crate::writer::{StlWriter, Tri};
use image::DynamicImage;
use irmf_slicer::{IrmfResult, Order, Renderer, Slicer};

/// Contour points closer than this to the running hull segment are dropped.
const CONCAVITY_THRESHOLD: f64 = 2.0;

/// Slices the model along Z and streams reduced side-wall outlines to
/// `filename`.
pub fn slice_to_stl_outline<R: Renderer>(
    slicer: &mut Slicer<R>,
    material_num: usize,
    filename: &str,
) -> IrmfResult<()> {
    let w = StlWriter::create(filename).map_err(|e| anyhow::anyhow!("StlWriter::create: {e}"))?;
    let (min, _) = slicer.mbb();
    let rx = 0.5 * slicer.res_x / 1000.0;
    let ry = 0.5 * slicer.res_y / 1000.0;
    let n = [0.0f32, 0.0, 1.0];

    println!("Rendering Z-slices for outline STL...");
    slicer
        .prepare_render_z()
        .map_err(|e| anyhow::anyhow!("prepare_render_z: {e}"))?;

    slicer.render_z_slices(material_num, Order::MaxToMin, |_, z, vr, img| {
        process_slice(&w, img, min, rx, ry, n, z, vr)
    })?;

    let count = w
        .close()
        .map_err(|e| anyhow::anyhow!("StlWriter::close: {e}"))?;
    println!("Wrote {count} triangles to {filename}");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn process_slice(
    w: &StlWriter,
    img: &DynamicImage,
    min: [f32; 3],
    rx: f32,
    ry: f32,
    n: [f32; 3],
    z: f32,
    voxel_radius: f32,
) -> IrmfResult<()> {
    if n[2] < 0.0 {
        return Ok(());
    }

    let labels = connected_component_labeling(img);
    let depth = z + n[2] * voxel_radius;
    let vr2 = 2.0 * voxel_radius;

    for label in labels.values() {
        let edges = find_edges(label);
        let paths = edges_to_paths(&edges)?;
        for (i, path) in paths.iter().enumerate() {
            let hull = convex_hull(path, i > 0);
            let refined = if i == 0 {
                correct_concavity(&hull, path, CONCAVITY_THRESHOLD)
            } else {
                // Inner hulls run opposite to the trace; walk the contour
                // backwards to match.
                let mut reversed = path.clone();
                reversed.reverse();
                correct_concavity(&hull, &reversed, CONCAVITY_THRESHOLD)
            };
            write_side_walls(w, &refined, min, rx, ry, depth, vr2)?;
        }
    }

    Ok(())
}

/// Emits two triangles per consecutive path segment, spanning `depth - vr2`
/// to `depth`, with the outward normal derived from the segment direction.
fn write_side_walls(
    w: &StlWriter,
    path: &Path,
    min: [f32; 3],
    rx: f32,
    ry: f32,
    depth: f32,
    vr2: f32,
) -> IrmfResult<()> {
    if path.len() < 2 {
        return Ok(());
    }

    let calc_xy = |(v, u): Key| {
        (
            2.0 * rx * u as f32 + rx + min[0],
            2.0 * ry * v as f32 + ry + min[1],
        )
    };

    let (mut last_x, mut last_y) = calc_xy(path[0]);
    for &key in &path[1..] {
        let (x, y) = calc_xy(key);
        let angle = ((y - last_y) as f64).atan2((x - last_x) as f64);
        let n = [angle.sin() as f32, angle.cos() as f32, 0.0];

        let v1 = [last_x, last_y, depth - vr2];
        let v3 = [x, y, depth];
        w.write(Tri {
            n,
            v1,
            v2: [x, y, depth - vr2],
            v3,
        })?;
        w.write(Tri {
            n,
            v1,
            v2: v3,
            v3: [last_x, last_y, depth],
        })?;

        (last_x, last_y) = (x, y);
    }
    Ok(())
}
