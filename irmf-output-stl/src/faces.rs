//! Simple boundary-face STL emitter.
//!
//! Two Z sweeps clothe the model completely. The `+Z` sweep (max to min)
//! emits a top face for every voxel newly exposed relative to the previous
//! slice, plus one axis-aligned side wall per row/column occupancy transition
//! within each slice. The `-Z` sweep (min to max) emits the bottom faces.

use crate::writer::{StlWriter, Tri};
use image::{DynamicImage, GenericImageView};
use irmf_slicer::{IrmfResult, Order, Renderer, Slicer};
use std::collections::HashSet;

/// Slices the model along Z and streams boundary-voxel faces to `filename`.
pub fn slice_to_stl<R: Renderer>(
    slicer: &mut Slicer<R>,
    material_num: usize,
    filename: &str,
) -> IrmfResult<()> {
    let w = StlWriter::create(filename).map_err(|e| anyhow::anyhow!("StlWriter::create: {e}"))?;
    let (min, _) = slicer.mbb();
    let mut faces = FacesEmitter::new(
        min,
        0.5 * slicer.res_x / 1000.0,
        0.5 * slicer.res_y / 1000.0,
    );

    println!("Rendering Z-slices for STL...");
    slicer
        .prepare_render_z()
        .map_err(|e| anyhow::anyhow!("prepare_render_z: {e}"))?;

    faces.new_normal([0.0, 0.0, 1.0]);
    slicer.render_z_slices(material_num, Order::MaxToMin, |_, z, vr, img| {
        faces.process_slice(&w, z, vr, img)
    })?;

    faces.new_normal([0.0, 0.0, -1.0]);
    slicer.render_z_slices(material_num, Order::MinToMax, |_, z, vr, img| {
        faces.process_slice(&w, z, vr, img)
    })?;

    let count = w
        .close()
        .map_err(|e| anyhow::anyhow!("StlWriter::close: {e}"))?;
    println!("Wrote {count} triangles to {filename}");
    Ok(())
}

/// Streams voxel faces for one material, one sweep normal at a time.
struct FacesEmitter {
    min: [f32; 3],
    rx: f32, // in-plane voxel radii, millimeters
    ry: f32,

    n: [f32; 3],
    last: Option<HashSet<(u32, u32)>>,
}

impl FacesEmitter {
    fn new(min: [f32; 3], rx: f32, ry: f32) -> Self {
        Self {
            min,
            rx,
            ry,
            n: [0.0, 0.0, 1.0],
            last: None,
        }
    }

    /// Starts a new sweep normal; the previous-slice occupancy is discarded.
    fn new_normal(&mut self, n: [f32; 3]) {
        self.n = n;
        self.last = None;
    }

    fn process_slice(
        &mut self,
        w: &StlWriter,
        z: f32,
        vr_z: f32,
        img: &DynamicImage,
    ) -> IrmfResult<()> {
        let (width, height) = img.dimensions();
        let on = |u: u32, v: u32| img.get_pixel(u, v)[0] != 0;
        let depth = z + self.n[2] * vr_z;
        let side_walls = self.n[2] > 0.0;
        let mut cur = HashSet::new();

        for v in 0..height {
            let mut xm_inside = false;
            for u in 0..width {
                if !on(u, v) {
                    xm_inside = false;
                    continue;
                }
                if side_walls && !xm_inside {
                    self.wall_x(w, u, v, z, vr_z, -1.0)?;
                    xm_inside = true;
                }
                cur.insert((u, v));
                if let Some(last) = &self.last {
                    if last.contains(&(u, v)) {
                        continue; // already covered
                    }
                }
                self.z_face(w, u, v, depth)?;
            }

            if side_walls {
                let mut xp_inside = false;
                for u in (0..width).rev() {
                    if !on(u, v) {
                        xp_inside = false;
                        continue;
                    }
                    if !xp_inside {
                        self.wall_x(w, u, v, z, vr_z, 1.0)?;
                        xp_inside = true;
                    }
                }
            }
        }

        if side_walls {
            for u in 0..width {
                let mut ym_inside = false;
                for v in 0..height {
                    if !on(u, v) {
                        ym_inside = false;
                        continue;
                    }
                    if !ym_inside {
                        self.wall_y(w, u, v, z, vr_z, -1.0)?;
                        ym_inside = true;
                    }
                }

                let mut yp_inside = false;
                for v in (0..height).rev() {
                    if !on(u, v) {
                        yp_inside = false;
                        continue;
                    }
                    if !yp_inside {
                        self.wall_y(w, u, v, z, vr_z, 1.0)?;
                        yp_inside = true;
                    }
                }
            }
        }

        self.last = Some(cur);
        Ok(())
    }

    /// World-space voxel center for pixel `(u, v)`.
    fn center(&self, u: u32, v: u32) -> (f32, f32) {
        (
            2.0 * self.rx * u as f32 + self.rx + self.min[0],
            2.0 * self.ry * v as f32 + self.ry + self.min[1],
        )
    }

    fn z_face(&self, w: &StlWriter, u: u32, v: u32, depth: f32) -> IrmfResult<()> {
        let (x, y) = self.center(u, v);
        let (x0, x1) = (x - self.rx, x + self.rx);
        let (y0, y1) = (y - self.ry, y + self.ry);
        if self.n[2] > 0.0 {
            quad(
                w,
                [0.0, 0.0, 1.0],
                [x0, y0, depth],
                [x1, y0, depth],
                [x1, y1, depth],
                [x0, y1, depth],
            )
        } else {
            quad(
                w,
                [0.0, 0.0, -1.0],
                [x0, y0, depth],
                [x0, y1, depth],
                [x1, y1, depth],
                [x1, y0, depth],
            )
        }
    }

    fn wall_x(&self, w: &StlWriter, u: u32, v: u32, z: f32, vr_z: f32, dir: f32) -> IrmfResult<()> {
        let (x, y) = self.center(u, v);
        let xf = x + dir * self.rx;
        let (y0, y1) = (y - self.ry, y + self.ry);
        let (z0, z1) = (z - vr_z, z + vr_z);
        if dir > 0.0 {
            quad(
                w,
                [1.0, 0.0, 0.0],
                [xf, y0, z0],
                [xf, y1, z0],
                [xf, y1, z1],
                [xf, y0, z1],
            )
        } else {
            quad(
                w,
                [-1.0, 0.0, 0.0],
                [xf, y0, z0],
                [xf, y0, z1],
                [xf, y1, z1],
                [xf, y1, z0],
            )
        }
    }

    fn wall_y(&self, w: &StlWriter, u: u32, v: u32, z: f32, vr_z: f32, dir: f32) -> IrmfResult<()> {
        let (x, y) = self.center(u, v);
        let yf = y + dir * self.ry;
        let (x0, x1) = (x - self.rx, x + self.rx);
        let (z0, z1) = (z - vr_z, z + vr_z);
        if dir > 0.0 {
            quad(
                w,
                [0.0, 1.0, 0.0],
                [x0, yf, z0],
                [x0, yf, z1],
                [x1, yf, z1],
                [x1, yf, z0],
            )
        } else {
            quad(
                w,
                [0.0, -1.0, 0.0],
                [x0, yf, z0],
                [x1, yf, z0],
                [x1, yf, z1],
                [x0, yf, z1],
            )
        }
    }
}

/// Emits one quad as two right-handed triangles with the given normal.
fn quad(
    w: &StlWriter,
    n: [f32; 3],
    a: [f32; 3],
    b: [f32; 3],
    c: [f32; 3],
    d: [f32; 3],
) -> IrmfResult<()> {
    w.write(Tri { n, v1: a, v2: b, v3: c })?;
    w.write(Tri { n, v1: a, v2: c, v3: d })?;
    Ok(())
}
