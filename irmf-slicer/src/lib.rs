//! Volumetric slicing of IRMF shader models.
//!
//! A [`Slicer`] drives a [`Renderer`] over axis-aligned slice planes of a
//! parsed [`IrmfModel`], delivering one binary occupancy image per material,
//! per axis, per slice index to a caller-supplied sink. Downstream consumers
//! (STL, photon, binvox, ZIP/SVX emitters) are pure streaming sinks over
//! those images.

pub mod irmf;
pub mod mock_renderer;
pub mod shader;
pub mod wgpu_renderer;

pub use image::DynamicImage;
pub use irmf::{IrmfError, IrmfHeader, IrmfModel};
pub use mock_renderer::MockRenderer;
pub use wgpu_renderer::WgpuRenderer;

pub type IrmfResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Sweep direction along the slicing axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Order {
    MinToMax,
    MaxToMin,
}

/// A rasterizer capable of rendering one slice of the model at a time.
pub trait Renderer {
    /// (Re)creates the offscreen render target at the given pixel size.
    fn init(&mut self, width: u32, height: u32) -> IrmfResult<()>;

    /// Compiles the composed shader program and binds the slicing geometry.
    ///
    /// `vertices` is the slicing quad as 6 world-space vertices (18 floats);
    /// `vec3_str` is the axis-dependent `pos` construction (see
    /// [`shader::VEC3_X`] and friends).
    fn prepare(
        &mut self,
        model: &IrmfModel,
        vertices: &[f32],
        projection: glam::Mat4,
        camera: glam::Mat4,
        model_matrix: glam::Mat4,
        vec3_str: &str,
    ) -> IrmfResult<()>;

    /// Renders one slice plane and reads back the RGBA raster.
    ///
    /// Row 0 of the returned image corresponds to the minimum of the second
    /// in-plane axis. A pixel is "on" iff its R channel is non-zero.
    fn render(&mut self, slice_depth: f32, material_num: usize) -> IrmfResult<DynamicImage>;
}

/// Drives a renderer across the slice planes of one model.
///
/// Resolutions are in microns per voxel edge. The slicer owns the rendering
/// context across all materials of one model; `prepare_render_*` must be
/// called before the matching `render_*` family.
pub struct Slicer<R: Renderer> {
    pub model: IrmfModel,
    pub renderer: R,
    pub res_x: f32, // microns
    pub res_y: f32,
    pub res_z: f32,
    model_matrix: glam::Mat4,
}

impl<R: Renderer> Slicer<R> {
    pub fn new(model: IrmfModel, renderer: R, res_x: f32, res_y: f32, res_z: f32) -> Self {
        Self {
            model,
            renderer,
            res_x,
            res_y,
            res_z,
            model_matrix: glam::Mat4::IDENTITY,
        }
    }

    /// Applies a pre-rotation to the model: X first, then Y, then Z (radians).
    pub fn with_rotation(mut self, rot_x: f32, rot_y: f32, rot_z: f32) -> Self {
        self.model_matrix = glam::Mat4::from_rotation_z(rot_z)
            * glam::Mat4::from_rotation_y(rot_y)
            * glam::Mat4::from_rotation_x(rot_x);
        self
    }

    /// The model's bounding box in millimeters.
    pub fn mbb(&self) -> ([f32; 3], [f32; 3]) {
        (self.model.min(), self.model.max())
    }

    pub fn num_materials(&self) -> usize {
        self.model.header.materials.len()
    }

    /// 1-based material name lookup.
    pub fn material_name(&self, material_num: usize) -> &str {
        &self.model.header.materials[material_num - 1]
    }

    pub fn num_x_slices(&self) -> usize {
        let delta_x = self.res_x / 1000.0;
        let (min, max) = self.mbb();
        (0.5 + (max[0] - min[0]) / delta_x).floor() as usize
    }

    pub fn num_y_slices(&self) -> usize {
        let delta_y = self.res_y / 1000.0;
        let (min, max) = self.mbb();
        let n = (0.5 + (max[1] - min[1]) / delta_y).floor() as usize;
        // Legacy parity rule: an odd X count bumps the Y count by one so that
        // output artifacts stay byte-identical with prior releases.
        if self.num_x_slices() % 2 == 1 {
            n + 1
        } else {
            n
        }
    }

    pub fn num_z_slices(&self) -> usize {
        let delta_z = self.res_z / 1000.0;
        let (min, max) = self.mbb();
        (0.5 + (max[2] - min[2]) / delta_z).floor() as usize
    }

    /// Sizes the framebuffer for an axis given the in-plane extents and voxel
    /// pitches, preserving aspect ratio and forcing an even width.
    fn viewport(
        &self,
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        delta_u: f32,
        delta_v: f32,
    ) -> (u32, u32) {
        let aspect_ratio = ((right - left) * delta_v) / ((top - bottom) * delta_u);
        let mut width = (0.5 + (right - left) / delta_u).floor() as u32;
        let mut height = (0.5 + (top - bottom) / delta_v).floor() as u32;

        if aspect_ratio * (height as f32) < (width as f32) {
            height = (0.5 + (width as f32) / aspect_ratio).floor() as u32;
        }
        if width % 2 == 1 {
            width += 1;
            height += 1;
        }
        (width, height)
    }

    pub fn prepare_render_x(&mut self) -> IrmfResult<()> {
        let (min, max) = self.mbb();
        let (left, right) = (min[1], max[1]);
        let (bottom, top) = (min[2], max[2]);
        let delta_y = self.res_y / 1000.0;
        let delta_z = self.res_z / 1000.0;

        let (width, height) = self.viewport(left, right, bottom, top, delta_y, delta_z);
        self.renderer.init(width, height)?;

        let projection = glam::Mat4::orthographic_rh(left, right, bottom, top, 0.1, 100.0);
        let camera = glam::Mat4::look_at_rh(
            glam::vec3(3.0, 0.0, 0.0),
            glam::Vec3::ZERO,
            glam::vec3(0.0, 0.0, 1.0),
        );
        let vertices = [
            0.0, left, bottom, 0.0, right, bottom, 0.0, left, top, //
            0.0, left, top, 0.0, right, bottom, 0.0, right, top,
        ];
        self.renderer.prepare(
            &self.model,
            &vertices,
            projection,
            camera,
            self.model_matrix,
            shader::VEC3_X,
        )
    }

    pub fn prepare_render_y(&mut self) -> IrmfResult<()> {
        let (min, max) = self.mbb();
        let (left, right) = (min[0], max[0]);
        let (bottom, top) = (min[2], max[2]);
        let delta_x = self.res_x / 1000.0;
        let delta_z = self.res_z / 1000.0;

        let (width, height) = self.viewport(left, right, bottom, top, delta_x, delta_z);
        self.renderer.init(width, height)?;

        let projection = glam::Mat4::orthographic_rh(left, right, bottom, top, 0.1, 100.0);
        let camera = glam::Mat4::look_at_rh(
            glam::vec3(0.0, -3.0, 0.0),
            glam::Vec3::ZERO,
            glam::vec3(0.0, 0.0, 1.0),
        );
        let vertices = [
            left, 0.0, bottom, right, 0.0, bottom, left, 0.0, top, //
            left, 0.0, top, right, 0.0, bottom, right, 0.0, top,
        ];
        self.renderer.prepare(
            &self.model,
            &vertices,
            projection,
            camera,
            self.model_matrix,
            shader::VEC3_Y,
        )
    }

    pub fn prepare_render_z(&mut self) -> IrmfResult<()> {
        let (min, max) = self.mbb();
        let (left, right) = (min[0], max[0]);
        let (bottom, top) = (min[1], max[1]);
        let delta_x = self.res_x / 1000.0;
        let delta_y = self.res_y / 1000.0;

        let (width, height) = self.viewport(left, right, bottom, top, delta_x, delta_y);
        self.renderer.init(width, height)?;

        let projection = glam::Mat4::orthographic_rh(left, right, bottom, top, 0.1, 100.0);
        let camera = glam::Mat4::look_at_rh(
            glam::vec3(0.0, 0.0, 3.0),
            glam::Vec3::ZERO,
            glam::vec3(0.0, 1.0, 0.0),
        );
        let vertices = [
            left, bottom, 0.0, right, bottom, 0.0, left, top, 0.0, //
            left, top, 0.0, right, bottom, 0.0, right, top, 0.0,
        ];
        self.renderer.prepare(
            &self.model,
            &vertices,
            projection,
            camera,
            self.model_matrix,
            shader::VEC3_Z,
        )
    }

    pub fn render_x_slice(
        &mut self,
        slice_num: usize,
        material_num: usize,
    ) -> IrmfResult<DynamicImage> {
        let delta_x = self.res_x / 1000.0;
        let depth = self.model.min()[0] + 0.5 * delta_x + (slice_num as f32) * delta_x;
        self.renderer.render(depth, material_num)
    }

    pub fn render_y_slice(
        &mut self,
        slice_num: usize,
        material_num: usize,
    ) -> IrmfResult<DynamicImage> {
        let delta_y = self.res_y / 1000.0;
        let depth = self.model.min()[1] + 0.5 * delta_y + (slice_num as f32) * delta_y;
        self.renderer.render(depth, material_num)
    }

    pub fn render_z_slice(
        &mut self,
        slice_num: usize,
        material_num: usize,
    ) -> IrmfResult<DynamicImage> {
        let delta_z = self.res_z / 1000.0;
        let depth = self.model.min()[2] + 0.5 * delta_z + (slice_num as f32) * delta_z;
        self.renderer.render(depth, material_num)
    }

    /// Sweeps all X slices in the given order.
    ///
    /// The sink receives `(sliceIndex, planeCoord, voxelRadius, image)` where
    /// `sliceIndex` is a 0-based call counter and `planeCoord` follows the
    /// sweep direction. Calls are strictly sequential.
    pub fn render_x_slices<F>(&mut self, material_num: usize, order: Order, f: F) -> IrmfResult<()>
    where
        F: FnMut(usize, f32, f32, &DynamicImage) -> IrmfResult<()>,
    {
        let n = self.num_x_slices();
        let delta = self.res_x / 1000.0;
        let min = self.model.min()[0];
        self.render_sweep(n, delta, min, material_num, order, f)
    }

    /// Sweeps all Y slices in the given order. See [`Slicer::render_x_slices`].
    pub fn render_y_slices<F>(&mut self, material_num: usize, order: Order, f: F) -> IrmfResult<()>
    where
        F: FnMut(usize, f32, f32, &DynamicImage) -> IrmfResult<()>,
    {
        let n = self.num_y_slices();
        let delta = self.res_y / 1000.0;
        let min = self.model.min()[1];
        self.render_sweep(n, delta, min, material_num, order, f)
    }

    /// Sweeps all Z slices in the given order. See [`Slicer::render_x_slices`].
    pub fn render_z_slices<F>(&mut self, material_num: usize, order: Order, f: F) -> IrmfResult<()>
    where
        F: FnMut(usize, f32, f32, &DynamicImage) -> IrmfResult<()>,
    {
        let n = self.num_z_slices();
        let delta = self.res_z / 1000.0;
        let min = self.model.min()[2];
        self.render_sweep(n, delta, min, material_num, order, f)
    }

    fn render_sweep<F>(
        &mut self,
        n: usize,
        delta: f32,
        min: f32,
        material_num: usize,
        order: Order,
        mut f: F,
    ) -> IrmfResult<()>
    where
        F: FnMut(usize, f32, f32, &DynamicImage) -> IrmfResult<()>,
    {
        let voxel_radius = 0.5 * delta;
        for k in 0..n {
            let slice = match order {
                Order::MinToMax => k,
                Order::MaxToMin => n - 1 - k,
            };
            let depth = min + voxel_radius + (slice as f32) * delta;
            let img = self.renderer.render(depth, material_num)?;
            f(k, depth, voxel_radius, &img)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn cube_model() -> IrmfModel {
        let data = b"/*{
  \"irmf\": \"1.0\",
  \"materials\": [\"PLA\"],
  \"max\": [1,1,1],
  \"min\": [-1,-1,-1],
  \"units\": \"mm\"
}*/
void mainModel4(out vec4 materials, in vec3 xyz) { materials[0] = 1.0; }";
        IrmfModel::new(data).unwrap()
    }

    #[test]
    fn test_slice_counts() {
        let slicer = Slicer::new(cube_model(), MockRenderer::new(), 500.0, 500.0, 1000.0);
        assert_eq!(slicer.num_x_slices(), 4);
        assert_eq!(slicer.num_y_slices(), 4);
        assert_eq!(slicer.num_z_slices(), 2);
    }

    #[test]
    fn test_num_y_slices_parity() {
        // 2mm cube at 400 microns has 5 slices per axis; the odd X count
        // bumps the Y count by one.
        let slicer = Slicer::new(cube_model(), MockRenderer::new(), 400.0, 400.0, 400.0);
        assert_eq!(slicer.num_x_slices(), 5);
        assert_eq!(slicer.num_y_slices(), 6);
        assert_eq!(slicer.num_z_slices(), 5);
    }

    #[test]
    fn test_full_field_slices_are_fully_set() {
        let renderer = MockRenderer::with_field(Box::new(|_, _| 1.0));
        let mut slicer = Slicer::new(cube_model(), renderer, 500.0, 500.0, 500.0);
        slicer.prepare_render_z().unwrap();

        let mut slices = 0;
        slicer
            .render_z_slices(1, Order::MinToMax, |_, _, _, img| {
                assert_eq!(img.dimensions(), (4, 4));
                for (_, _, p) in img.pixels() {
                    assert_ne!(p[0], 0);
                }
                slices += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(slices, 4);
    }

    #[test]
    fn test_sweep_order() {
        let renderer = MockRenderer::new();
        let mut slicer = Slicer::new(cube_model(), renderer, 500.0, 500.0, 500.0);
        slicer.prepare_render_z().unwrap();
        let delta = 0.5f32;

        let mut coords = Vec::new();
        slicer
            .render_z_slices(1, Order::MinToMax, |i, z, vr, _| {
                assert_eq!(vr, 0.25);
                coords.push((i, z));
                Ok(())
            })
            .unwrap();
        assert_eq!(coords.len(), 4);
        assert_eq!(coords[0], (0, -0.75));
        for w in coords.windows(2) {
            assert_eq!(w[1].0, w[0].0 + 1);
            assert!((w[1].1 - w[0].1 - delta).abs() < 1e-6);
        }

        let mut coords = Vec::new();
        slicer
            .render_z_slices(1, Order::MaxToMin, |i, z, _, _| {
                coords.push((i, z));
                Ok(())
            })
            .unwrap();
        assert_eq!(coords[0], (0, 0.75));
        for w in coords.windows(2) {
            assert_eq!(w[1].0, w[0].0 + 1);
            assert!((w[0].1 - w[1].1 - delta).abs() < 1e-6);
        }
    }

    #[test]
    fn test_sphere_slice_through_mock_field() {
        // A centered 1mm-radius sphere leaves the corner pixels of the
        // equatorial slice unset at 500 micron resolution.
        let renderer = MockRenderer::with_field(Box::new(|p, _| {
            if (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt() <= 1.0 {
                1.0
            } else {
                0.0
            }
        }));
        let mut slicer = Slicer::new(cube_model(), renderer, 500.0, 500.0, 500.0);
        slicer.prepare_render_z().unwrap();

        let img = slicer.render_z_slice(1, 1).unwrap(); // plane z = -0.25
        let on = img.pixels().filter(|(_, _, p)| p[0] != 0).count();
        assert_eq!(on, 12); // 4x4 grid minus the four corners
    }
}
