//! CPU implementation of the IRMF renderer for testing.

use crate::irmf::IrmfModel;
use crate::{shader, IrmfResult, Renderer};
use image::{DynamicImage, RgbaImage};

/// Per-material presence field: `(position, material_num)` to a density in
/// `[0, 1]`. Stands in for the GLSL model function.
pub type FieldFn = Box<dyn Fn([f32; 3], usize) -> f32 + Send + Sync>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SliceAxis {
    X,
    Y,
    Z,
}

/// A renderer that evaluates a Rust closure instead of compiling the shader.
///
/// It honors the same slicing geometry as the GPU path: the orthographic
/// bounds are recovered from the projection matrix and each pixel center is
/// mapped to a world-space position on the slice plane. Row 0 corresponds to
/// the minimum of the second in-plane axis.
pub struct MockRenderer {
    pub width: u32,
    pub height: u32,
    field: FieldFn,
    axis: SliceAxis,
    left: f32,
    right: f32,
    bottom: f32,
    top: f32,
}

impl MockRenderer {
    /// Creates a renderer whose field is solid everywhere.
    pub fn new() -> Self {
        Self::with_field(Box::new(|_, _| 1.0))
    }

    /// Creates a renderer evaluating the given presence field.
    pub fn with_field(field: FieldFn) -> Self {
        Self {
            width: 0,
            height: 0,
            field,
            axis: SliceAxis::Z,
            left: -1.0,
            right: 1.0,
            bottom: -1.0,
            top: 1.0,
        }
    }
}

impl Default for MockRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for MockRenderer {
    fn init(&mut self, width: u32, height: u32) -> IrmfResult<()> {
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn prepare(
        &mut self,
        _model: &IrmfModel,
        _vertices: &[f32],
        projection: glam::Mat4,
        _camera: glam::Mat4,
        _model_matrix: glam::Mat4,
        vec3_str: &str,
    ) -> IrmfResult<()> {
        self.axis = match vec3_str {
            shader::VEC3_X => SliceAxis::X,
            shader::VEC3_Y => SliceAxis::Y,
            shader::VEC3_Z => SliceAxis::Z,
            other => return Err(format!("unrecognized pos construction: {other}").into()),
        };

        // The in-plane view axes coincide with the world axes for all three
        // cameras, so the ortho bounds fall out of the projection inverse.
        let inv = projection.inverse();
        let lo = inv.transform_point3(glam::vec3(-1.0, -1.0, 0.0));
        let hi = inv.transform_point3(glam::vec3(1.0, 1.0, 0.0));
        self.left = lo.x;
        self.bottom = lo.y;
        self.right = hi.x;
        self.top = hi.y;
        Ok(())
    }

    fn render(&mut self, slice_depth: f32, material_num: usize) -> IrmfResult<DynamicImage> {
        let mut img = RgbaImage::new(self.width, self.height);
        for v in 0..self.height {
            let wv = self.bottom
                + (v as f32 + 0.5) * (self.top - self.bottom) / (self.height as f32);
            for u in 0..self.width {
                let wu = self.left
                    + (u as f32 + 0.5) * (self.right - self.left) / (self.width as f32);
                let pos = match self.axis {
                    SliceAxis::Z => [wu, wv, slice_depth],
                    SliceAxis::Y => [wu, slice_depth, wv],
                    SliceAxis::X => [slice_depth, wu, wv],
                };
                let d = (self.field)(pos, material_num).clamp(0.0, 1.0);
                let b = (d * 255.0) as u8;
                img.put_pixel(u, v, image::Rgba([b, b, b, 255]));
            }
        }
        Ok(DynamicImage::ImageRgba8(img))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn model() -> IrmfModel {
        IrmfModel::new(
            b"/*{
  \"irmf\": \"1.0\",
  \"materials\": [\"a\", \"b\"],
  \"max\": [2,4,6],
  \"min\": [0,0,0],
  \"units\": \"mm\"
}*/
void mainModel4(out vec4 m, in vec3 p) {}",
        )
        .unwrap()
    }

    #[test]
    fn test_bounds_recovered_from_projection() {
        let mut r = MockRenderer::new();
        r.init(2, 4).unwrap();
        let projection = glam::Mat4::orthographic_rh(0.0, 2.0, 0.0, 4.0, 0.1, 100.0);
        r.prepare(
            &model(),
            &[],
            projection,
            glam::Mat4::IDENTITY,
            glam::Mat4::IDENTITY,
            shader::VEC3_Z,
        )
        .unwrap();
        assert!((r.left - 0.0).abs() < 1e-5);
        assert!((r.right - 2.0).abs() < 1e-5);
        assert!((r.bottom - 0.0).abs() < 1e-5);
        assert!((r.top - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_row_zero_is_min_of_second_axis() {
        let mut r = MockRenderer::with_field(Box::new(|p, _| if p[1] < 2.0 { 1.0 } else { 0.0 }));
        r.init(2, 4).unwrap();
        let projection = glam::Mat4::orthographic_rh(0.0, 2.0, 0.0, 4.0, 0.1, 100.0);
        r.prepare(
            &model(),
            &[],
            projection,
            glam::Mat4::IDENTITY,
            glam::Mat4::IDENTITY,
            shader::VEC3_Z,
        )
        .unwrap();
        let img = r.render(0.0, 1).unwrap();
        assert_ne!(img.get_pixel(0, 0)[0], 0); // y = 0.5
        assert_eq!(img.get_pixel(0, 3)[0], 0); // y = 3.5
    }

    #[test]
    fn test_material_routing() {
        let mut r = MockRenderer::with_field(Box::new(|_, m| if m == 2 { 1.0 } else { 0.0 }));
        r.init(1, 1).unwrap();
        let projection = glam::Mat4::orthographic_rh(0.0, 1.0, 0.0, 1.0, 0.1, 100.0);
        r.prepare(
            &model(),
            &[],
            projection,
            glam::Mat4::IDENTITY,
            glam::Mat4::IDENTITY,
            shader::VEC3_Z,
        )
        .unwrap();
        assert_eq!(r.render(0.0, 1).unwrap().get_pixel(0, 0)[0], 0);
        assert_eq!(r.render(0.0, 2).unwrap().get_pixel(0, 0)[0], 255);
    }
}
