//! Offscreen GPU renderer built on wgpu's GLSL (naga) front end.

use crate::irmf::{IrmfError, IrmfModel};
use crate::{shader, IrmfResult, Renderer};
use image::{DynamicImage, RgbaImage};
use std::borrow::Cow;
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Uniforms {
    projection: [[f32; 4]; 4],
    camera: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    u_slice: f32,
    u_material_num: i32,
    _padding: [f32; 2],
}

pub struct WgpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: Option<wgpu::RenderPipeline>,
    bind_group: Option<wgpu::BindGroup>,
    uniform_buffer: Option<wgpu::Buffer>,
    vertex_buffer: Option<wgpu::Buffer>,
    target_texture: Option<wgpu::Texture>,
    read_buffer: Option<wgpu::Buffer>,
    width: u32,
    height: u32,

    // Stored matrices for rendering
    projection: glam::Mat4,
    camera: glam::Mat4,
    model_matrix: glam::Mat4,
}

impl WgpuRenderer {
    pub async fn new() -> IrmfResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .ok_or(IrmfError::WgpuAdapterError)?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .map_err(IrmfError::WgpuDeviceError)?;

        Ok(Self {
            device,
            queue,
            pipeline: None,
            bind_group: None,
            uniform_buffer: None,
            vertex_buffer: None,
            target_texture: None,
            read_buffer: None,
            width: 0,
            height: 0,
            projection: glam::Mat4::IDENTITY,
            camera: glam::Mat4::IDENTITY,
            model_matrix: glam::Mat4::IDENTITY,
        })
    }

    fn glsl_module(&self, label: &str, source: String, stage: wgpu::naga::ShaderStage) -> wgpu::ShaderModule {
        self.device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Glsl {
                    shader: Cow::Owned(source),
                    stage,
                    defines: Default::default(),
                },
            })
    }
}

impl Renderer for WgpuRenderer {
    fn init(&mut self, width: u32, height: u32) -> IrmfResult<()> {
        self.width = width;
        self.height = height;

        let texture_extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Target Texture"),
            size: texture_extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let bytes_per_row = (width * 4 + 255) & !255;
        let output_buffer_size = (bytes_per_row * height) as wgpu::BufferAddress;
        let read_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Read Buffer"),
            size: output_buffer_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        self.target_texture = Some(texture);
        self.read_buffer = Some(read_buffer);

        Ok(())
    }

    fn prepare(
        &mut self,
        model: &IrmfModel,
        vertices: &[f32],
        projection: glam::Mat4,
        camera: glam::Mat4,
        model_matrix: glam::Mat4,
        vec3_str: &str,
    ) -> IrmfResult<()> {
        self.projection = projection;
        self.camera = camera;
        self.model_matrix = model_matrix;

        let num_materials = model.header.materials.len();

        // Invalid GLSL surfaces through the validation error scope below
        // rather than tearing down the device.
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vs = self.glsl_module(
            "Vertex Shader",
            shader::vertex_source(),
            wgpu::naga::ShaderStage::Vertex,
        );
        let fs = self.glsl_module(
            "Fragment Shader",
            shader::fragment_source(&model.shader, num_materials, vec3_str),
            wgpu::naga::ShaderStage::Fragment,
        );

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Vertex Buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let uniform_size = std::mem::size_of::<Uniforms>() as wgpu::BufferAddress;
        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Uniform Buffer"),
            size: uniform_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Bind Group Layout"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    }],
                });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Render Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vs,
                    entry_point: Some("main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: 3 * 4,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![0 => Float32x3],
                    }],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fs,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: wgpu::TextureFormat::Rgba8Unorm,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(IrmfError::ShaderError(err.to_string()).into());
        }

        self.pipeline = Some(pipeline);
        self.bind_group = Some(bind_group);
        self.uniform_buffer = Some(uniform_buffer);
        self.vertex_buffer = Some(vertex_buffer);

        Ok(())
    }

    fn render(&mut self, slice_depth: f32, material_num: usize) -> IrmfResult<DynamicImage> {
        let pipeline = self.pipeline.as_ref().ok_or("Pipeline not prepared")?;
        let bind_group = self.bind_group.as_ref().ok_or("Bind group not prepared")?;
        let uniform_buffer = self
            .uniform_buffer
            .as_ref()
            .ok_or("Uniform buffer not prepared")?;
        let vertex_buffer = self
            .vertex_buffer
            .as_ref()
            .ok_or("Vertex buffer not prepared")?;
        let target_texture = self
            .target_texture
            .as_ref()
            .ok_or("Target texture not initialized")?;
        let read_buffer = self
            .read_buffer
            .as_ref()
            .ok_or("Read buffer not initialized")?;

        let uniforms = Uniforms {
            projection: self.projection.to_cols_array_2d(),
            camera: self.camera.to_cols_array_2d(),
            model: self.model_matrix.to_cols_array_2d(),
            u_slice: slice_depth,
            u_material_num: material_num as i32,
            _padding: [0.0, 0.0],
        };
        self.queue
            .write_buffer(uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let render_target_view =
                target_texture.create_view(&wgpu::TextureViewDescriptor::default());
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &render_target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, bind_group, &[]);
            render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            render_pass.draw(0..6, 0..1);
        }

        let bytes_per_row = (self.width * 4 + 255) & !255;
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: target_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: read_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );

        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = read_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(IrmfError::RecvError)?
            .map_err(IrmfError::WgpuBufferError)?;

        let data = buffer_slice.get_mapped_range();
        let mut rgba = RgbaImage::new(self.width, self.height);
        // Texture row 0 is the top of the viewport; flip so that image row 0
        // lands on the minimum of the second in-plane axis.
        for (y, row) in data
            .chunks_exact(bytes_per_row as usize)
            .take(self.height as usize)
            .enumerate()
        {
            let v = self.height - 1 - y as u32;
            for (x, pixel) in row.chunks_exact(4).take(self.width as usize).enumerate() {
                rgba.put_pixel(
                    x as u32,
                    v,
                    image::Rgba([pixel[0], pixel[1], pixel[2], pixel[3]]),
                );
            }
        }
        drop(data);
        read_buffer.unmap();

        Ok(DynamicImage::ImageRgba8(rgba))
    }
}
