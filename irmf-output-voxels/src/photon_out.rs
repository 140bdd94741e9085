//! Streaming ChiTuBox `.cbddlp` / AnyCubic `.photon` encoder.
//!
//! The file is written in one forward pass: file header, preview and
//! thumbnail (RGB-5515 run-compressed), the layer header table with
//! preliminary offsets, then each layer's RLE payload. Once every layer's
//! size is known, the table is rewritten in place.

use image::RgbaImage;
use irmf_slicer::{IrmfResult, Order, Renderer, Slicer};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

const SCREEN_WIDTH: u32 = 0xa00;
const SCREEN_HEIGHT: u32 = 0x5a0;
const PREVIEW_WIDTH: u32 = 0x190;
const PREVIEW_HEIGHT: u32 = 0x12c;
const THUMBNAIL_WIDTH: u32 = 0xc8;
const THUMBNAIL_HEIGHT: u32 = 0x7d;

const FLAG_SET_PIXELS: u8 = 0x80;
const RUN_LIMIT: u8 = 0x7f - 2;
const BOTTOM_LAYERS: u32 = 8;
const NORMAL_EXPOSURE: f32 = 6.0;
const BOTTOM_EXPOSURE: f32 = 50.0;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct FileHeader {
    magic1: u32, // always 0x12FD0019
    magic2: u32, // always 0x01
    plate_x: f32,
    plate_y: f32,
    plate_z: f32,
    field_14: u32,
    field_18: u32,
    field_1c: u32,
    layer_thickness: f32,
    normal_exposure_time: f32,
    bottom_exposure_time: f32,
    off_time: f32,
    bottom_layers: u32,
    screen_height: u32,
    screen_width: u32,
    preview_header_offset: u32,
    layer_headers_offset: u32,
    total_layers: u32,
    preview_thumbnail_header_offset: u32,
    field_4c: u32,
    light_curing_type: u32,
    field_54: u32,
    field_58: u32,
    field_60: u32,
    field_5c: u32,
    field_64: u32,
    field_68: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct PreviewHeader {
    width: u32,
    height: u32,
    preview_data_offset: u32,
    preview_data_size: u32,
    field_10: u32,
    field_14: u32,
    field_18: u32,
    field_1c: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct LayerHeader {
    absolute_height: f32,
    exposure_time: f32,
    per_layer_off_time: f32,
    image_data_offset: u32,
    image_data_size: u32,
    field_14: u32,
    field_18: u32,
    field_1c: u32,
    field_20: u32,
}

/// Slices the model along Z and writes one `.cbddlp` file. `z_res` is the
/// layer pitch in microns.
pub fn slice_to_photon<R: Renderer>(
    slicer: &mut Slicer<R>,
    material_num: usize,
    filename: &str,
    z_res: f32,
) -> IrmfResult<()> {
    let file = File::create(filename).map_err(|e| anyhow::anyhow!("File::create: {e}"))?;
    let num_slices = slicer.num_z_slices();

    println!("Rendering Z-slices for Photon...");
    slicer
        .prepare_render_z()
        .map_err(|e| anyhow::anyhow!("prepare_render_z: {e}"))?;

    let mut encoder = DlpEncoder::new(file, num_slices, z_res);
    slicer.render_z_slices(material_num, Order::MinToMax, |n, _z, _vr, img| {
        encoder.process_slice(n, &img.to_rgba8())
    })?;
    encoder.finish()?;

    Ok(())
}

/// Streaming encoder; strict layer order is required since each layer's
/// offset is derived from its predecessor.
struct DlpEncoder {
    w: File,
    num_slices: usize,
    z_res: f32,

    layer_headers_offset: u64,
    layer_headers: Vec<LayerHeader>,
}

impl DlpEncoder {
    fn new(w: File, num_slices: usize, z_res: f32) -> Self {
        Self {
            w,
            num_slices,
            z_res,
            layer_headers_offset: 0,
            layer_headers: Vec::with_capacity(num_slices),
        }
    }

    fn process_slice(&mut self, n: usize, img: &RgbaImage) -> IrmfResult<()> {
        if n == 0 {
            self.write_header(img)
        } else {
            self.write_layer(n, img)
        }
    }

    /// Writes everything up to and including layer 0's payload. Offsets for
    /// layers 1.. are placeholders one byte apart; they are corrected as the
    /// sizes become known and rewritten by [`DlpEncoder::finish`].
    fn write_header(&mut self, img: &RgbaImage) -> IrmfResult<()> {
        let preview_data = encode_preview(PREVIEW_WIDTH, PREVIEW_HEIGHT, img);
        let thumbnail_data = encode_preview(THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT, img);

        let mut pos = std::mem::size_of::<FileHeader>();
        let preview_header_offset = pos;
        pos += std::mem::size_of::<PreviewHeader>();
        let preview_data_offset = pos;
        pos += preview_data.len();
        let thumbnail_header_offset = pos;
        pos += std::mem::size_of::<PreviewHeader>();
        let thumbnail_data_offset = pos;
        pos += thumbnail_data.len();

        self.layer_headers_offset = pos as u64;
        pos += self.num_slices * std::mem::size_of::<LayerHeader>();

        let layer0 = encode_layer(img);
        println!("layer 0 is {} bytes", layer0.len());

        let header = FileHeader {
            magic1: 0x12FD0019,
            magic2: 0x01,
            plate_x: 68.04,
            plate_y: 120.96,
            plate_z: 150.0,
            field_14: 0,
            field_18: 0,
            field_1c: 0,
            layer_thickness: self.z_res / 1000.0,
            normal_exposure_time: NORMAL_EXPOSURE,
            bottom_exposure_time: BOTTOM_EXPOSURE,
            off_time: 0.0,
            bottom_layers: BOTTOM_LAYERS,
            screen_height: SCREEN_HEIGHT,
            screen_width: SCREEN_WIDTH,
            preview_header_offset: preview_header_offset as u32,
            layer_headers_offset: self.layer_headers_offset as u32,
            total_layers: self.num_slices as u32,
            preview_thumbnail_header_offset: thumbnail_header_offset as u32,
            field_4c: 0,
            light_curing_type: 1,
            field_54: 0,
            field_58: 0,
            field_60: 0,
            field_5c: 0,
            field_64: 0,
            field_68: 0,
        };

        let preview_header = PreviewHeader {
            width: PREVIEW_WIDTH,
            height: PREVIEW_HEIGHT,
            preview_data_offset: preview_data_offset as u32,
            preview_data_size: preview_data.len() as u32,
            field_10: 0,
            field_14: 0,
            field_18: 0,
            field_1c: 0,
        };
        let thumbnail_header = PreviewHeader {
            width: THUMBNAIL_WIDTH,
            height: THUMBNAIL_HEIGHT,
            preview_data_offset: thumbnail_data_offset as u32,
            preview_data_size: thumbnail_data.len() as u32,
            field_10: 0,
            field_14: 0,
            field_18: 0,
            field_1c: 0,
        };

        for i in 0..self.num_slices {
            let exposure_time = if (i as u32) < BOTTOM_LAYERS {
                BOTTOM_EXPOSURE
            } else {
                NORMAL_EXPOSURE
            };
            self.layer_headers.push(LayerHeader {
                absolute_height: (i as f32) * self.z_res / 1000.0,
                exposure_time,
                per_layer_off_time: 0.0,
                image_data_offset: pos as u32, // corrected for i >= 1
                image_data_size: if i == 0 { layer0.len() as u32 } else { i as u32 },
                field_14: 0,
                field_18: 0,
                field_1c: 0,
                field_20: 0,
            });
            pos += if i == 0 { layer0.len() } else { 1 };
        }

        self.w.write_all(bytemuck::bytes_of(&header))?;
        self.w.write_all(bytemuck::bytes_of(&preview_header))?;
        self.w.write_all(&preview_data)?;
        self.w.write_all(bytemuck::bytes_of(&thumbnail_header))?;
        self.w.write_all(&thumbnail_data)?;
        for lh in &self.layer_headers {
            self.w.write_all(bytemuck::bytes_of(lh))?;
        }
        self.w.write_all(&layer0)?;

        Ok(())
    }

    fn write_layer(&mut self, n: usize, img: &RgbaImage) -> IrmfResult<()> {
        let layer = encode_layer(img);
        println!("layer {n} is {} bytes", layer.len());

        self.layer_headers[n].image_data_offset = self.layer_headers[n - 1].image_data_offset
            + self.layer_headers[n - 1].image_data_size;
        self.layer_headers[n].image_data_size = layer.len() as u32;

        self.w.write_all(&layer)?;
        Ok(())
    }

    /// Rewrites the layer header table in place with the final offsets.
    fn finish(mut self) -> IrmfResult<()> {
        self.w.seek(SeekFrom::Start(self.layer_headers_offset))?;
        for lh in &self.layer_headers {
            self.w.write_all(bytemuck::bytes_of(lh))?;
        }
        Ok(())
    }
}

/// Run-length encodes one layer bitmap, centered within the printer screen.
///
/// Pixels are visited column-major; each byte encodes one run, with set runs
/// carrying the high bit. Runs are capped at 125 pixels.
pub fn encode_layer(img: &RgbaImage) -> Vec<u8> {
    let mut output = Vec::new();

    let x_offset = if img.width() < SCREEN_WIDTH {
        (SCREEN_WIDTH - img.width()) / 2
    } else {
        0
    };
    let y_offset = if img.height() < SCREEN_HEIGHT {
        (SCREEN_HEIGHT - img.height()) / 2
    } else {
        0
    };

    let mut unset_count = 0u8;
    let mut set_count = 0u8;

    for pixel_index in 0..(SCREEN_WIDTH * SCREEN_HEIGHT) {
        let y = pixel_index % SCREEN_HEIGHT;
        let x = pixel_index / SCREEN_HEIGHT;

        let pixel_on = x >= x_offset
            && x < x_offset + img.width()
            && y >= y_offset
            && y < y_offset + img.height()
            && img.get_pixel(x - x_offset, y - y_offset)[0] != 0;

        if !pixel_on {
            if set_count != 0 {
                output.push(set_count | FLAG_SET_PIXELS);
                set_count = 0;
            }
            unset_count += 1;
            if unset_count >= RUN_LIMIT {
                output.push(unset_count);
                unset_count = 0;
            }
        } else {
            if unset_count != 0 {
                output.push(unset_count);
                unset_count = 0;
            }
            set_count += 1;
            if set_count >= RUN_LIMIT {
                output.push(set_count | FLAG_SET_PIXELS);
                set_count = 0;
            }
        }
    }

    if set_count != 0 {
        output.push(set_count | FLAG_SET_PIXELS);
    }
    if unset_count != 0 {
        output.push(unset_count);
    }

    output
}

/// RGB-5515 preview encoding with fill-bit run compression.
///
/// The source image is subsampled by nearest lookup; runs of three or more
/// identical pixels emit one fill-marked word plus a `0x3000 | (count - 1)`
/// continuation word, capped at 0xFFF pixels.
fn encode_preview(image_width: u32, image_height: u32, img: &RgbaImage) -> Vec<u8> {
    let mut output = Vec::new();
    let x_scale = (img.width() as f32) / (image_width as f32);
    let y_scale = (img.height() as f32) / (image_height as f32);

    let pixel_at = |pi: u32| {
        let x = pi % image_width;
        let y = pi / image_width;
        let nx = (x as f32 * x_scale) as u32;
        let ny = (y as f32 * y_scale) as u32;
        if nx < img.width() && ny < img.height() {
            *img.get_pixel(nx, ny)
        } else {
            image::Rgba([0, 0, 0, 0])
        }
    };

    let max_pixel_index = image_height * image_width;
    let mut pi = 0u32;
    while pi < max_pixel_index {
        let p = pixel_at(pi);

        let mut run = 1u32;
        while pi + run < max_pixel_index && run < 0xFFF && pixel_at(pi + run) == p {
            run += 1;
        }

        if run < 3 {
            let v = combine_rgb5515(p[0], p[1], p[2], false);
            output.extend_from_slice(&v.to_le_bytes());
            pi += 1;
        } else {
            let v = combine_rgb5515(p[0], p[1], p[2], true);
            output.extend_from_slice(&v.to_le_bytes());
            let skip = ((run as u16) - 1) | 0x3000;
            output.extend_from_slice(&skip.to_le_bytes());
            pi += run;
        }
    }
    output
}

/// Packs 8-bit RGB into the 5-5-1-5 wire format (red low, fill bit 5).
fn combine_rgb5515(r: u8, g: u8, b: u8, is_fill: bool) -> u16 {
    let scale = |c: u8| ((c as f32) * 31.0 / 255.0).round() as u16;
    let fill_bit = u16::from(is_fill);

    (scale(r) & 0x1F) | ((fill_bit & 0x1) << 5) | ((scale(g) & 0x1F) << 6) | ((scale(b) & 0x1F) << 11)
}
