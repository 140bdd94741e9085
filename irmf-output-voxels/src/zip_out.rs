//! PNG-per-slice ZIP emitter.

use chrono::{Datelike, Local, Timelike};
use image::ImageFormat;
use irmf_slicer::{IrmfResult, Order, Renderer, Slicer};
use std::fs::File;
use std::io::Write;
use zip::write::FileOptions;

/// Slices the model along Z and writes one PNG per slice into a ZIP.
pub fn slice_to_zip<R: Renderer>(
    slicer: &mut Slicer<R>,
    material_num: usize,
    filename: &str,
) -> IrmfResult<()> {
    let file = File::create(filename).map_err(|e| anyhow::anyhow!("File::create: {e}"))?;
    let mut zip = zip::ZipWriter::new(file);

    println!("Rendering Z-slices for ZIP...");
    slicer
        .prepare_render_z()
        .map_err(|e| anyhow::anyhow!("prepare_render_z: {e}"))?;

    let now = Local::now();
    let dt = zip::DateTime::from_date_and_time(
        now.year() as u16,
        now.month() as u8,
        now.day() as u8,
        now.hour() as u8,
        now.minute() as u8,
        now.second() as u8,
    )
    .map_err(|_| anyhow::anyhow!("Invalid current local time for ZIP"))?;
    let options = FileOptions::<()>::default().last_modified_time(dt);

    slicer.render_z_slices(material_num, Order::MinToMax, |z_idx, _z, _radius, img| {
        let slice_name = format!("out{z_idx:04}.png");
        zip.start_file(slice_name, options.clone())
            .map_err(|e| anyhow::anyhow!("zip.start_file: {e}"))?;

        let mut buffer = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| anyhow::anyhow!("img.write_to: {e}"))?;
        zip.write_all(&buffer)
            .map_err(|e| anyhow::anyhow!("zip.write_all: {e}"))?;

        Ok(())
    })?;

    zip.finish().map_err(|e| anyhow::anyhow!("zip.finish: {e}"))?;
    Ok(())
}
