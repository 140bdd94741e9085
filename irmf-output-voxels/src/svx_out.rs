//! SVX (Simple Voxel) emitter: density slice PNGs plus a manifest.

use chrono::{Datelike, Local, Timelike};
use irmf_slicer::{IrmfResult, Order, Renderer, Slicer};
use std::fs::File;
use std::io::Write;
use zip::write::FileOptions;

/// Slices the model along Z and writes an SVX archive.
pub fn slice_to_svx<R: Renderer, P>(
    slicer: &mut Slicer<R>,
    material_num: usize,
    filename: &str,
    mut on_progress: Option<P>,
) -> IrmfResult<()>
where
    P: FnMut(usize, usize),
{
    let file = File::create(filename).map_err(|e| anyhow::anyhow!("File::create: {e}"))?;
    let mut zip = zip::ZipWriter::new(file);

    println!("Rendering Z-slices for SVX...");
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
    .map_err(|_| anyhow::anyhow!("Invalid current local time for SVX"))?;
    let options = FileOptions::<()>::default().last_modified_time(dt);

    let (min, max) = slicer.mbb();
    let num_z = slicer.num_z_slices();
    let voxel_size_mm = (max[2] - min[2]) / (num_z as f32);
    let manifest = manifest_xml(
        slicer.num_x_slices(),
        slicer.num_y_slices(),
        num_z,
        voxel_size_mm / 1000.0,
        &slicer.model.header.author,
        &slicer.model.header.date,
    );

    zip.start_file("manifest.xml", options.clone())
        .map_err(|e| anyhow::anyhow!("zip.start_file(manifest): {e}"))?;
    zip.write_all(manifest.as_bytes())?;

    let total_slices = num_z;
    slicer.render_z_slices(material_num, Order::MinToMax, |z_idx, _z, _radius, img| {
        if let Some(ref mut p) = on_progress {
            p(z_idx + 1, total_slices);
        }
        let slice_name = format!("density/slice{z_idx:04}.png");
        zip.start_file(slice_name, options.clone())
            .map_err(|e| anyhow::anyhow!("zip.start_file: {e}"))?;

        let mut buffer = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut buffer),
            image::ImageFormat::Png,
        )
        .map_err(|e| anyhow::anyhow!("img.write_to: {e}"))?;
        zip.write_all(&buffer)
            .map_err(|e| anyhow::anyhow!("zip.write_all: {e}"))?;

        Ok(())
    })?;

    zip.finish().map_err(|e| anyhow::anyhow!("zip.finish: {e}"))?;
    Ok(())
}

fn manifest_xml(
    nx: usize,
    ny: usize,
    nz: usize,
    voxel_size_m: f32,
    author: &str,
    date: &str,
) -> String {
    format!(
        r#"<?xml version="1.0"?>

<grid version="1.0" gridSizeX="{nx}" gridSizeY="{ny}" gridSizeZ="{nz}"
   voxelSize="{voxel_size_m}" subvoxelBits="8" slicesOrientation="Z" >

    <channels>
        <channel type="DENSITY" bits="8" slices="density/slice%04d.png" />
    </channels>

    <materials>
        <material id="1" urn="urn:shapeways:materials/1" />
    </materials>

    <metadata>
        <entry key="author" value="{author}" />
        <entry key="creationDate" value="{date}" />
    </metadata>
</grid>"#
    )
}
