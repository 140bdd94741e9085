//! Binvox occupancy-grid emitter.

use crate::BinVox;
use image::GenericImageView;
use irmf_slicer::{IrmfResult, Order, Renderer, Slicer};
use std::fs::File;
use std::io::BufWriter;

/// Slices the model along Z and dumps the occupancy grid as a binvox file.
pub fn slice_to_binvox<R: Renderer>(
    slicer: &mut Slicer<R>,
    material_num: usize,
    filename: &str,
) -> IrmfResult<()> {
    let (min, max) = slicer.mbb();
    let mut grid = BinVox::new(
        slicer.num_x_slices(),
        slicer.num_y_slices(),
        slicer.num_z_slices(),
        min,
        max,
    );

    println!("Rendering Z-slices for Binvox...");
    slicer
        .prepare_render_z()
        .map_err(|e| anyhow::anyhow!("prepare_render_z: {e}"))?;

    slicer.render_z_slices(material_num, Order::MinToMax, |z_idx, _z, _radius, img| {
        for y in 0..img.height() {
            for x in 0..img.width() {
                if img.get_pixel(x, y)[0] != 0 {
                    grid.set(x as usize, y as usize, z_idx);
                }
            }
        }
        Ok(())
    })?;

    println!("Writing Binvox file: {filename}");
    let file = File::create(filename).map_err(|e| anyhow::anyhow!("File::create: {e}"))?;
    let mut writer = BufWriter::new(file);
    grid.write_binvox(&mut writer)
        .map_err(|e| anyhow::anyhow!("write_binvox: {e}"))?;

    Ok(())
}
