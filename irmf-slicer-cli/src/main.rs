//! irmf-slicer slices one or more IRMF shaders into voxel image slices at the
//! requested resolution, then writes the selected artifacts for each of the
//! model's materials.
//!
//! By default, irmf-slicer tests IRMF shader compilation only. To generate
//! output, at least one of the output flags must be supplied.
//!
//! See https://github.com/gmlewis/irmf for more information about IRMF.

use clap::Parser;
use indicatif::ProgressBar;
use std::path::PathBuf;

const DEFAULT_RES: f64 = 42.0;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Resolution in microns for X, Y, and Z (default is 42.0)
    #[arg(long)]
    res: Option<f64>,

    /// X resolution override in microns
    #[arg(long)]
    resx: Option<f64>,

    /// Y resolution override in microns
    #[arg(long)]
    resy: Option<f64>,

    /// Z resolution override in microns
    #[arg(long)]
    resz: Option<f64>,

    /// Rotate object around X axis - first (in degrees)
    #[arg(long, default_value_t = 0.0)]
    rotx: f64,

    /// Rotate object around Y axis - second (in degrees)
    #[arg(long, default_value_t = 0.0)]
    roty: f64,

    /// Rotate object around Z axis - third (in degrees)
    #[arg(long, default_value_t = 0.0)]
    rotz: f64,

    /// Render slicing to window
    #[arg(long)]
    view: bool,

    /// Write binvox files, one per material
    #[arg(long)]
    binvox: bool,

    /// Write ChiTuBox .cbddlp files (same as AnyCubic .photon), one per
    /// material (default resolution is X:47.25,Y:47.25,Z:50 microns)
    #[arg(long)]
    dlp: bool,

    /// Write stl files (reduced outlines), one per material
    #[arg(long)]
    stl: bool,

    /// Write boundary-voxel-face stl files, one per material
    #[arg(long)]
    stl_faces: bool,

    /// Write slices to svx voxel files, one per material
    #[arg(long)]
    svx: bool,

    /// Write slices to zip files, one per material (default resolution is
    /// X:65,Y:60,Z:30 microns)
    #[arg(long)]
    zip: bool,

    /// Input IRMF files
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

impl Args {
    fn wants_output(&self) -> bool {
        self.binvox || self.dlp || self.stl || self.stl_faces || self.svx || self.zip
    }

    fn resolutions(&self) -> (f32, f32, f32) {
        let (mut x, mut y, mut z) = match self.res {
            None if self.dlp => (47.25, 47.25, 50.0),
            None if self.zip => (65.0, 60.0, 30.0),
            None => (DEFAULT_RES, DEFAULT_RES, DEFAULT_RES),
            Some(r) => (r, r, r),
        };
        if let Some(r) = self.resx {
            x = r;
        }
        if let Some(r) = self.resy {
            y = r;
        }
        if let Some(r) = self.resz {
            z = r;
        }
        (x as f32, y as f32, z as f32)
    }
}

/// `<base>-mat<NN>-<material-name>.<ext>`, spaces in names replaced by `-`.
fn output_filename(base: &str, material_num: usize, material_name: &str, ext: &str) -> String {
    let name = material_name.replace(' ', "-");
    format!("{base}-mat{material_num:02}-{name}.{ext}")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if !args.wants_output() {
        println!("No output flags supplied. Testing IRMF shader compilation only.");
    }
    if args.view {
        println!("-view is not supported by the offscreen renderer; ignoring.");
    }

    let (x_res, y_res, z_res) = args.resolutions();
    println!("Resolution in microns: X: {x_res}, Y: {y_res}, Z: {z_res}");

    let (rot_x, rot_y, rot_z) = (
        (args.rotx * std::f64::consts::PI / 180.0) as f32,
        (args.roty * std::f64::consts::PI / 180.0) as f32,
        (args.rotz * std::f64::consts::PI / 180.0) as f32,
    );

    let mut exit_code = 0;

    for file_path in &args.files {
        if file_path.extension().and_then(|s| s.to_str()) != Some("irmf") {
            println!("Skipping non-IRMF file {file_path:?}");
            continue;
        }

        println!("Processing IRMF shader {file_path:?}...");
        let data = match tokio::fs::read(&file_path).await {
            Ok(d) => d,
            Err(e) => {
                eprintln!("Error reading {}: {e}", file_path.display());
                exit_code = 1;
                continue;
            }
        };

        let mut model = match irmf_slicer::IrmfModel::new(&data) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("{}: {e}", file_path.display());
                exit_code = 1;
                continue;
            }
        };

        model.shader = match irmf_include_resolver::resolve_includes(&model.shader).await {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error resolving includes in {}: {e}", file_path.display());
                exit_code = 1;
                continue;
            }
        };

        let base_name = file_path
            .with_extension("")
            .to_string_lossy()
            .into_owned();

        let renderer = match irmf_slicer::WgpuRenderer::new().await {
            Ok(r) => r,
            Err(e) => {
                eprintln!("Error creating WGPU renderer: {e}");
                exit_code = 1;
                break;
            }
        };
        let mut slicer = irmf_slicer::Slicer::new(model, renderer, x_res, y_res, z_res)
            .with_rotation(rot_x, rot_y, rot_z);

        if let Err(e) = slice_outputs(&args, &mut slicer, &base_name) {
            eprintln!("{}: {e}", file_path.display());
            exit_code = 1;
        }
    }

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    println!("Done.");
    Ok(())
}

fn slice_outputs<R: irmf_slicer::Renderer>(
    args: &Args,
    slicer: &mut irmf_slicer::Slicer<R>,
    base_name: &str,
) -> anyhow::Result<()> {
    let (_, _, z_res) = args.resolutions();

    for material_num in 1..=slicer.num_materials() {
        let material_name = slicer.material_name(material_num).to_string();

        if args.stl {
            let filename = output_filename(base_name, material_num, &material_name, "stl");
            irmf_output_stl::slice_to_stl_outline(slicer, material_num, &filename)
                .map_err(|e| anyhow::anyhow!("slice_to_stl_outline: {e}"))?;
        }

        if args.stl_faces {
            let filename = output_filename(base_name, material_num, &material_name, "stl");
            irmf_output_stl::slice_to_stl(slicer, material_num, &filename)
                .map_err(|e| anyhow::anyhow!("slice_to_stl: {e}"))?;
        }

        if args.binvox {
            let filename = output_filename(base_name, material_num, &material_name, "binvox");
            irmf_output_voxels::binvox_out::slice_to_binvox(slicer, material_num, &filename)
                .map_err(|e| anyhow::anyhow!("slice_to_binvox: {e}"))?;
        }

        if args.dlp {
            let filename = output_filename(base_name, material_num, &material_name, "cbddlp");
            irmf_output_voxels::photon_out::slice_to_photon(slicer, material_num, &filename, z_res)
                .map_err(|e| anyhow::anyhow!("slice_to_photon: {e}"))?;
        }

        if args.zip {
            let filename = output_filename(base_name, material_num, &material_name, "zip");
            irmf_output_voxels::zip_out::slice_to_zip(slicer, material_num, &filename)
                .map_err(|e| anyhow::anyhow!("slice_to_zip: {e}"))?;
        }

        if args.svx {
            let filename = output_filename(base_name, material_num, &material_name, "svx");
            let pb = ProgressBar::new(slicer.num_z_slices() as u64);
            irmf_output_voxels::svx_out::slice_to_svx(
                slicer,
                material_num,
                &filename,
                Some(|done: usize, _total: usize| pb.set_position(done as u64)),
            )
            .map_err(|e| anyhow::anyhow!("slice_to_svx: {e}"))?;
            pb.finish_and_clear();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_filename() {
        assert_eq!(
            output_filename("sphere", 1, "AISI 1018 steel", "stl"),
            "sphere-mat01-AISI-1018-steel.stl"
        );
        assert_eq!(
            output_filename("out/quadrants", 12, "PLA", "cbddlp"),
            "out/quadrants-mat12-PLA.cbddlp"
        );
    }

    #[test]
    fn test_default_resolutions() {
        let args = |argv: &[&str]| Args::parse_from(argv);

        let a = args(&["irmf-slicer", "x.irmf"]);
        assert_eq!(a.resolutions(), (42.0, 42.0, 42.0));

        let a = args(&["irmf-slicer", "--dlp", "x.irmf"]);
        assert_eq!(a.resolutions(), (47.25, 47.25, 50.0));

        let a = args(&["irmf-slicer", "--zip", "x.irmf"]);
        assert_eq!(a.resolutions(), (65.0, 60.0, 30.0));

        let a = args(&["irmf-slicer", "--dlp", "--res", "10", "x.irmf"]);
        assert_eq!(a.resolutions(), (10.0, 10.0, 10.0));

        let a = args(&["irmf-slicer", "--res", "10", "--resz", "20", "x.irmf"]);
        assert_eq!(a.resolutions(), (10.0, 10.0, 20.0));
    }
}
