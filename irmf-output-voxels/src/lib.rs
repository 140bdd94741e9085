//! Voxel-grid outputs for IRMF slice stacks.

pub mod binvox_out;
pub mod photon_out;
pub mod svx_out;
pub mod zip_out;

use std::io::Write;

/// A 3-D occupancy bit grid in the legacy `binvox` layout.
pub struct BinVox {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub min_x: f64,
    pub min_y: f64,
    pub min_z: f64,
    pub scale: f64,
    pub data: Vec<u8>, // bitset
}

impl BinVox {
    /// Creates an empty grid. The binvox `scale` is the Z extent of the MBB.
    pub fn new(nx: usize, ny: usize, nz: usize, min: [f32; 3], max: [f32; 3]) -> Self {
        let size = (nx * ny * nz + 7) / 8;
        Self {
            nx,
            ny,
            nz,
            min_x: min[0] as f64,
            min_y: min[1] as f64,
            min_z: min[2] as f64,
            scale: (max[2] - min[2]) as f64,
            data: vec![0; size],
        }
    }

    pub fn set(&mut self, x: usize, y: usize, z: usize) {
        if x >= self.nx || y >= self.ny || z >= self.nz {
            return;
        }
        let index = z * self.nx * self.ny + y * self.nx + x;
        self.data[index / 8] |= 1 << (index % 8);
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> bool {
        if x >= self.nx || y >= self.ny || z >= self.nz {
            return false;
        }
        let index = z * self.nx * self.ny + y * self.nx + x;
        (self.data[index / 8] & (1 << (index % 8))) != 0
    }

    /// Number of set voxels.
    pub fn count(&self) -> usize {
        let mut total = 0;
        for z in 0..self.nz {
            for y in 0..self.ny {
                for x in 0..self.nx {
                    if self.get(x, y, z) {
                        total += 1;
                    }
                }
            }
        }
        total
    }

    /// Writes the grid in the legacy binvox layout: ASCII header followed by
    /// `(value, count)` run pairs with counts capped at 255.
    pub fn write_binvox<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "#binvox 1")?;
        writeln!(w, "dim {} {} {}", self.nx, self.ny, self.nz)?;
        writeln!(w, "translate {} {} {}", self.min_x, self.min_y, self.min_z)?;
        writeln!(w, "scale {}", self.scale)?;
        writeln!(w, "data")?;

        let mut current_value = self.get(0, 0, 0);
        let mut count = 0u8;

        for z in 0..self.nz {
            for y in 0..self.ny {
                for x in 0..self.nx {
                    let val = self.get(x, y, z);
                    if val == current_value && count < 255 {
                        count += 1;
                    } else {
                        w.write_all(&[current_value as u8, count])?;
                        current_value = val;
                        count = 1;
                    }
                }
            }
        }
        w.write_all(&[current_value as u8, count])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_bounds() {
        let mut b = BinVox::new(2, 2, 2, [0.0; 3], [1.0, 1.0, 1.0]);
        b.set(0, 0, 0);
        b.set(1, 1, 1);
        b.set(5, 0, 0); // out of bounds, ignored
        assert!(b.get(0, 0, 0));
        assert!(b.get(1, 1, 1));
        assert!(!b.get(1, 0, 0));
        assert!(!b.get(5, 0, 0));
        assert_eq!(b.count(), 2);
    }

    #[test]
    fn test_write_binvox_header_and_runs() {
        let mut b = BinVox::new(2, 1, 1, [1.0, 2.0, 3.0], [3.0, 4.0, 7.0]);
        b.set(1, 0, 0);

        let mut out = Vec::new();
        b.write_binvox(&mut out).unwrap();

        let header_end = out.windows(5).position(|w| w == b"data\n").unwrap() + 5;
        let header = std::str::from_utf8(&out[..header_end]).unwrap();
        assert!(header.starts_with("#binvox 1\n"));
        assert!(header.contains("dim 2 1 1\n"));
        assert!(header.contains("translate 1 2 3\n"));
        assert!(header.contains("scale 4\n"));

        // One unset voxel then one set voxel.
        assert_eq!(&out[header_end..], &[0, 1, 1, 1]);
    }

    #[test]
    fn test_write_binvox_run_cap() {
        let mut b = BinVox::new(300, 1, 1, [0.0; 3], [1.0, 1.0, 1.0]);
        for x in 0..300 {
            b.set(x, 0, 1); // out of range z, all voxels stay unset
        }
        let mut out = Vec::new();
        b.write_binvox(&mut out).unwrap();
        let header_end = out.windows(5).position(|w| w == b"data\n").unwrap() + 5;
        // 300 unset voxels split at the 255 run cap.
        assert_eq!(&out[header_end..], &[0, 255, 0, 45]);
    }
}
