//! Metatile expansion (spec §3.4, §4.4.1).

use crate::grid::{Extent, Grid};
use crate::tile::Tile;
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct MetatileShape {
	pub metasize_x: u32,
	pub metasize_y: u32,
	pub metabuffer: u32,
}

impl Default for MetatileShape {
	fn default() -> Self {
		MetatileShape {
			metasize_x: 1,
			metasize_y: 1,
			metabuffer: 0,
		}
	}
}

#[derive(Debug, Clone)]
pub struct Metatile {
	pub tileset: String,
	pub grid_link: String,
	pub z: u8,
	/// Origin tile of the metatile (bottom-left child in BL-normalized space).
	pub mx: u32,
	pub my: u32,
	pub shape: MetatileShape,
	pub map_extent: Extent,
	pub width: u32,
	pub height: u32,
}

impl Metatile {
	/// Compute the containing metatile for a requested tile (spec §4.4.1).
	pub fn containing(grid: &Grid, shape: &MetatileShape, tileset: &str, grid_link: &str, x: u32, y: u32, z: u8) -> Result<Self> {
		let mx = (x / shape.metasize_x) * shape.metasize_x;
		let my = (y / shape.metasize_y) * shape.metasize_y;

		let level = grid
			.levels
			.get(z as usize)
			.ok_or_else(|| anyhow::anyhow!("zoom {z} out of range"))?;

		let first = grid.tile_extent(mx, my, z)?;
		let last_x = (mx + shape.metasize_x - 1).min(level.maxx - 1);
		let last_y = (my + shape.metasize_y - 1).min(level.maxy - 1);
		let last = grid.tile_extent(last_x, last_y, z)?;

		let union = Extent {
			minx: first.minx.min(last.minx),
			miny: first.miny.min(last.miny),
			maxx: first.maxx.max(last.maxx),
			maxy: first.maxy.max(last.maxy),
		};

		let buffer_units = shape.metabuffer as f64 * level.resolution;
		let map_extent = union.expand(buffer_units);

		let width = shape.metasize_x * grid.tile_sx + 2 * shape.metabuffer;
		let height = shape.metasize_y * grid.tile_sy + 2 * shape.metabuffer;

		Ok(Metatile {
			tileset: tileset.to_string(),
			grid_link: grid_link.to_string(),
			z,
			mx,
			my,
			shape: shape.clone(),
			map_extent,
			width,
			height,
		})
	}

	/// The set of child tile addresses covered by this metatile.
	pub fn children(&self) -> Vec<(u32, u32)> {
		let mut out = Vec::with_capacity((self.shape.metasize_x * self.shape.metasize_y) as usize);
		for j in 0..self.shape.metasize_y {
			for i in 0..self.shape.metasize_x {
				out.push((self.mx + i, self.my + j));
			}
		}
		out
	}

	pub fn child_tiles(&self) -> Vec<Tile> {
		self
			.children()
			.into_iter()
			.map(|(x, y)| Tile::new(self.tileset.clone(), self.grid_link.clone(), x, y, self.z))
			.collect()
	}

	/// Per-child pixel sub-rectangle within the rendered metatile buffer,
	/// origin top-left of the pixel buffer regardless of grid origin (spec
	/// §4.4.1: "per-child pixel sub-rectangle is determined by the grid
	/// origin"). Children are always encoded row-major in increasing (x, y);
	/// for a TopLeft-origin grid pixel row 0 is the largest y, so we flip here.
	pub fn child_pixel_rect(&self, x: u32, y: u32, grid: &Grid) -> (u32, u32, u32, u32) {
		let col = x - self.mx;
		let row_from_my = y - self.my;
		let row = match grid.origin {
			crate::grid::Origin::TopLeft | crate::grid::Origin::TopRight => self.shape.metasize_y - 1 - row_from_my,
			crate::grid::Origin::BottomLeft | crate::grid::Origin::BottomRight => row_from_my,
		};
		let px = self.shape.metabuffer + col * grid.tile_sx;
		let py = self.shape.metabuffer + row * grid.tile_sy;
		(px, py, grid.tile_sx, grid.tile_sy)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::grid::Grid;

	#[test]
	fn containing_aligns_to_metasize() {
		let grid = Grid::web_mercator();
		let shape = MetatileShape {
			metasize_x: 2,
			metasize_y: 2,
			metabuffer: 0,
		};
		let m = Metatile::containing(&grid, &shape, "ts", "gl", 3, 5, 4).unwrap();
		assert_eq!((m.mx, m.my), (2, 4));
		assert_eq!(m.children().len(), 4);
	}

	#[test]
	fn width_height_include_buffer() {
		let grid = Grid::web_mercator();
		let shape = MetatileShape {
			metasize_x: 4,
			metasize_y: 4,
			metabuffer: 10,
		};
		let m = Metatile::containing(&grid, &shape, "ts", "gl", 0, 0, 4).unwrap();
		assert_eq!(m.width, 4 * 256 + 20);
		assert_eq!(m.height, 4 * 256 + 20);
	}

	#[test]
	fn child_pixel_rect_covers_grid_without_gaps() {
		let grid = Grid::web_mercator();
		let shape = MetatileShape {
			metasize_x: 2,
			metasize_y: 2,
			metabuffer: 0,
		};
		let m = Metatile::containing(&grid, &shape, "ts", "gl", 0, 0, 4).unwrap();
		let mut seen = std::collections::HashSet::new();
		for (x, y) in m.children() {
			let (px, py, w, h) = m.child_pixel_rect(x, y, &grid);
			assert_eq!(w, 256);
			assert_eq!(h, 256);
			seen.insert((px, py));
		}
		assert_eq!(seen.len(), 4);
	}
}
