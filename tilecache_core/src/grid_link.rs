//! A tileset's binding to a grid (spec §3.2).

use crate::grid::{DEFAULT_LIMIT_TOLERANCE, Extent, Grid, TileLimits};
use anyhow::{Result, ensure};

/// Behaviour when a request falls between `max_cached_zoom` and `maxz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutOfZoomStrategy {
	#[default]
	NotConfigured,
	/// Reassemble the tile from the nearest cached zoom by up/downsampling.
	Reassemble,
	/// Proxy the request straight through to the source, bypassing the cache.
	Proxy,
}

#[derive(Debug, Clone)]
pub struct GridLink {
	pub grid_name: String,
	/// Inclusive lower zoom bound served by this tileset.
	pub minz: u8,
	/// Exclusive upper zoom bound, per spec §3.2 ("maxz (exclusive upper)").
	pub maxz: u8,
	pub max_cached_zoom: Option<u8>,
	pub out_of_zoom_strategy: OutOfZoomStrategy,
	/// One entry per grid level, precomputed by `GridLink::new`.
	pub grid_limits: Vec<TileLimits>,
}

impl GridLink {
	pub fn new(grid: &Grid, restriction: &Extent, minz: u8, maxz: u8) -> Result<Self> {
		ensure!(minz < maxz, "minz ({minz}) must be < maxz ({maxz})");
		ensure!(maxz as usize <= grid.nlevels(), "maxz ({maxz}) exceeds grid nlevels ({})", grid.nlevels());

		let grid_limits = grid.compute_limits(restriction, DEFAULT_LIMIT_TOLERANCE)?;

		Ok(GridLink {
			grid_name: grid.name.clone(),
			minz,
			maxz,
			max_cached_zoom: None,
			out_of_zoom_strategy: OutOfZoomStrategy::NotConfigured,
			grid_limits,
		})
	}

	pub fn with_max_cached_zoom(mut self, zoom: u8, strategy: OutOfZoomStrategy) -> Self {
		self.max_cached_zoom = Some(zoom);
		self.out_of_zoom_strategy = strategy;
		self
	}

	pub fn serves_zoom(&self, z: u8) -> bool {
		z >= self.minz && z < self.maxz
	}

	pub fn limits_for(&self, z: u8) -> Option<&TileLimits> {
		self.grid_limits.get(z as usize)
	}

	/// Snap every level's limit rectangle to a multiple of the seeder's metasize
	/// (spec §4.1: "the seeder further snaps each level's rectangle").
	pub fn snapped_limits(&self, metasize_x: u32, metasize_y: u32) -> Vec<TileLimits> {
		self
			.grid_limits
			.iter()
			.map(|l| l.snap_to_metasize(metasize_x, metasize_y))
			.collect()
	}

	/// Narrows this binding to a per-invocation rectangle and/or inclusive
	/// zoom range (spec §6.3's `extent=minx,miny,maxx,maxy` and
	/// `zoom=MIN,MAX`), without touching the tileset's own configured
	/// `minz`/`maxz`/`grid_limits`. `zoom_range` is inclusive on both ends;
	/// `extent` is intersected level-by-level against the existing
	/// `grid_limits`.
	pub fn restrict(&self, grid: &Grid, extent: Option<&Extent>, zoom_range: Option<(u8, u8)>) -> Result<GridLink> {
		let (minz, maxz) = match zoom_range {
			Some((lo, hi)) => {
				let exclusive_hi = hi.checked_add(1).ok_or_else(|| anyhow::anyhow!("zoom {hi} has no valid exclusive upper bound"))?;
				(self.minz.max(lo), self.maxz.min(exclusive_hi))
			}
			None => (self.minz, self.maxz),
		};
		ensure!(
			minz < maxz,
			"requested zoom range does not intersect the tileset's configured range ({}..{})",
			self.minz,
			self.maxz
		);

		let grid_limits = match extent {
			Some(restriction) => {
				let restricted = grid.compute_limits(restriction, DEFAULT_LIMIT_TOLERANCE)?;
				self.grid_limits.iter().zip(restricted.iter()).map(|(a, b)| a.intersect(b)).collect()
			}
			None => self.grid_limits.clone(),
		};

		Ok(GridLink {
			grid_name: self.grid_name.clone(),
			minz,
			maxz,
			max_cached_zoom: self.max_cached_zoom,
			out_of_zoom_strategy: self.out_of_zoom_strategy,
			grid_limits,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::grid::Grid;

	#[test]
	fn maxz_is_exclusive_and_validated() {
		let grid = Grid::wgs84();
		let full = Extent::new(-180.0, -90.0, 180.0, 90.0).unwrap();
		let link = GridLink::new(&grid, &full, 0, 5).unwrap();
		assert!(link.serves_zoom(0));
		assert!(link.serves_zoom(4));
		assert!(!link.serves_zoom(5));

		assert!(GridLink::new(&grid, &full, 5, 5).is_err());
	}

	#[test]
	fn grid_limits_has_one_entry_per_level_in_range() {
		let grid = Grid::wgs84();
		let full = Extent::new(-180.0, -90.0, 180.0, 90.0).unwrap();
		let link = GridLink::new(&grid, &full, 0, grid.nlevels() as u8).unwrap();
		assert_eq!(link.grid_limits.len(), grid.nlevels());
	}

	#[test]
	fn restrict_clamps_inclusive_zoom_range() {
		let grid = Grid::wgs84();
		let full = Extent::new(-180.0, -90.0, 180.0, 90.0).unwrap();
		let link = GridLink::new(&grid, &full, 0, 10).unwrap();
		let restricted = link.restrict(&grid, None, Some((2, 4))).unwrap();
		assert_eq!((restricted.minz, restricted.maxz), (2, 5));

		// requested range outside the tileset's configured range is an error
		assert!(link.restrict(&grid, None, Some((20, 21))).is_err());
	}

	#[test]
	fn restrict_intersects_extent_into_grid_limits() {
		let grid = Grid::wgs84();
		let full = Extent::new(-180.0, -90.0, 180.0, 90.0).unwrap();
		let link = GridLink::new(&grid, &full, 0, grid.nlevels() as u8).unwrap();
		let half = Extent::new(-180.0, -90.0, 0.0, 90.0).unwrap();
		let restricted = link.restrict(&grid, Some(&half), None).unwrap();
		for (full_limit, half_limit) in link.grid_limits.iter().zip(restricted.grid_limits.iter()) {
			assert!(half_limit.maxx - half_limit.minx <= full_limit.maxx - full_limit.minx);
		}
	}
}
