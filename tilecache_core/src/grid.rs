//! Grid geometry: a pyramid of zoom levels over a projected extent.
//!
//! See spec §3.1 / §4.1. Origins other than bottom-left are normalized
//! internally to BL for the tile<->extent math, then flipped on the way out.

use anyhow::{Result, bail, ensure};

/// Fractional tolerance used when computing level tile-index limits, so an
/// extent that lands exactly on a tile boundary does not pull in one extra
/// row/column of tiles.
pub const DEFAULT_LIMIT_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
	Meters,
	Degrees,
	Feet,
}

/// Which corner of the extent holds tile (0, 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
	BottomLeft,
	TopLeft,
	BottomRight,
	TopRight,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
	pub minx: f64,
	pub miny: f64,
	pub maxx: f64,
	pub maxy: f64,
}

impl Extent {
	pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Result<Self> {
		ensure!(maxx > minx, "extent maxx ({maxx}) must be > minx ({minx})");
		ensure!(maxy > miny, "extent maxy ({maxy}) must be > miny ({miny})");
		Ok(Self { minx, miny, maxx, maxy })
	}

	pub fn width(&self) -> f64 {
		self.maxx - self.minx
	}

	pub fn height(&self) -> f64 {
		self.maxy - self.miny
	}

	/// Intersection with another extent, or `None` if they don't overlap.
	pub fn intersect(&self, other: &Extent) -> Option<Extent> {
		let minx = self.minx.max(other.minx);
		let miny = self.miny.max(other.miny);
		let maxx = self.maxx.min(other.maxx);
		let maxy = self.maxy.min(other.maxy);
		if minx < maxx && miny < maxy {
			Some(Extent { minx, miny, maxx, maxy })
		} else {
			None
		}
	}

	pub fn expand(&self, by: f64) -> Extent {
		Extent {
			minx: self.minx - by,
			miny: self.miny - by,
			maxx: self.maxx + by,
			maxy: self.maxy + by,
		}
	}
}

/// One zoom level: grid-units-per-pixel plus tile-index bounds (BL-normalized).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
	pub resolution: f64,
	pub maxx: u32,
	pub maxy: u32,
}

/// A tile-index rectangle, half-open on (maxx, maxy): valid x ranges over
/// `minx..maxx`, y over `miny..maxy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLimits {
	pub minx: u32,
	pub miny: u32,
	pub maxx: u32,
	pub maxy: u32,
}

impl TileLimits {
	pub fn contains(&self, x: u32, y: u32) -> bool {
		x >= self.minx && x < self.maxx && y >= self.miny && y < self.maxy
	}

	pub fn is_empty(&self) -> bool {
		self.minx >= self.maxx || self.miny >= self.maxy
	}

	/// Snap outward to the next multiple of `metasize`, per spec §4.1: "after
	/// limits are computed the seeder further snaps each level's rectangle to
	/// a multiple of the tileset's metasize."
	pub fn snap_to_metasize(&self, metasize_x: u32, metasize_y: u32) -> TileLimits {
		let minx = (self.minx / metasize_x) * metasize_x;
		let miny = (self.miny / metasize_y) * metasize_y;
		let maxx = self.maxx.div_ceil(metasize_x) * metasize_x;
		let maxy = self.maxy.div_ceil(metasize_y) * metasize_y;
		TileLimits { minx, miny, maxx, maxy }
	}

	/// The tightest rectangle contained in both `self` and `other`. Empty
	/// (per `is_empty`) when the two don't overlap.
	pub fn intersect(&self, other: &TileLimits) -> TileLimits {
		TileLimits {
			minx: self.minx.max(other.minx),
			miny: self.miny.max(other.miny),
			maxx: self.maxx.min(other.maxx),
			maxy: self.maxy.min(other.maxy),
		}
	}
}

#[derive(Debug, Clone)]
pub struct Grid {
	pub name: String,
	pub srs: String,
	pub srs_aliases: Vec<String>,
	pub unit: Unit,
	pub extent: Extent,
	pub tile_sx: u32,
	pub tile_sy: u32,
	pub origin: Origin,
	pub levels: Vec<Level>,
}

impl Grid {
	/// Build a grid from an extent and one resolution per level, verifying
	/// the invariants from spec §3.1: `nlevels >= 1`, strictly decreasing
	/// resolution, and `maxx`/`maxy` consistent with the extent within
	/// `DEFAULT_LIMIT_TOLERANCE`.
	pub fn new(
		name: impl Into<String>,
		srs: impl Into<String>,
		unit: Unit,
		extent: Extent,
		tile_sx: u32,
		tile_sy: u32,
		origin: Origin,
		resolutions: Vec<f64>,
	) -> Result<Self> {
		ensure!(!resolutions.is_empty(), "grid must have at least one zoom level");
		ensure!(tile_sx > 0 && tile_sy > 0, "tile size must be > 0");
		for w in resolutions.windows(2) {
			ensure!(w[1] < w[0], "resolutions must strictly decrease with zoom: {w:?}");
		}

		let levels = resolutions
			.into_iter()
			.map(|resolution| {
				let maxx = compute_axis_limit(extent.width(), tile_sx, resolution);
				let maxy = compute_axis_limit(extent.height(), tile_sy, resolution);
				Level { resolution, maxx, maxy }
			})
			.collect();

		Ok(Grid {
			name: name.into(),
			srs: srs.into(),
			srs_aliases: Vec::new(),
			unit,
			extent,
			tile_sx,
			tile_sy,
			origin,
			levels,
		})
	}

	/// Well-known WGS84 grid: two tiles wide at z=0 (spec scenario S1).
	pub fn wgs84() -> Self {
		let extent = Extent::new(-180.0, -90.0, 180.0, 90.0).expect("static extent is valid");
		let base_res = 0.703_125;
		let resolutions = (0..22).map(|z| base_res / 2f64.powi(z)).collect();
		Grid::new("WGS84", "EPSG:4326", Unit::Degrees, extent, 256, 256, Origin::BottomLeft, resolutions)
			.expect("static grid is valid")
	}

	/// Well-known web mercator grid ("GoogleMapsCompatible" / "g").
	pub fn web_mercator() -> Self {
		let half = 20_037_508.342_789_244;
		let extent = Extent::new(-half, -half, half, half).expect("static extent is valid");
		let base_res = half * 2.0 / 256.0;
		let resolutions = (0..22).map(|z| base_res / 2f64.powi(z)).collect();
		Grid::new(
			"GoogleMapsCompatible",
			"EPSG:3857",
			Unit::Meters,
			extent,
			256,
			256,
			Origin::TopLeft,
			resolutions,
		)
		.expect("static grid is valid")
	}

	pub fn nlevels(&self) -> usize {
		self.levels.len()
	}

	fn level(&self, z: u8) -> Result<&Level> {
		self
			.levels
			.get(z as usize)
			.ok_or_else(|| anyhow::anyhow!("zoom {z} out of range (nlevels={})", self.nlevels()))
	}

	/// Tile -> extent, BL-normalized math, flipped to the grid's configured origin.
	pub fn tile_extent(&self, x: u32, y: u32, z: u8) -> Result<Extent> {
		let level = self.level(z)?;
		ensure!(x < level.maxx, "x {x} out of range (maxx={})", level.maxx);
		ensure!(y < level.maxy, "y {y} out of range (maxy={})", level.maxy);

		let (bl_x, bl_y) = self.to_bl_index(x, y, level);
		let tw = self.tile_sx as f64 * level.resolution;
		let th = self.tile_sy as f64 * level.resolution;
		let minx = self.extent.minx + bl_x as f64 * tw;
		let miny = self.extent.miny + bl_y as f64 * th;
		Ok(Extent {
			minx,
			miny,
			maxx: minx + tw,
			maxy: miny + th,
		})
	}

	/// Coordinate -> tile, in the grid's configured origin.
	pub fn locate(&self, coord_x: f64, coord_y: f64, z: u8) -> Result<(u32, u32)> {
		let level = self.level(z)?;
		ensure!(
			coord_x >= self.extent.minx && coord_x <= self.extent.maxx,
			"x {coord_x} outside grid extent"
		);
		ensure!(
			coord_y >= self.extent.miny && coord_y <= self.extent.maxy,
			"y {coord_y} outside grid extent"
		);

		let tw = self.tile_sx as f64 * level.resolution;
		let th = self.tile_sy as f64 * level.resolution;
		let bl_x = ((coord_x - self.extent.minx) / tw).floor() as u32;
		let bl_y = ((coord_y - self.extent.miny) / th).floor() as u32;
		let bl_x = bl_x.min(level.maxx - 1);
		let bl_y = bl_y.min(level.maxy - 1);
		Ok(self.from_bl_index(bl_x, bl_y, level))
	}

	fn to_bl_index(&self, x: u32, y: u32, level: &Level) -> (u32, u32) {
		match self.origin {
			Origin::BottomLeft => (x, y),
			Origin::TopLeft => (x, level.maxy - 1 - y),
			Origin::BottomRight => (level.maxx - 1 - x, y),
			Origin::TopRight => (level.maxx - 1 - x, level.maxy - 1 - y),
		}
	}

	fn from_bl_index(&self, bl_x: u32, bl_y: u32, level: &Level) -> (u32, u32) {
		// BL index is its own inverse under the same flip.
		self.to_bl_index(bl_x, bl_y, level)
	}

	/// Clip `restriction` to the grid and snap to tile boundaries, for every level.
	pub fn compute_limits(&self, restriction: &Extent, tolerance: f64) -> Result<Vec<TileLimits>> {
		ensure!(tolerance >= 0.0 && tolerance < 1.0, "tolerance must be in [0, 1)");
		let clipped = self
			.extent
			.intersect(restriction)
			.ok_or_else(|| anyhow::anyhow!("restriction extent does not overlap grid extent"))?;

		self
			.levels
			.iter()
			.map(|level| {
				let tw = self.tile_sx as f64 * level.resolution;
				let th = self.tile_sy as f64 * level.resolution;
				let eps_x = tw * tolerance;
				let eps_y = th * tolerance;

				let minx = ((clipped.minx - self.extent.minx + eps_x) / tw).floor().max(0.0) as u32;
				let miny = ((clipped.miny - self.extent.miny + eps_y) / th).floor().max(0.0) as u32;
				let maxx = (((clipped.maxx - self.extent.minx - eps_x) / tw).ceil() as u32).min(level.maxx);
				let maxy = (((clipped.maxy - self.extent.miny - eps_y) / th).ceil() as u32).min(level.maxy);

				Ok(TileLimits {
					minx,
					miny,
					maxx: maxx.max(minx),
					maxy: maxy.max(miny),
				})
			})
			.collect()
	}
}

fn compute_axis_limit(extent_len: f64, tile_size: u32, resolution: f64) -> u32 {
	let raw = extent_len / (tile_size as f64 * resolution);
	// 1% epsilon to suppress floating-point overshoot, per spec §3.1.
	(raw - 0.01).ceil().max(1.0) as u32
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tile_limits_intersect_shrinks_to_overlap() {
		let a = TileLimits { minx: 0, miny: 0, maxx: 10, maxy: 10 };
		let b = TileLimits { minx: 4, miny: 4, maxx: 20, maxy: 20 };
		let i = a.intersect(&b);
		assert_eq!(i, TileLimits { minx: 4, miny: 4, maxx: 10, maxy: 10 });
	}

	#[test]
	fn tile_limits_intersect_of_disjoint_rects_is_empty() {
		let a = TileLimits { minx: 0, miny: 0, maxx: 2, maxy: 2 };
		let b = TileLimits { minx: 5, miny: 5, maxx: 8, maxy: 8 };
		assert!(a.intersect(&b).is_empty());
	}

	#[test]
	fn wgs84_scenario_s1() {
		let grid = Grid::wgs84();
		assert_eq!(grid.levels[0].maxx, 2);
		assert_eq!(grid.levels[0].maxy, 1);
		let ext = grid.tile_extent(0, 0, 0).unwrap();
		assert!((ext.minx - -180.0).abs() < 1e-9);
		assert!((ext.miny - -90.0).abs() < 1e-9);
		assert!((ext.maxx - 0.0).abs() < 1e-6);
		assert!((ext.maxy - 90.0).abs() < 1e-6);
	}

	#[test]
	fn locate_roundtrips_tile_extent_center_invariant() {
		let grid = Grid::web_mercator();
		for z in 0..4u8 {
			let level = &grid.levels[z as usize];
			for x in 0..level.maxx {
				for y in 0..level.maxy {
					let ext = grid.tile_extent(x, y, z).unwrap();
					let cx = (ext.minx + ext.maxx) / 2.0;
					let cy = (ext.miny + ext.maxy) / 2.0;
					assert_eq!(grid.locate(cx, cy, z).unwrap(), (x, y), "z={z} x={x} y={y}");
				}
			}
		}
	}

	#[test]
	fn resolution_must_decrease() {
		let extent = Extent::new(0.0, 0.0, 100.0, 100.0).unwrap();
		let err = Grid::new("bad", "EPSG:0", Unit::Meters, extent, 256, 256, Origin::BottomLeft, vec![1.0, 2.0]);
		assert!(err.is_err());
	}

	#[test]
	fn compute_limits_clips_and_snaps_to_tile_boundary() {
		let grid = Grid::wgs84();
		let restriction = Extent::new(-10.0, -10.0, 10.0, 10.0).unwrap();
		let limits = grid.compute_limits(&restriction, DEFAULT_LIMIT_TOLERANCE).unwrap();
		// at z=0 the whole world is two tiles; a +/-10 degree box sits inside both
		assert!(!limits[0].is_empty());
		let snapped = limits[0].snap_to_metasize(2, 2);
		assert_eq!(snapped.minx % 2, 0);
		assert_eq!(snapped.miny % 2, 0);
	}

	#[test]
	fn origin_top_left_flips_y() {
		let grid = Grid::web_mercator(); // TopLeft origin
		let bl_grid_equivalent = {
			let mut g = grid.clone();
			g.origin = Origin::BottomLeft;
			g
		};
		let ext_tl = grid.tile_extent(0, 0, 2).unwrap();
		let ext_bl = bl_grid_equivalent.tile_extent(0, grid.levels[2].maxy - 1, 2).unwrap();
		assert!((ext_tl.minx - ext_bl.minx).abs() < 1e-6);
		assert!((ext_tl.miny - ext_bl.miny).abs() < 1e-6);
	}
}
