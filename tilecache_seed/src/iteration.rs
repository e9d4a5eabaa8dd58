//! Iteration strategies over a tileset's metatile grid (spec §4.9.2).

use std::io::{BufRead, BufReader, Read};
use tilecache_core::grid::TileLimits;
use tilecache_core::grid_link::GridLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetatileAddress {
	pub x: u32,
	pub y: u32,
	pub z: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationMode {
	LevelByLevel,
	DrillDown,
}

impl IterationMode {
	/// Drill-down is the default for the well-known grids that are
	/// power-of-two quadtrees; every other grid defaults to level-by-level.
	pub fn default_for_grid(grid_name: &str) -> Self {
		match grid_name {
			"g" | "WGS84" | "GoogleMapsCompatible" => IterationMode::DrillDown,
			_ => IterationMode::LevelByLevel,
		}
	}
}

/// Iterates every metatile origin of every served level, level by level,
/// stepping `metasize_x`/`metasize_y` across each level's snapped rectangle.
pub struct LevelByLevelIter {
	levels: Vec<(u8, TileLimits)>,
	level_idx: usize,
	metasize_x: u32,
	metasize_y: u32,
	x: u32,
	y: u32,
	initialized: bool,
}

impl LevelByLevelIter {
	pub fn new(grid_link: &GridLink, metasize_x: u32, metasize_y: u32) -> Self {
		let snapped = grid_link.snapped_limits(metasize_x, metasize_y);
		let levels = (grid_link.minz..grid_link.maxz)
			.filter_map(|z| snapped.get(z as usize).filter(|l| !l.is_empty()).map(|l| (z, *l)))
			.collect();
		LevelByLevelIter {
			levels,
			level_idx: 0,
			metasize_x: metasize_x.max(1),
			metasize_y: metasize_y.max(1),
			x: 0,
			y: 0,
			initialized: false,
		}
	}
}

impl Iterator for LevelByLevelIter {
	type Item = MetatileAddress;

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			let &(z, limits) = self.levels.get(self.level_idx)?;
			if !self.initialized {
				self.x = limits.minx;
				self.y = limits.miny;
				self.initialized = true;
			}
			if self.y >= limits.maxy {
				self.level_idx += 1;
				self.initialized = false;
				continue;
			}
			let item = MetatileAddress { x: self.x, y: self.y, z };
			self.x += self.metasize_x;
			if self.x >= limits.maxx {
				self.x = limits.minx;
				self.y += self.metasize_y;
			}
			return Some(item);
		}
	}
}

/// Drill-down iteration: an explicit stack of `(x, y, z)` frames rather than
/// recursive calls, since each level's children fan out 4x. Valid only when
/// metasize is a power of two (checked by the caller via `GridLink`).
///
/// `next()` only pops; it never auto-expands. The driver calls
/// `push_children` after examining a yielded address to recurse into it, or
/// omits the call to prune the branch (the `STOP_RECURSION` command, spec
/// §4.9.3 — e.g. once past `max_cached_zoom` there is nothing left to seed).
pub struct DrillDownIter<'a> {
	grid_link: &'a GridLink,
	metasize_x: u32,
	metasize_y: u32,
	stack: Vec<MetatileAddress>,
}

impl<'a> DrillDownIter<'a> {
	pub fn new(grid_link: &'a GridLink, metasize_x: u32, metasize_y: u32) -> Self {
		let snapped = grid_link.snapped_limits(metasize_x, metasize_y);
		let metasize_x = metasize_x.max(1);
		let metasize_y = metasize_y.max(1);
		let mut stack = Vec::new();
		if let Some(limits) = snapped.get(grid_link.minz as usize) {
			if !limits.is_empty() {
				let mut y = limits.miny;
				while y < limits.maxy {
					let mut x = limits.minx;
					while x < limits.maxx {
						stack.push(MetatileAddress { x, y, z: grid_link.minz });
						x += metasize_x;
					}
					y += metasize_y;
				}
			}
		}
		stack.reverse();
		DrillDownIter {
			grid_link,
			metasize_x,
			metasize_y,
			stack,
		}
	}

	/// Push `item`'s four children (at `item.z + 1`) onto the stack, clipped
	/// to the grid's served zoom range and level limits.
	pub fn push_children(&mut self, item: MetatileAddress) {
		let child_z = item.z + 1;
		if !self.grid_link.serves_zoom(child_z) {
			return;
		}
		let Some(limits) = self.grid_link.grid_limits.get(child_z as usize) else {
			return;
		};
		let origins = [
			(2 * item.x, 2 * item.y),
			(2 * item.x + self.metasize_x, 2 * item.y),
			(2 * item.x, 2 * item.y + self.metasize_y),
			(2 * item.x + self.metasize_x, 2 * item.y + self.metasize_y),
		];
		for (cx, cy) in origins.into_iter().rev() {
			if limits.contains(cx, cy) {
				self.stack.push(MetatileAddress { x: cx, y: cy, z: child_z });
			}
		}
	}
}

impl<'a> Iterator for DrillDownIter<'a> {
	type Item = MetatileAddress;

	fn next(&mut self) -> Option<Self::Item> {
		self.stack.pop()
	}
}

/// Reads a failure log written by a previous run (`x,y,z` per line) for
/// `--retry-failed`, in place of generating fresh coordinates.
pub fn read_retry_log(reader: impl Read) -> anyhow::Result<Vec<MetatileAddress>> {
	let mut out = Vec::new();
	for line in BufReader::new(reader).lines() {
		let line = line?;
		let line = line.trim();
		if line.is_empty() {
			continue;
		}
		let mut parts = line.split(',');
		let x: u32 = parts.next().ok_or_else(|| anyhow::anyhow!("missing x in retry log line '{line}'"))?.trim().parse()?;
		let y: u32 = parts.next().ok_or_else(|| anyhow::anyhow!("missing y in retry log line '{line}'"))?.trim().parse()?;
		let z: u8 = parts.next().ok_or_else(|| anyhow::anyhow!("missing z in retry log line '{line}'"))?.trim().parse()?;
		out.push(MetatileAddress { x, y, z });
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tilecache_core::grid::Grid;

	fn link(minz: u8, maxz: u8) -> GridLink {
		let grid = Grid::web_mercator();
		let full = grid.tile_extent(0, 0, 0).unwrap();
		GridLink::new(&grid, &full, minz, maxz).unwrap()
	}

	#[test]
	fn level_by_level_covers_full_level_zero() {
		let link = link(0, 1);
		let addrs: Vec<_> = LevelByLevelIter::new(&link, 1, 1).collect();
		assert_eq!(addrs.len(), 1);
		assert_eq!(addrs[0], MetatileAddress { x: 0, y: 0, z: 0 });
	}

	#[test]
	fn drill_down_visits_parent_before_children_when_expanded() {
		let link = link(0, 2);
		let mut iter = DrillDownIter::new(&link, 1, 1);
		let mut addrs = Vec::new();
		while let Some(item) = iter.next() {
			addrs.push(item);
			iter.push_children(item);
		}
		assert_eq!(addrs[0], MetatileAddress { x: 0, y: 0, z: 0 });
		assert_eq!(addrs.len(), 1 + 4);
		assert!(addrs[1..].iter().all(|a| a.z == 1));
	}

	#[test]
	fn drill_down_prunes_when_children_not_pushed() {
		let link = link(0, 2);
		let mut iter = DrillDownIter::new(&link, 1, 1);
		let addrs: Vec<_> = std::iter::from_fn(|| iter.next()).collect();
		assert_eq!(addrs, vec![MetatileAddress { x: 0, y: 0, z: 0 }]);
	}

	#[test]
	fn default_grid_names_pick_drill_down() {
		assert_eq!(IterationMode::default_for_grid("GoogleMapsCompatible"), IterationMode::DrillDown);
		assert_eq!(IterationMode::default_for_grid("custom"), IterationMode::LevelByLevel);
	}

	#[test]
	fn retry_log_parses_lines() {
		let data = b"1,2,3\n4,5,6\n\n";
		let addrs = read_retry_log(&data[..]).unwrap();
		assert_eq!(addrs, vec![MetatileAddress { x: 1, y: 2, z: 3 }, MetatileAddress { x: 4, y: 5, z: 6 }]);
	}
}
