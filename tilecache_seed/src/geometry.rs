//! Geometry filtering for seeding runs (spec §4.9.4): an `rstar` index of
//! input polygons, tested against each candidate tile's map-space bounding
//! box via `geo`'s intersection predicates.

use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::intersects::Intersects;
use geo::algorithm::relate::Relate;
use geo_types::{Polygon, Rect};
use rstar::{AABB, RTree, RTreeObject};
use tilecache_core::grid::Extent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStrategy {
	/// Tile bounding box intersects the geometry at all.
	Intersects,
	/// Intersects but is not limited to a shared boundary (DE-9IM `touches`).
	IntersectsNotTouching,
}

struct IndexedPolygon {
	polygon: Polygon<f64>,
}

impl RTreeObject for IndexedPolygon {
	type Envelope = AABB<[f64; 2]>;

	fn envelope(&self) -> Self::Envelope {
		let rect = self.polygon.bounding_rect().expect("polygon must have a bounding rect");
		AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
	}
}

/// Filters candidate tiles down to ones overlapping a set of input polygons.
pub struct GeometryFilter {
	tree: RTree<IndexedPolygon>,
	strategy: FilterStrategy,
}

impl GeometryFilter {
	pub fn new(polygons: Vec<Polygon<f64>>, strategy: FilterStrategy) -> Self {
		let tree = RTree::bulk_load(polygons.into_iter().map(|polygon| IndexedPolygon { polygon }).collect());
		GeometryFilter { tree, strategy }
	}

	/// Whether the tile occupying `tile_extent` in grid coordinates passes the filter.
	pub fn matches(&self, tile_extent: &Extent) -> bool {
		let rect = extent_to_rect(tile_extent);
		let envelope = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
		self.tree.locate_in_envelope_intersecting(&envelope).any(|candidate| self.candidate_matches(candidate, &rect))
	}

	fn candidate_matches(&self, candidate: &IndexedPolygon, rect: &Rect<f64>) -> bool {
		let tile_poly = rect.to_polygon();
		match self.strategy {
			FilterStrategy::Intersects => candidate.polygon.intersects(&tile_poly),
			FilterStrategy::IntersectsNotTouching => {
				let im = candidate.polygon.relate(&tile_poly);
				im.is_intersects() && !im.is_touches()
			}
		}
	}
}

fn extent_to_rect(extent: &Extent) -> Rect<f64> {
	Rect::new((extent.minx, extent.miny), (extent.maxx, extent.maxy))
}

#[cfg(test)]
mod tests {
	use super::*;
	use geo_types::polygon;

	fn unit_square() -> Polygon<f64> {
		polygon![
			(x: 0.0, y: 0.0),
			(x: 0.0, y: 10.0),
			(x: 10.0, y: 10.0),
			(x: 10.0, y: 0.0),
			(x: 0.0, y: 0.0),
		]
	}

	#[test]
	fn overlapping_tile_matches() {
		let filter = GeometryFilter::new(vec![unit_square()], FilterStrategy::Intersects);
		let tile_extent = Extent::new(5.0, 5.0, 15.0, 15.0).unwrap();
		assert!(filter.matches(&tile_extent));
	}

	#[test]
	fn disjoint_tile_does_not_match() {
		let filter = GeometryFilter::new(vec![unit_square()], FilterStrategy::Intersects);
		let tile_extent = Extent::new(100.0, 100.0, 110.0, 110.0).unwrap();
		assert!(!filter.matches(&tile_extent));
	}

	#[test]
	fn touching_only_tile_excluded_under_strict_strategy() {
		let filter = GeometryFilter::new(vec![unit_square()], FilterStrategy::IntersectsNotTouching);
		// Shares only the x=10 edge with the square.
		let tile_extent = Extent::new(10.0, 0.0, 20.0, 10.0).unwrap();
		assert!(!filter.matches(&tile_extent));
	}

	#[test]
	fn touching_only_tile_included_under_loose_strategy() {
		let filter = GeometryFilter::new(vec![unit_square()], FilterStrategy::Intersects);
		let tile_extent = Extent::new(10.0, 0.0, 20.0, 10.0).unwrap();
		assert!(filter.matches(&tile_extent));
	}
}
