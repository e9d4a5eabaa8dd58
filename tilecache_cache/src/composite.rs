//! Dispatch-by-predicate cache composition (spec §4.3.2).

use crate::traits::{CacheBackend, GetOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use tilecache_core::Tile;

#[derive(Debug, Clone, Default)]
pub struct CompositePredicate {
	pub zoom_range: Option<(u8, u8)>,
	pub grid_names: Option<Vec<String>>,
	/// Every named dimension's `cached_value` must equal the configured value.
	pub dimensions: HashMap<String, String>,
}

impl CompositePredicate {
	fn matches(&self, tile: &Tile) -> bool {
		if let Some((minz, maxz)) = self.zoom_range
			&& !(tile.z >= minz && tile.z < maxz)
		{
			return false;
		}
		if let Some(names) = &self.grid_names
			&& !names.contains(&tile.grid_link)
		{
			return false;
		}
		for (name, expected) in &self.dimensions {
			match tile.dimensions.get(name) {
				Some(entry) if entry.cached_value.as_deref() == Some(expected.as_str()) => {}
				_ => return false,
			}
		}
		true
	}
}

pub struct CompositeCache {
	links: Vec<(CompositePredicate, Box<dyn CacheBackend>)>,
}

impl Default for CompositeCache {
	fn default() -> Self {
		Self::new()
	}
}

impl CompositeCache {
	pub fn new() -> Self {
		CompositeCache { links: Vec::new() }
	}

	pub fn add(mut self, predicate: CompositePredicate, backend: Box<dyn CacheBackend>) -> Self {
		self.links.push((predicate, backend));
		self
	}

	fn resolve(&self, tile: &Tile) -> anyhow::Result<&dyn CacheBackend> {
		self
			.links
			.iter()
			.find(|(p, _)| p.matches(tile))
			.map(|(_, b)| b.as_ref())
			.ok_or_else(|| anyhow::anyhow!("no composite link matches tile z={} grid={}", tile.z, tile.grid_link))
	}
}

#[async_trait]
impl CacheBackend for CompositeCache {
	async fn exists(&self, tile: &Tile) -> anyhow::Result<bool> {
		self.resolve(tile)?.exists(tile).await
	}

	async fn get(&self, tile: &mut Tile) -> anyhow::Result<GetOutcome> {
		let reference = tile.clone();
		self.resolve(&reference)?.get(tile).await
	}

	async fn set(&self, tile: &Tile) -> anyhow::Result<()> {
		self.resolve(tile)?.set(tile).await
	}

	async fn delete(&self, tile: &Tile) -> anyhow::Result<()> {
		self.resolve(tile)?.delete(tile).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::MemoryCache;

	fn tile(z: u8) -> Tile {
		Tile::new("ts", "g", 0, 0, z)
	}

	#[tokio::test]
	async fn dispatches_by_zoom_range_first_match_wins() {
		let composite = CompositeCache::new()
			.add(
				CompositePredicate {
					zoom_range: Some((0, 5)),
					..Default::default()
				},
				Box::new(MemoryCache::new()),
			)
			.add(CompositePredicate::default(), Box::new(MemoryCache::new()));

		let mut t = tile(2);
		t.encoded_data = Some(std::sync::Arc::new(vec![1]));
		composite.set(&t).await.unwrap();
		assert!(composite.exists(&t).await.unwrap());
	}

	#[tokio::test]
	async fn no_match_fails() {
		let composite = CompositeCache::new().add(
			CompositePredicate {
				zoom_range: Some((0, 1)),
				..Default::default()
			},
			Box::new(MemoryCache::new()),
		);
		let t = tile(10);
		assert!(composite.exists(&t).await.is_err());
	}
}
