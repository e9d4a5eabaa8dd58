//! Aggregate runtime configuration (spec §6.1): the maps of grids, sources,
//! caches, and tilesets the core expects, plus a `post_config` finalization
//! step after which the whole tree is immutable. Lives here rather than in
//! `tilecache_core` so it can hold trait objects (`Source`, `CacheBackend`,
//! `Locker`) defined in the crates that depend on the core leaf crate.

use crate::source::Source;
use std::collections::HashMap;
use std::sync::Arc;
use tilecache_cache::CacheBackend;
use tilecache_core::dimension::{AssemblyType, Dimension};
use tilecache_core::grid::Grid;
use tilecache_core::grid_link::GridLink;
use tilecache_core::tile::ImageBuffer;
use tilecache_core::TileCodec;
use tilecache_lock::Locker;

pub struct TilesetConfig {
	pub name: String,
	pub source: Option<Arc<dyn Source>>,
	pub cache: Arc<dyn CacheBackend>,
	pub codec: Arc<dyn TileCodec>,
	/// One binding per grid this tileset serves (spec §3.2).
	pub grid_links: HashMap<String, GridLink>,
	pub metasize_x: u32,
	pub metasize_y: u32,
	pub metabuffer: u32,
	pub read_only: bool,
	pub dimensions: HashMap<String, Arc<dyn Dimension>>,
	pub dimension_assembly_type: AssemblyType,
	pub store_dimension_assemblies: bool,
	pub watermark: Option<ImageBuffer>,
}

impl TilesetConfig {
	fn validate(&self, grids: &HashMap<String, Grid>) -> anyhow::Result<()> {
		anyhow::ensure!(self.metasize_x > 0 && self.metasize_y > 0, "tileset '{}': metasize must be > 0", self.name);
		if self.dimension_assembly_type.is_assembled() {
			anyhow::ensure!(self.metasize_x == 1 && self.metasize_y == 1, "tileset '{}': metatiling is forbidden under dimension assembly (spec §4.6)", self.name);
		}
		for grid_name in self.grid_links.keys() {
			anyhow::ensure!(grids.contains_key(grid_name), "tileset '{}' references unconfigured grid '{grid_name}'", self.name);
		}
		Ok(())
	}
}

pub struct Configuration {
	pub grids: HashMap<String, Grid>,
	pub tilesets: HashMap<String, TilesetConfig>,
	pub locker: Arc<dyn Locker>,
	finalized: bool,
}

impl Configuration {
	pub fn new(locker: Arc<dyn Locker>) -> Self {
		Configuration {
			grids: HashMap::new(),
			tilesets: HashMap::new(),
			locker,
			finalized: false,
		}
	}

	pub fn add_grid(&mut self, grid: Grid) -> anyhow::Result<()> {
		anyhow::ensure!(!self.finalized, "configuration is immutable after post_config");
		self.grids.insert(grid.name.clone(), grid);
		Ok(())
	}

	pub fn add_tileset(&mut self, tileset: TilesetConfig) -> anyhow::Result<()> {
		anyhow::ensure!(!self.finalized, "configuration is immutable after post_config");
		self.tilesets.insert(tileset.name.clone(), tileset);
		Ok(())
	}

	pub fn grid_link(&self, tileset: &str, grid_name: &str) -> anyhow::Result<&GridLink> {
		self
			.tilesets
			.get(tileset)
			.ok_or_else(|| anyhow::anyhow!("unconfigured tileset '{tileset}'"))?
			.grid_links
			.get(grid_name)
			.ok_or_else(|| anyhow::anyhow!("tileset '{tileset}' has no grid link for '{grid_name}'"))
	}

	/// Validate cross-references and freeze the configuration (spec §6.1:
	/// "Configuration is immutable after post_config returns").
	pub fn post_config(mut self) -> anyhow::Result<Arc<Self>> {
		for tileset in self.tilesets.values() {
			tileset.validate(&self.grids)?;
		}
		self.finalized = true;
		Ok(Arc::new(self))
	}
}
