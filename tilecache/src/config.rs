//! Minimal TOML configuration loader (spec §6.1, §6.3 `config=PATH`).
//!
//! Only covers what this binary can actually wire up end to end: a
//! well-known grid, and per-tileset cache/source selection. Real-world
//! source backends (WMS, vector pipelines, ...) are outside this crate's
//! scope; `source = "solid:r,g,b,a"` stands in as a deterministic demo
//! source, grounded on `versatiles_pipeline::DummyImageSource`.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tilecache_cache::{CacheBackend, FileCache, MemoryCache};
use tilecache_core::dimension::AssemblyType;
use tilecache_core::grid::Grid;
use tilecache_core::grid_link::GridLink;
use tilecache_lock::MemoryLocker;
use tilecache_render::{Configuration, PngCodec, SolidSource, Source, TilesetConfig};

#[derive(Debug, Deserialize)]
pub struct ConfigFile {
	pub grid: GridSpec,
	#[serde(default)]
	pub tileset: Vec<TilesetSpec>,
}

#[derive(Debug, Deserialize)]
pub struct GridSpec {
	pub name: String,
}

fn default_metasize() -> u32 {
	1
}

#[derive(Debug, Deserialize)]
pub struct TilesetSpec {
	pub name: String,
	pub cache: String,
	#[serde(default = "default_metasize")]
	pub metasize_x: u32,
	#[serde(default = "default_metasize")]
	pub metasize_y: u32,
	#[serde(default)]
	pub metabuffer: u32,
	#[serde(default)]
	pub read_only: bool,
	pub minz: u8,
	pub maxz: u8,
	#[serde(default = "default_source")]
	pub source: String,
}

fn default_source() -> String {
	"none".to_string()
}

fn well_known_grid(name: &str) -> anyhow::Result<Grid> {
	match name {
		"WGS84" => Ok(Grid::wgs84()),
		"GoogleMapsCompatible" | "g" => Ok(Grid::web_mercator()),
		other => anyhow::bail!("unknown well-known grid '{other}'; only WGS84 and GoogleMapsCompatible can be built from a config file"),
	}
}

fn build_cache(spec: &str, tileset_name: &str) -> anyhow::Result<Arc<dyn CacheBackend>> {
	if spec == "memory" {
		return Ok(Arc::new(MemoryCache::new()));
	}
	if let Some(path) = spec.strip_prefix("file:") {
		return Ok(Arc::new(FileCache::new(path)?));
	}
	anyhow::bail!("tileset '{tileset_name}': unrecognized cache spec '{spec}' (expected 'memory' or 'file:PATH')")
}

fn build_source(spec: &str, tileset_name: &str) -> anyhow::Result<Option<Arc<dyn Source>>> {
	if spec == "none" {
		return Ok(None);
	}
	if let Some(components) = spec.strip_prefix("solid:") {
		let parts: Vec<u8> = components
			.split(',')
			.map(|p| p.trim().parse().map_err(|_| anyhow::anyhow!("tileset '{tileset_name}': invalid solid source component '{p}'")))
			.collect::<anyhow::Result<_>>()?;
		anyhow::ensure!(parts.len() == 4, "tileset '{tileset_name}': solid source needs exactly 4 components r,g,b,a");
		return Ok(Some(Arc::new(SolidSource::new([parts[0], parts[1], parts[2], parts[3]]))));
	}
	anyhow::bail!("tileset '{tileset_name}': unrecognized source spec '{spec}' (expected 'none' or 'solid:r,g,b,a')")
}

/// Builds and finalizes a `Configuration` from a parsed config file.
pub fn build_configuration(file: ConfigFile) -> anyhow::Result<Arc<Configuration>> {
	let grid = well_known_grid(&file.grid.name)?;
	let mut config = Configuration::new(Arc::new(MemoryLocker::new()));
	config.add_grid(grid.clone())?;

	for spec in file.tileset {
		let cache = build_cache(&spec.cache, &spec.name)?;
		let source = build_source(&spec.source, &spec.name)?;
		let link = GridLink::new(&grid, &grid.extent, spec.minz, spec.maxz)?;
		let mut grid_links = HashMap::new();
		grid_links.insert(grid.name.clone(), link);

		config.add_tileset(TilesetConfig {
			name: spec.name,
			source,
			cache,
			codec: Arc::new(PngCodec),
			grid_links,
			metasize_x: spec.metasize_x,
			metasize_y: spec.metasize_y,
			metabuffer: spec.metabuffer,
			read_only: spec.read_only,
			dimensions: HashMap::new(),
			dimension_assembly_type: AssemblyType::None,
			store_dimension_assemblies: false,
			watermark: None,
		})?;
	}

	config.post_config()
}

pub fn load(path: &std::path::Path) -> anyhow::Result<Arc<Configuration>> {
	let text = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("reading config '{}': {e}", path.display()))?;
	let file: ConfigFile = toml::from_str(&text).map_err(|e| anyhow::anyhow!("parsing config '{}': {e}", path.display()))?;
	build_configuration(file)
}
