//! Tile retrieval coordinator (spec §4.5) and dimension assembly (spec
//! §4.6): resolves cache/source fallback and, for assembled dimensions,
//! fetches/renders each constituent sub-tile independently before
//! compositing.

use crate::config::{Configuration, TilesetConfig};
use crate::merge;
use crate::overzoom;
use crate::renderer::Renderer;
use std::sync::Arc;
use tilecache_cache::GetOutcome;
use tilecache_core::dimension::AssemblyType;
use tilecache_core::error::CacheError;
use tilecache_core::grid::Grid;
use tilecache_core::grid_link::{GridLink, OutOfZoomStrategy};
use tilecache_core::metatile::MetatileShape;
use tilecache_core::tile::{ImageBuffer, MapRequest, Tile};

pub struct Coordinator {
	config: Arc<Configuration>,
}

impl Coordinator {
	pub fn new(config: Arc<Configuration>) -> Self {
		Coordinator { config }
	}

	pub async fn get_tile(&self, tileset_name: &str, grid_name: &str, tile: Tile) -> anyhow::Result<Tile> {
		let tileset = self
			.config
			.tilesets
			.get(tileset_name)
			.ok_or_else(|| CacheError::not_found(format!("unconfigured tileset '{tileset_name}'")))?;
		let grid = self
			.config
			.grids
			.get(grid_name)
			.ok_or_else(|| CacheError::not_found(format!("unconfigured grid '{grid_name}'")))?;
		let grid_link = self.config.grid_link(tileset_name, grid_name)?;
		if !grid_link.serves_zoom(tile.z) {
			return Err(CacheError::invalid_argument(format!("zoom {} not served by tileset '{tileset_name}'", tile.z)).into());
		}

		if tileset.dimension_assembly_type.is_assembled() && !tile.dimensions.is_empty() {
			self.get_assembled_tile(tileset_name, tileset, grid, grid_link, tile).await
		} else {
			self.fetch_single(tileset_name, tileset, grid, grid_link, tile).await
		}
	}

	/// §4.5 steps 2-4: resolve dimensions to exactly one cached value each,
	/// then either serve normally or, past `max_cached_zoom`, hand off to the
	/// tileset's out-of-zoom strategy (spec §3.2).
	async fn fetch_single(&self, tileset_name: &str, tileset: &TilesetConfig, grid: &Grid, grid_link: &GridLink, mut tile: Tile) -> anyhow::Result<Tile> {
		for entry in tile.dimensions.entries.iter_mut() {
			let dim = tileset
				.dimensions
				.get(&entry.dimension)
				.ok_or_else(|| CacheError::not_found(format!("tileset '{tileset_name}' has no dimension '{}'", entry.dimension)))?;
			match dim.resolve_single(&entry.requested_value)? {
				Some(value) => entry.cached_value = Some(value),
				None => return Err(CacheError::not_found(format!("dimension '{}' has no entry for '{}'", entry.dimension, entry.requested_value)).into()),
			}
		}

		if let Some(max_cached_zoom) = grid_link.max_cached_zoom
			&& tile.z > max_cached_zoom
		{
			return match grid_link.out_of_zoom_strategy {
				OutOfZoomStrategy::NotConfigured => {
					Err(CacheError::invalid_argument(format!("zoom {} exceeds tileset '{tileset_name}''s max cached zoom {max_cached_zoom}, and no out-of-zoom strategy is configured", tile.z)).into())
				}
				OutOfZoomStrategy::Proxy => self.fetch_proxied(tileset_name, tileset, grid, tile).await,
				OutOfZoomStrategy::Reassemble => self.fetch_reassembled(tileset_name, tileset, grid, grid_link, tile, max_cached_zoom).await,
			};
		}

		self.cache_or_render(tileset_name, tileset, grid, grid_link, tile).await
	}

	/// Cache lookup, falling back to metatile render-and-cache on miss (spec
	/// §4.5 steps 2-4's cached path: zooms at or below `max_cached_zoom`).
	async fn cache_or_render(&self, tileset_name: &str, tileset: &TilesetConfig, grid: &Grid, grid_link: &GridLink, mut tile: Tile) -> anyhow::Result<Tile> {
		if tileset.cache.get(&mut tile).await? == GetOutcome::Hit {
			return Ok(tile);
		}

		if tileset.read_only || tileset.source.is_none() {
			tile.nodata = true;
			return Ok(tile);
		}

		let renderer = Renderer {
			source: tileset.source.clone().expect("checked above"),
			locker: self.config.locker.clone(),
			cache: tileset.cache.clone(),
			codec: tileset.codec.clone(),
			watermark: tileset.watermark.clone(),
		};
		let shape = MetatileShape {
			metasize_x: tileset.metasize_x,
			metasize_y: tileset.metasize_y,
			metabuffer: tileset.metabuffer,
		};
		renderer
			.ensure_metatile_cached(grid, &shape, tileset_name, &grid_link.grid_name, tile.x, tile.y, tile.z, &tile.dimensions)
			.await?;

		if tileset.cache.get(&mut tile).await? == GetOutcome::Hit {
			Ok(tile)
		} else {
			tile.nodata = true;
			Ok(tile)
		}
	}

	/// `PROXY`: render straight from the source for this one tile, bypassing
	/// the cache entirely on both read and write.
	async fn fetch_proxied(&self, tileset_name: &str, tileset: &TilesetConfig, grid: &Grid, mut tile: Tile) -> anyhow::Result<Tile> {
		let source = tileset
			.source
			.clone()
			.ok_or_else(|| CacheError::not_found(format!("tileset '{tileset_name}' has no source configured, cannot proxy")))?;
		let extent = grid.tile_extent(tile.x, tile.y, tile.z)?;
		let request = MapRequest {
			tileset: tileset_name.to_string(),
			grid_name: tile.grid_link.clone(),
			extent,
			width: grid.tile_sx,
			height: grid.tile_sy,
			z: tile.z,
			dimensions: tile.dimensions.clone(),
		};
		let image = source.render_map(&request).await?;
		let encoded = tileset.codec.encode(&image)?;
		tile.encoded_data = Some(Arc::new(encoded));
		tile.raw_image = Some(image);
		Ok(tile)
	}

	/// `REASSEMBLE`: serve from the nearest cached ancestor tile at
	/// `max_cached_zoom`, cropped to this tile's footprint and
	/// nearest-neighbor upsampled back to full resolution.
	async fn fetch_reassembled(&self, tileset_name: &str, tileset: &TilesetConfig, grid: &Grid, grid_link: &GridLink, tile: Tile, max_cached_zoom: u8) -> anyhow::Result<Tile> {
		let (ax, ay, az) = overzoom::ancestor_at(tile.x, tile.y, tile.z, max_cached_zoom);
		let ancestor_tile = Tile::new(tileset_name, tile.grid_link.clone(), ax, ay, az).with_dimensions(tile.dimensions.clone());
		let ancestor = self.cache_or_render(tileset_name, tileset, grid, grid_link, ancestor_tile).await?;
		anyhow::ensure!(!ancestor.nodata, "cannot reassemble zoom {} from a nodata ancestor tile", tile.z);

		let image: ImageBuffer = match &ancestor.raw_image {
			Some(img) if img.raw_rgba.is_some() => img.clone(),
			_ => tileset.codec.decode(ancestor.encoded_data.as_ref().ok_or_else(|| anyhow::anyhow!("ancestor tile has neither raw_image nor encoded_data"))?)?,
		};

		let (offset_x, offset_y, scale) = overzoom::offset_within_ancestor(tile.x, tile.y, tile.z, az);
		let upsampled = overzoom::crop_and_upsample(&image, offset_x, offset_y, scale, grid.tile_sx, grid.tile_sy)?;
		let encoded = tileset.codec.encode(&upsampled)?;

		let mut out = tile;
		out.raw_image = Some(upsampled);
		out.encoded_data = Some(Arc::new(encoded));
		out.mtime = ancestor.mtime;
		out.expires = ancestor.expires;
		Ok(out)
	}

	/// §4.6: composite the constituent sub-values of the assembled dimension.
	async fn get_assembled_tile(&self, tileset_name: &str, tileset: &TilesetConfig, grid: &Grid, grid_link: &GridLink, tile: Tile) -> anyhow::Result<Tile> {
		let assembly_entry_idx = tile
			.dimensions
			.entries
			.iter()
			.position(|e| tileset.dimensions.get(&e.dimension).map(|d| d.assembly_type().is_assembled()).unwrap_or(false))
			.ok_or_else(|| CacheError::internal(format!("tileset '{tileset_name}' is configured for assembly but no dimension entry requests one")))?;

		let assembly_dimension = tile.dimensions.entries[assembly_entry_idx].dimension.clone();
		let requested_value = tile.dimensions.entries[assembly_entry_idx].requested_value.clone();
		let dim = tileset.dimensions.get(&assembly_dimension).expect("looked up above");
		let sub_values = dim.get_entries_for_value(&requested_value)?;
		if sub_values.is_empty() {
			return Err(CacheError::not_found(format!("dimension '{assembly_dimension}' has no entries for '{requested_value}'")).into());
		}

		let mut sub_tiles = Vec::with_capacity(sub_values.len());
		for value in &sub_values {
			let mut sub_tile = tile.clone();
			// fetch_single re-resolves dimensions, so the sub-value stands in as its own requested value.
			sub_tile.dimensions.entries[assembly_entry_idx].requested_value = value.clone();
			sub_tile.dimensions.entries[assembly_entry_idx].cached_value = Some(value.clone());
			sub_tiles.push(self.fetch_single(tileset_name, tileset, grid, grid_link, sub_tile).await?);
		}

		let assembled = match dim.assembly_type() {
			AssemblyType::Stack => self.composite_stack(tileset, &tile, sub_tiles)?,
			AssemblyType::Animate => self.composite_animate(&tile, sub_tiles)?,
			AssemblyType::None => unreachable!("checked is_assembled above"),
		};

		if tileset.store_dimension_assemblies {
			let mut stored = assembled.clone();
			stored.dimensions.entries[assembly_entry_idx].cached_value = Some(requested_value);
			tileset.cache.set(&stored).await?;
		}
		Ok(assembled)
	}

	fn composite_stack(&self, tileset: &TilesetConfig, template: &Tile, sub_tiles: Vec<Tile>) -> anyhow::Result<Tile> {
		let mut images = Vec::with_capacity(sub_tiles.len());
		let mut mtimes = Vec::with_capacity(sub_tiles.len());
		let mut expires = Vec::with_capacity(sub_tiles.len());
		for t in &sub_tiles {
			anyhow::ensure!(!t.nodata, "cannot stack-assemble a nodata sub-tile");
			let image = match &t.raw_image {
				Some(img) if img.raw_rgba.is_some() => img.clone(),
				_ => tileset.codec.decode(t.encoded_data.as_ref().ok_or_else(|| anyhow::anyhow!("sub-tile has neither raw_image nor encoded_data"))?)?,
			};
			images.push(image);
			mtimes.push(t.mtime);
			expires.push(t.expires.clone());
		}

		let mut composed = images.first().cloned().ok_or_else(|| anyhow::anyhow!("stack assembly requires at least one sub-tile"))?;
		for overlay in &images[1..] {
			composed = merge::alpha_over(&composed, overlay)?;
		}

		let encoded = tileset.codec.encode(&composed)?;
		let mut out = Tile::new(template.tileset.clone(), template.grid_link.clone(), template.x, template.y, template.z).with_dimensions(template.dimensions.clone());
		out.raw_image = Some(composed);
		out.encoded_data = Some(Arc::new(encoded));
		let (mtime, exp) = merge::merge_metadata(&mtimes, &expires);
		out.mtime = mtime;
		out.expires = exp;
		Ok(out)
	}

	/// `ANIMATE` frames are stored as a length-prefixed sequence of
	/// independently-encoded frames: a minimal, opaque-enough container
	/// since the animation writer itself is outside this system's scope
	/// (spec §1 non-goal: image codec internals).
	fn composite_animate(&self, template: &Tile, sub_tiles: Vec<Tile>) -> anyhow::Result<Tile> {
		let mut mtimes = Vec::with_capacity(sub_tiles.len());
		let mut expires = Vec::with_capacity(sub_tiles.len());
		let mut container = Vec::new();
		container.extend_from_slice(&(sub_tiles.len() as u32).to_be_bytes());
		for t in &sub_tiles {
			anyhow::ensure!(!t.nodata, "cannot animate-assemble a nodata sub-tile");
			let frame = t.encoded_data.as_ref().ok_or_else(|| anyhow::anyhow!("animate assembly requires encoded sub-tile frames"))?;
			container.extend_from_slice(&(frame.len() as u32).to_be_bytes());
			container.extend_from_slice(frame);
			mtimes.push(t.mtime);
			expires.push(t.expires.clone());
		}

		let mut out = Tile::new(template.tileset.clone(), template.grid_link.clone(), template.x, template.y, template.z).with_dimensions(template.dimensions.clone());
		out.encoded_data = Some(Arc::new(container));
		let (mtime, exp) = merge::merge_metadata(&mtimes, &expires);
		out.mtime = mtime;
		out.expires = exp;
		Ok(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::image_codec::PngCodec;
	use crate::source::Source;
	use async_trait::async_trait;
	use std::collections::HashMap;
	use tilecache_cache::memory::MemoryCache;
	use tilecache_core::dimension::{Dimension, DimensionRequest, DimensionSet};
	use tilecache_core::grid::{Extent, Origin};
	use tilecache_core::tile::FeatureInfoRequest;
	use tilecache_core::FeatureInfoResult;
	use tilecache_lock::MemoryLocker;

	fn grid() -> Grid {
		Grid::new("g", "EPSG:0", tilecache_core::Unit::Meters, Extent::new(0.0, 0.0, 1024.0, 1024.0).unwrap(), 256, 256, Origin::BottomLeft, vec![1.0]).unwrap()
	}

	fn multi_zoom_grid() -> Grid {
		Grid::new("g", "EPSG:0", tilecache_core::Unit::Meters, Extent::new(0.0, 0.0, 1024.0, 1024.0).unwrap(), 256, 256, Origin::BottomLeft, vec![4.0, 2.0, 1.0]).unwrap()
	}

	fn config_with_grid_link(grid_link: GridLink) -> (Arc<Configuration>, Arc<SolidSource>) {
		let mut config = Configuration::new(Arc::new(MemoryLocker::new()));
		let g = multi_zoom_grid();
		config.add_grid(g.clone()).unwrap();
		let mut links = HashMap::new();
		links.insert("g".to_string(), grid_link);
		let source = Arc::new(SolidSource(std::sync::Mutex::new(0)));
		config
			.add_tileset(TilesetConfig {
				name: "ts".into(),
				source: Some(source.clone()),
				cache: Arc::new(MemoryCache::new()),
				codec: Arc::new(PngCodec),
				grid_links: links,
				metasize_x: 1,
				metasize_y: 1,
				metabuffer: 0,
				read_only: false,
				dimensions: HashMap::new(),
				dimension_assembly_type: AssemblyType::None,
				store_dimension_assemblies: false,
				watermark: None,
			})
			.unwrap();
		(config.post_config().unwrap(), source)
	}

	struct SolidSource(std::sync::Mutex<u32>);
	#[async_trait]
	impl Source for SolidSource {
		async fn render_map(&self, request: &MapRequest) -> anyhow::Result<ImageBuffer> {
			*self.0.lock().unwrap() += 1;
			Ok(ImageBuffer::from_raw(request.width, request.height, vec![9, 9, 9, 255].repeat((request.width * request.height) as usize)))
		}
		async fn query_info(&self, _request: &FeatureInfoRequest) -> anyhow::Result<FeatureInfoResult> {
			unimplemented!()
		}
	}

	fn base_config(assembly: AssemblyType, dims: HashMap<String, Arc<dyn Dimension>>) -> (Arc<Configuration>, Arc<SolidSource>) {
		let mut config = Configuration::new(Arc::new(MemoryLocker::new()));
		let g = grid();
		config.add_grid(g.clone()).unwrap();
		let link = GridLink::new(&g, &g.extent, 0, 1).unwrap();
		let mut links = HashMap::new();
		links.insert("g".to_string(), link);
		let source = Arc::new(SolidSource(std::sync::Mutex::new(0)));
		config
			.add_tileset(TilesetConfig {
				name: "ts".into(),
				source: Some(source.clone()),
				cache: Arc::new(MemoryCache::new()),
				codec: Arc::new(PngCodec),
				grid_links: links,
				metasize_x: if assembly.is_assembled() { 1 } else { 2 },
				metasize_y: if assembly.is_assembled() { 1 } else { 2 },
				metabuffer: 0,
				read_only: false,
				dimensions: dims,
				dimension_assembly_type: assembly,
				store_dimension_assemblies: false,
				watermark: None,
			})
			.unwrap();
		(config.post_config().unwrap(), source)
	}

	#[tokio::test]
	async fn miss_renders_and_second_request_hits_cache() {
		let (config, source) = base_config(AssemblyType::None, HashMap::new());
		let coordinator = Coordinator::new(config);

		let tile = Tile::new("ts", "g", 0, 0, 0);
		let result = coordinator.get_tile("ts", "g", tile).await.unwrap();
		assert!(!result.nodata);
		assert!(result.encoded_data.is_some());
		assert_eq!(*source.0.lock().unwrap(), 1);

		let tile = Tile::new("ts", "g", 0, 0, 0);
		coordinator.get_tile("ts", "g", tile).await.unwrap();
		assert_eq!(*source.0.lock().unwrap(), 1, "second request should hit the cache, not re-render");
	}

	#[tokio::test]
	async fn unresolvable_dimension_is_not_found() {
		struct EmptyDimension;
		impl Dimension for EmptyDimension {
			fn name(&self) -> &str {
				"style"
			}
			fn resolve_single(&self, _requested_value: &str) -> anyhow::Result<Option<String>> {
				Ok(None)
			}
			fn get_entries_for_value(&self, _requested_value: &str) -> anyhow::Result<Vec<String>> {
				Ok(vec![])
			}
		}
		let mut dims: HashMap<String, Arc<dyn Dimension>> = HashMap::new();
		dims.insert("style".into(), Arc::new(EmptyDimension));
		let (config, _source) = base_config(AssemblyType::None, dims);
		let coordinator = Coordinator::new(config);

		let mut tile = Tile::new("ts", "g", 0, 0, 0);
		tile.dimensions = DimensionSet {
			entries: vec![DimensionRequest::new("style", "unknown")],
		};
		assert!(coordinator.get_tile("ts", "g", tile).await.is_err());
	}

	struct SplitDimension;
	impl Dimension for SplitDimension {
		fn name(&self) -> &str {
			"layers"
		}
		fn resolve_single(&self, requested_value: &str) -> anyhow::Result<Option<String>> {
			Ok(Some(requested_value.to_string()))
		}
		fn get_entries_for_value(&self, requested_value: &str) -> anyhow::Result<Vec<String>> {
			Ok(requested_value.split('+').map(str::to_string).collect())
		}
		fn assembly_type(&self) -> AssemblyType {
			AssemblyType::Stack
		}
	}

	#[tokio::test]
	async fn stack_assembly_composites_sub_tiles() {
		let mut dims: HashMap<String, Arc<dyn Dimension>> = HashMap::new();
		dims.insert("layers".into(), Arc::new(SplitDimension));
		let (config, _source) = base_config(AssemblyType::Stack, dims);
		let coordinator = Coordinator::new(config);

		let mut tile = Tile::new("ts", "g", 0, 0, 0);
		tile.dimensions = DimensionSet {
			entries: vec![DimensionRequest::new("layers", "base+roads")],
		};
		let result = coordinator.get_tile("ts", "g", tile).await.unwrap();
		assert!(!result.nodata);
		assert!(result.raw_image.is_some());
	}

	#[tokio::test]
	async fn zoom_past_max_cached_with_no_strategy_is_rejected() {
		let g = multi_zoom_grid();
		let link = GridLink::new(&g, &g.extent, 0, 3).unwrap().with_max_cached_zoom(1, OutOfZoomStrategy::NotConfigured);
		let (config, _source) = config_with_grid_link(link);
		let coordinator = Coordinator::new(config);

		assert!(coordinator.get_tile("ts", "g", Tile::new("ts", "g", 0, 0, 2)).await.is_err());
	}

	#[tokio::test]
	async fn proxy_strategy_bypasses_the_cache() {
		let g = multi_zoom_grid();
		let link = GridLink::new(&g, &g.extent, 0, 3).unwrap().with_max_cached_zoom(1, OutOfZoomStrategy::Proxy);
		let (config, source) = config_with_grid_link(link);
		let coordinator = Coordinator::new(config);

		let tile = Tile::new("ts", "g", 0, 0, 2);
		let result = coordinator.get_tile("ts", "g", tile).await.unwrap();
		assert!(!result.nodata);
		assert!(result.encoded_data.is_some());
		assert_eq!(*source.0.lock().unwrap(), 1);

		let tileset = coordinator.config.tilesets.get("ts").unwrap();
		assert!(!tileset.cache.exists(&Tile::new("ts", "g", 0, 0, 2)).await.unwrap(), "PROXY must never write the requested tile into the cache");
	}

	#[tokio::test]
	async fn reassemble_strategy_crops_the_cached_ancestor() {
		let g = multi_zoom_grid();
		let link = GridLink::new(&g, &g.extent, 0, 3).unwrap().with_max_cached_zoom(1, OutOfZoomStrategy::Reassemble);
		let (config, source) = config_with_grid_link(link);
		let coordinator = Coordinator::new(config);

		let tile = Tile::new("ts", "g", 0, 0, 2);
		let result = coordinator.get_tile("ts", "g", tile).await.unwrap();
		assert!(!result.nodata);
		assert_eq!(result.raw_image.unwrap().width, 256);
		// Rendering the ancestor at max_cached_zoom should be the only source call.
		assert_eq!(*source.0.lock().unwrap(), 1);

		let tileset = coordinator.config.tilesets.get("ts").unwrap();
		assert!(tileset.cache.exists(&Tile::new("ts", "g", 0, 0, 1)).await.unwrap(), "the ancestor tile should be cached");
		assert!(!tileset.cache.exists(&Tile::new("ts", "g", 0, 0, 2)).await.unwrap(), "REASSEMBLE must not cache the derived tile");
	}
}
