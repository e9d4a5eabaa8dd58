//! Lock-coalescing metatile render pipeline (spec §4.4, §4.10): the core
//! renderer orchestrates metatile expansion, locking, source invocation,
//! split, watermark, encode, and cache write.

use crate::source::Source;
use std::sync::Arc;
use tilecache_cache::CacheBackend;
use tilecache_core::dimension::DimensionSet;
use tilecache_core::grid::Grid;
use tilecache_core::metatile::{Metatile, MetatileShape};
use tilecache_core::tile::{ImageBuffer, MapRequest, Tile};
use tilecache_core::TileCodec;
use tilecache_lock::{LockOutcome, LockResult, Locker};

/// `metatile_lock_key(tileset, grid, z, mx, my, dim_fingerprint)` (spec
/// §4.4.2 step 1).
pub fn metatile_lock_key(tileset: &str, grid: &str, z: u8, mx: u32, my: u32, dim_fingerprint: &str) -> String {
	if dim_fingerprint.is_empty() {
		format!("{tileset}/{grid}/{z}/{mx}/{my}")
	} else {
		format!("{tileset}/{grid}/{z}/{mx}/{my}/{dim_fingerprint}")
	}
}

pub struct Renderer {
	pub source: Arc<dyn Source>,
	pub locker: Arc<dyn Locker>,
	pub cache: Arc<dyn CacheBackend>,
	pub codec: Arc<dyn TileCodec>,
	pub watermark: Option<ImageBuffer>,
}

impl Renderer {
	pub fn new(source: Arc<dyn Source>, locker: Arc<dyn Locker>, cache: Arc<dyn CacheBackend>, codec: Arc<dyn TileCodec>) -> Self {
		Renderer {
			source,
			locker,
			cache,
			codec,
			watermark: None,
		}
	}

	pub fn with_watermark(mut self, watermark: ImageBuffer) -> Self {
		self.watermark = Some(watermark);
		self
	}

	/// Render (or wait for a concurrent owner to render) the metatile
	/// containing `(x, y, z)`, writing every child tile to the cache.
	/// Returns once the metatile is guaranteed present in the cache (or
	/// propagates the owner's failure to every waiter).
	pub async fn ensure_metatile_cached(&self, grid: &Grid, shape: &MetatileShape, tileset: &str, grid_link: &str, x: u32, y: u32, z: u8, dimensions: &DimensionSet) -> anyhow::Result<()> {
		let metatile = Metatile::containing(grid, shape, tileset, grid_link, x, y, z)?;
		let dim_fingerprint = dimension_fingerprint(dimensions);
		let key = metatile_lock_key(tileset, grid_link, z, metatile.mx, metatile.my, &dim_fingerprint);

		match self.locker.lock_or_wait(&key).await? {
			LockOutcome::Acquired(handle) => match self.render_and_cache(grid, &metatile, dimensions).await {
				Ok(()) => {
					self.locker.unlock(handle).await?;
					Ok(())
				}
				Err(e) => {
					self.locker.unlock_with_failure(handle).await?;
					Err(e)
				}
			},
			LockOutcome::Waited(LockResult::Success) => Ok(()),
			LockOutcome::Waited(LockResult::Failure) => Err(anyhow::anyhow!("metatile owner failed to render {key}")),
		}
	}

	async fn render_and_cache(&self, grid: &Grid, metatile: &Metatile, dimensions: &DimensionSet) -> anyhow::Result<()> {
		let request = MapRequest {
			tileset: metatile.tileset.clone(),
			grid_name: metatile.grid_link.clone(),
			extent: metatile.map_extent,
			width: metatile.width,
			height: metatile.height,
			z: metatile.z,
			dimensions: dimensions.clone(),
		};
		let rendered = self.source.render_map(&request).await?;

		let mut tiles = Vec::with_capacity(metatile.children().len());
		for (x, y) in metatile.children() {
			let (px, py, w, h) = metatile.child_pixel_rect(x, y, grid);
			let mut child_image = extract_subimage(&rendered, px, py, w, h)?;
			if let Some(watermark) = &self.watermark {
				child_image = crate::merge::alpha_over(&child_image, watermark)?;
			}
			child_image.detect_blank();

			let mut tile = Tile::new(metatile.tileset.clone(), metatile.grid_link.clone(), x, y, metatile.z).with_dimensions(dimensions.clone());
			if child_image.blank_pixel().is_none() {
				let encoded = self.codec.encode(&child_image)?;
				tile.encoded_data = Some(Arc::new(encoded));
			}
			tile.raw_image = Some(child_image);
			tiles.push(tile);
		}

		self.cache.multi_set(&tiles).await
	}
}

fn dimension_fingerprint(dimensions: &DimensionSet) -> String {
	dimensions
		.entries
		.iter()
		.map(|e| format!("{}={}", e.dimension, e.cached_value.as_deref().unwrap_or(&e.requested_value)))
		.collect::<Vec<_>>()
		.join(",")
}

fn extract_subimage(source: &ImageBuffer, x: u32, y: u32, w: u32, h: u32) -> anyhow::Result<ImageBuffer> {
	let raw = source.raw_rgba.as_ref().ok_or_else(|| anyhow::anyhow!("rendered map has no raw_rgba buffer"))?;
	anyhow::ensure!(x + w <= source.width && y + h <= source.height, "sub-rectangle exceeds source bounds");

	let mut out = Vec::with_capacity((w * h * 4) as usize);
	for row in 0..h {
		let src_row = y + row;
		let start = ((src_row * source.width + x) * 4) as usize;
		let end = start + (w * 4) as usize;
		out.extend_from_slice(&raw[start..end]);
	}
	Ok(ImageBuffer::from_raw(w, h, out))
}
