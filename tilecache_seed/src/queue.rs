//! Bounded work queue and worker pool (spec §4.9.3, §5). Grounded on
//! `versatiles_core`'s `map_item_parallel`: an async task per item driven
//! through `futures::stream::buffer_unordered`, sized by
//! `tilecache_core::concurrency::ConcurrencyLimits` rather than raw OS threads.

use crate::command::{Command, WorkItem};
use crate::iteration::MetatileAddress;
use crate::logger::{Logger, Report};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tilecache_cache::{CacheBackend, GetOutcome};
use tilecache_core::dimension::DimensionSet;
use tilecache_core::grid::Grid;
use tilecache_core::grid_link::GridLink;
use tilecache_core::metatile::{Metatile, MetatileShape};
use tilecache_render::Renderer;

/// Everything a worker needs to carry out a single `WorkItem`, shared
/// read-only across the pool.
pub struct WorkerContext {
	pub renderer: Option<Arc<Renderer>>,
	pub cache: Arc<dyn CacheBackend>,
	pub dest_cache: Option<Arc<dyn CacheBackend>>,
	pub grid: Grid,
	pub grid_link: GridLink,
	pub shape: MetatileShape,
	pub tileset: String,
	pub dimensions: DimensionSet,
}

async fn execute(ctx: &WorkerContext, item: WorkItem) -> anyhow::Result<()> {
	match item.command {
		Command::Seed => {
			let renderer = ctx.renderer.as_ref().ok_or_else(|| anyhow::anyhow!("SEED requires a renderer"))?;
			renderer
				.ensure_metatile_cached(&ctx.grid, &ctx.shape, &ctx.tileset, &ctx.grid_link.grid_name, item.x, item.y, item.z, &ctx.dimensions)
				.await
		}
		Command::Delete => {
			let metatile = Metatile::containing(&ctx.grid, &ctx.shape, &ctx.tileset, &ctx.grid_link.grid_name, item.x, item.y, item.z)?;
			for mut tile in metatile.child_tiles() {
				tile.dimensions = ctx.dimensions.clone();
				ctx.cache.delete(&tile).await?;
				// A DELETE dispatched in transfer mode spans both caches (spec §4.9.5).
				if let Some(dest) = &ctx.dest_cache {
					dest.delete(&tile).await?;
				}
			}
			Ok(())
		}
		Command::Transfer => {
			let dest = ctx.dest_cache.as_ref().ok_or_else(|| anyhow::anyhow!("TRANSFER requires a destination cache"))?;
			let metatile = Metatile::containing(&ctx.grid, &ctx.shape, &ctx.tileset, &ctx.grid_link.grid_name, item.x, item.y, item.z)?;
			for mut tile in metatile.child_tiles() {
				tile.dimensions = ctx.dimensions.clone();
				if ctx.cache.get(&mut tile).await? == GetOutcome::Hit && !tile.nodata {
					dest.set(&tile).await?;
				}
			}
			Ok(())
		}
		Command::Skip | Command::Stop | Command::StopRecursion => Ok(()),
	}
}

/// Runs every `WorkItem` through the pool at the given concurrency, feeding
/// each result to `logger`. Stops early (without cancelling in-flight work)
/// once the logger's rolling failure ratio trips or `should_stop` returns
/// true, matching the seeder's first-SIGINT "drain the queue" semantics.
pub async fn run(
	items: Vec<WorkItem>,
	ctx: Arc<WorkerContext>,
	concurrency: usize,
	mut logger: Logger,
	mut should_stop: impl FnMut() -> bool,
) -> anyhow::Result<Report> {
	let mut stream = stream::iter(items).map(|item| {
		let ctx = Arc::clone(&ctx);
		async move {
			let result = execute(&ctx, item).await;
			(item, result)
		}
	}).buffer_unordered(concurrency.max(1));

	while let Some((item, result)) = stream.next().await {
		let addr = MetatileAddress { x: item.x, y: item.y, z: item.z };
		let abort = logger.record(addr, &result)?;
		if abort || should_stop() {
			break;
		}
	}

	Ok(logger.finish())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::logger::Logger;
	use tilecache_cache::memory::MemoryCache;
	use tilecache_core::grid::Extent;
	use tilecache_lock::MemoryLocker;
	use tilecache_render::{PngCodec, SolidSource};

	fn grid() -> Grid {
		Grid::new("g", "EPSG:3857", tilecache_core::grid::Unit::Meters, Extent::new(0.0, 0.0, 1024.0, 1024.0).unwrap(), 256, 256, tilecache_core::grid::Origin::BottomLeft, vec![1.0]).unwrap()
	}

	#[tokio::test]
	async fn seed_command_renders_and_caches() {
		let grid = grid();
		let full = grid.tile_extent(0, 0, 0).unwrap();
		let grid_link = GridLink::new(&grid, &full, 0, 1).unwrap();
		let cache = Arc::new(MemoryCache::new());
		let source = Arc::new(SolidSource::new([10, 20, 30, 255]));
		let renderer = Arc::new(Renderer::new(source, Arc::new(MemoryLocker::new()), cache.clone(), Arc::new(PngCodec)));
		let ctx = Arc::new(WorkerContext {
			renderer: Some(renderer),
			cache: cache.clone(),
			dest_cache: None,
			grid,
			grid_link,
			shape: MetatileShape { metasize_x: 1, metasize_y: 1, metabuffer: 0 },
			tileset: "ts".to_string(),
			dimensions: DimensionSet::empty(),
		});
		let items = vec![WorkItem::new(Command::Seed, 0, 0, 0)];
		let logger = Logger::new(1, 1, None);
		let report = run(items, ctx, 2, logger, || false).await.unwrap();
		assert_eq!(report.total_metatiles, 1);
		assert!(cache.exists(&tilecache_core::tile::Tile::new("ts", "g", 0, 0, 0)).await.unwrap());
	}
}
