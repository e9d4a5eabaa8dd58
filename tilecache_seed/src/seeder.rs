//! Ties iteration, geometry filtering, the examine-tile decision table, and
//! the worker pool into one seeding run (spec §4.9).

use crate::command::WorkItem;
use crate::examine::{ExamineContext, SeedMode, examine_tile};
use crate::geometry::GeometryFilter;
use crate::iteration::{DrillDownIter, IterationMode, LevelByLevelIter, MetatileAddress};
use crate::logger::{Logger, Report};
use crate::queue::{self, WorkerContext};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use tilecache_core::dimension::{DimensionRequest, DimensionSet};
use tilecache_core::grid::Extent;
use tilecache_core::grid_link::GridLink;
use tilecache_core::metatile::{Metatile, MetatileShape};
use tilecache_core::tile::Tile;
use tilecache_render::{Configuration, Renderer, TilesetConfig};

pub struct SeedPlan {
	pub tileset: String,
	pub grid_name: String,
	pub mode: SeedMode,
	/// Name of the destination tileset; required when `mode` is `Transfer`.
	pub dest_tileset: Option<String>,
	/// `None` picks `IterationMode::default_for_grid`.
	pub iteration_mode: Option<IterationMode>,
	pub age_limit: Option<SystemTime>,
	pub force: bool,
	pub concurrency: usize,
	pub abort_ratio: f64,
	pub geometry_filter: Option<GeometryFilter>,
	/// `--metasize=X,Y`: overrides the tileset's configured metatile shape
	/// for this run (the buffer stays the tileset's, since it only affects
	/// rendering, not the seeding granularity).
	pub metasize_override: Option<(u32, u32)>,
	/// `--extent=minx,miny,maxx,maxy`: restricts the run to this rectangle,
	/// intersected with the tileset's configured grid limits.
	pub extent: Option<Extent>,
	/// `--zoom=MIN,MAX`: an inclusive zoom range, clamped to the tileset's
	/// configured `minz..maxz`.
	pub zoom_range: Option<(u8, u8)>,
	/// `--dimension=NAME=VALUE` pairs, may repeat; each name must be
	/// configured on the tileset.
	pub dimensions: Vec<(String, String)>,
	/// Set by `--retry-failed`, bypassing fresh iteration entirely.
	pub retry_addresses: Option<Vec<MetatileAddress>>,
	pub failure_log: Option<Box<dyn Write + Send>>,
}

/// Resolves CLI `--dimension NAME=VALUE` pairs against the tileset's
/// configured dimensions into a single cache-keyable `DimensionSet`.
fn resolve_dimensions(tileset: &TilesetConfig, requests: &[(String, String)]) -> anyhow::Result<DimensionSet> {
	let mut set = DimensionSet::empty();
	for (name, requested_value) in requests {
		let dimension = tileset
			.dimensions
			.get(name)
			.ok_or_else(|| anyhow::anyhow!("tileset '{}' has no dimension '{name}' configured", tileset.name))?;
		let cached_value = dimension
			.resolve_single(requested_value)?
			.ok_or_else(|| anyhow::anyhow!("dimension '{name}' has no value for '{requested_value}'"))?;
		set.entries.push(DimensionRequest::resolved(name.clone(), requested_value.clone(), cached_value));
	}
	Ok(set)
}

/// Runs a full seed/delete/transfer pass and returns the final report.
pub async fn run_seed(config: Arc<Configuration>, plan: SeedPlan) -> anyhow::Result<Report> {
	let tileset = config
		.tilesets
		.get(&plan.tileset)
		.ok_or_else(|| anyhow::anyhow!("unconfigured tileset '{}'", plan.tileset))?;
	let grid = config
		.grids
		.get(&plan.grid_name)
		.ok_or_else(|| anyhow::anyhow!("unconfigured grid '{}'", plan.grid_name))?
		.clone();
	let grid_link = config.grid_link(&plan.tileset, &plan.grid_name)?.clone();
	let grid_link = grid_link.restrict(&grid, plan.extent.as_ref(), plan.zoom_range)?;
	let dimensions = resolve_dimensions(tileset, &plan.dimensions)?;
	let (metasize_x, metasize_y) = plan.metasize_override.unwrap_or((tileset.metasize_x, tileset.metasize_y));
	let shape = MetatileShape {
		metasize_x,
		metasize_y,
		metabuffer: tileset.metabuffer,
	};

	let dest_cache = match &plan.dest_tileset {
		Some(name) => Some(
			config
				.tilesets
				.get(name)
				.ok_or_else(|| anyhow::anyhow!("unconfigured destination tileset '{name}'"))?
				.cache
				.clone(),
		),
		None => None,
	};
	if matches!(plan.mode, SeedMode::Transfer) {
		anyhow::ensure!(dest_cache.is_some(), "transfer mode requires a destination tileset (--transfer)");
	}

	let renderer = if matches!(plan.mode, SeedMode::Seed) {
		let source = tileset
			.source
			.clone()
			.ok_or_else(|| anyhow::anyhow!("tileset '{}' has no source configured, cannot seed", plan.tileset))?;
		Some(Arc::new(Renderer {
			source,
			locker: config.locker.clone(),
			cache: tileset.cache.clone(),
			codec: tileset.codec.clone(),
			watermark: tileset.watermark.clone(),
		}))
	} else {
		None
	};

	let addresses = match plan.retry_addresses {
		Some(addrs) => addrs,
		None => collect_addresses(&grid_link, &shape, plan.iteration_mode.unwrap_or_else(|| IterationMode::default_for_grid(&grid_link.grid_name))),
	};

	let mut items = Vec::new();
	for addr in addresses {
		if let Some(filter) = &plan.geometry_filter {
			let metatile = Metatile::containing(&grid, &shape, &plan.tileset, &grid_link.grid_name, addr.x, addr.y, addr.z)?;
			if !filter.matches(&metatile.map_extent) {
				continue;
			}
		}
		let mut representative = Tile::new(&plan.tileset, &grid_link.grid_name, addr.x, addr.y, addr.z);
		representative.dimensions = dimensions.clone();
		let ctx = ExamineContext {
			cache: tileset.cache.as_ref(),
			dest_cache: dest_cache.as_deref(),
			mode: plan.mode,
			age_limit: plan.age_limit,
			force: plan.force,
		};
		for command in examine_tile(&ctx, &representative).await? {
			items.push(WorkItem::new(command, addr.x, addr.y, addr.z));
		}
	}

	let expected = items.len() as u64;
	let tiles_per_metatile = (shape.metasize_x * shape.metasize_y) as u64;
	let logger = Logger::new(expected, tiles_per_metatile, plan.failure_log).with_abort_ratio(plan.abort_ratio);

	let worker_ctx = Arc::new(WorkerContext {
		renderer,
		cache: tileset.cache.clone(),
		dest_cache,
		grid,
		grid_link,
		shape,
		tileset: plan.tileset.clone(),
		dimensions,
	});

	let interrupted = Arc::new(AtomicBool::new(false));
	spawn_sigint_handler(Arc::clone(&interrupted));

	queue::run(items, worker_ctx, plan.concurrency, logger, move || interrupted.load(Ordering::SeqCst)).await
}

fn collect_addresses(grid_link: &GridLink, shape: &MetatileShape, mode: IterationMode) -> Vec<MetatileAddress> {
	match mode {
		IterationMode::LevelByLevel => LevelByLevelIter::new(grid_link, shape.metasize_x, shape.metasize_y).collect(),
		IterationMode::DrillDown => {
			let mut iter = DrillDownIter::new(grid_link, shape.metasize_x, shape.metasize_y);
			let mut out = Vec::new();
			while let Some(item) = iter.next() {
				out.push(item);
				// STOP_RECURSION: once past the served/cached zoom range, don't descend further.
				if grid_link.max_cached_zoom.map(|limit| item.z < limit).unwrap_or(true) {
					iter.push_children(item);
				}
			}
			out
		}
	}
}

/// First SIGINT drains the queue (stop enqueuing, let in-flight work
/// finish); a second terminates immediately (spec §4.9.6).
fn spawn_sigint_handler(interrupted: Arc<AtomicBool>) {
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_err() {
			return;
		}
		interrupted.store(true, Ordering::SeqCst);
		if tokio::signal::ctrl_c().await.is_ok() {
			std::process::exit(1);
		}
	});
}
