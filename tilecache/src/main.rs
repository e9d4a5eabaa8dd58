//! Bulk seeding CLI (spec §6.3): parses a single flat flag surface and drives
//! `tilecache_seed::run_seed` to completion.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{ErrorLevel, Verbosity};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tilecache_core::grid::Extent;
use tilecache_seed::{FilterStrategy, GeometryFilter, IterationMode, SeedMode, SeedPlan, parse_timespec, read_retry_log};

#[derive(Parser, Debug)]
#[command(
	author,
	version,
	about = "Bulk-seed, prune, or transfer a map-tile cache.",
	long_about = None,
	disable_help_subcommand = true
)]
struct Cli {
	/// Path to a TOML configuration file describing grids, tilesets and caches.
	#[arg(long, value_name = "PATH")]
	config: PathBuf,

	/// Tileset to operate on.
	#[arg(long)]
	tileset: String,

	/// Grid the tileset is addressed through.
	#[arg(long)]
	grid: String,

	/// Restrict the run to a rectangle in grid units: minx,miny,maxx,maxy.
	#[arg(long, value_name = "minx,miny,maxx,maxy")]
	extent: Option<String>,

	/// Inclusive zoom range: MIN,MAX.
	#[arg(long, value_name = "MIN,MAX")]
	zoom: Option<String>,

	/// A dimension constraint NAME=VALUE; may repeat.
	#[arg(long = "dimension", value_name = "NAME=VALUE")]
	dimensions: Vec<String>,

	/// What to do with examined tiles. Defaults to `seed`.
	#[arg(long, value_enum)]
	mode: Option<ModeArg>,

	/// Destination tileset; required when `--mode transfer`.
	#[arg(long, value_name = "NAME")]
	transfer: Option<String>,

	/// Override the tileset's configured metatile shape: X,Y.
	#[arg(long, value_name = "X,Y")]
	metasize: Option<String>,

	/// Iteration strategy over the grid. Defaults to the grid's own preference.
	#[arg(long, value_enum)]
	iteration_mode: Option<IterationModeArg>,

	/// Worker concurrency (in-process async tasks).
	#[arg(long, conflicts_with = "nprocesses")]
	nthreads: Option<usize>,

	/// Worker concurrency. This build has no multi-process worker pool, so
	/// `--nprocesses` is accepted as a synonym for `--nthreads`.
	#[arg(long, conflicts_with = "nthreads")]
	nprocesses: Option<usize>,

	/// Age limit: "YYYY/MM/DD HH:MM" or "now".
	#[arg(long, value_name = "TIMESPEC")]
	older: Option<String>,

	/// Skip existence/age checks and issue the mode's command unconditionally.
	#[arg(long)]
	force: bool,

	/// Allowed failure percentage over the trailing 1000 results.
	#[arg(long, default_value_t = 1)]
	percent: u32,

	/// Append failed addresses here as `x,y,z` lines.
	#[arg(long, value_name = "PATH")]
	log_failed: Option<PathBuf>,

	/// Re-seed only the addresses recorded in a prior `--log-failed` file.
	#[arg(long, value_name = "PATH")]
	retry_failed: Option<PathBuf>,

	/// Path to a WKT-polygon-per-line file restricting the run to its coverage.
	#[arg(long, value_name = "PATH")]
	ogr_datasource: Option<PathBuf>,

	/// Unsupported in this build; logged and ignored if set.
	#[arg(long, value_name = "NAME")]
	ogr_layer: Option<String>,

	/// Unsupported in this build; logged and ignored if set.
	#[arg(long, value_name = "EXPR")]
	ogr_where: Option<String>,

	/// Unsupported in this build; logged and ignored if set.
	#[arg(long, value_name = "SQL")]
	ogr_sql: Option<String>,

	/// Use "intersects and not merely touches" instead of plain intersection.
	#[arg(long)]
	ogr_exclude_touching: bool,

	#[command(flatten)]
	verbose: Verbosity<ErrorLevel>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum ModeArg {
	Seed,
	Delete,
	Transfer,
}

impl From<ModeArg> for SeedMode {
	fn from(mode: ModeArg) -> Self {
		match mode {
			ModeArg::Seed => SeedMode::Seed,
			ModeArg::Delete => SeedMode::Delete,
			ModeArg::Transfer => SeedMode::Transfer,
		}
	}
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum IterationModeArg {
	DrillDown,
	LevelByLevel,
}

impl From<IterationModeArg> for IterationMode {
	fn from(mode: IterationModeArg) -> Self {
		match mode {
			IterationModeArg::DrillDown => IterationMode::DrillDown,
			IterationModeArg::LevelByLevel => IterationMode::LevelByLevel,
		}
	}
}

fn parse_pair(raw: &str, label: &str) -> Result<(u32, u32)> {
	let (a, b) = raw.split_once(',').ok_or_else(|| anyhow::anyhow!("{label} must be 'A,B', got '{raw}'"))?;
	Ok((a.trim().parse().context(label.to_string())?, b.trim().parse().context(label.to_string())?))
}

fn parse_extent(raw: &str) -> Result<Extent> {
	let parts: Vec<&str> = raw.split(',').collect();
	let [minx, miny, maxx, maxy] = parts.as_slice() else {
		anyhow::bail!("--extent must be 'minx,miny,maxx,maxy', got '{raw}'");
	};
	Extent::new(
		minx.trim().parse().context("--extent")?,
		miny.trim().parse().context("--extent")?,
		maxx.trim().parse().context("--extent")?,
		maxy.trim().parse().context("--extent")?,
	)
}

fn parse_zoom_range(raw: &str) -> Result<(u8, u8)> {
	let (lo, hi) = raw.split_once(',').ok_or_else(|| anyhow::anyhow!("--zoom must be 'MIN,MAX', got '{raw}'"))?;
	let lo: u8 = lo.trim().parse().context("--zoom")?;
	let hi: u8 = hi.trim().parse().context("--zoom")?;
	anyhow::ensure!(lo <= hi, "--zoom MIN ({lo}) must be <= MAX ({hi})");
	Ok((lo, hi))
}

fn parse_dimension(raw: &str) -> Result<(String, String)> {
	let (name, value) = raw.split_once('=').ok_or_else(|| anyhow::anyhow!("--dimension must be 'NAME=VALUE', got '{raw}'"))?;
	Ok((name.to_string(), value.to_string()))
}

fn load_geometry_filter(path: &PathBuf, exclude_touching: bool) -> Result<GeometryFilter> {
	let text = std::fs::read_to_string(path).with_context(|| format!("reading ogr-datasource '{}'", path.display()))?;
	let mut polygons = Vec::new();
	for (lineno, line) in text.lines().enumerate() {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}
		let wkt_value: wkt::Wkt<f64> = line.parse().map_err(|e| anyhow::anyhow!("{}:{}: invalid WKT: {e}", path.display(), lineno + 1))?;
		let geometry: geo_types::Geometry<f64> = wkt_value.try_into()?;
		match geometry {
			geo_types::Geometry::Polygon(polygon) => polygons.push(polygon),
			other => anyhow::bail!("{}:{}: expected a POLYGON, got {other:?}", path.display(), lineno + 1),
		}
	}
	let strategy = if exclude_touching { FilterStrategy::IntersectsNotTouching } else { FilterStrategy::Intersects };
	Ok(GeometryFilter::new(polygons, strategy))
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	env_logger::Builder::new().filter_level(cli.verbose.log_level_filter()).format_timestamp(None).init();

	let report = run(cli).await?;
	if report.aborted {
		log::error!("seeding aborted: failure ratio crossed the allowed threshold");
		std::process::exit(1);
	}
	log::info!(
		"seeded {} metatiles, {} tiles in {:.1}s ({:.1} tiles/s)",
		report.total_metatiles,
		report.total_tiles,
		report.elapsed_secs,
		report.tiles_per_sec
	);
	Ok(())
}

async fn run(cli: Cli) -> Result<tilecache_seed::Report> {
	anyhow::ensure!(
		cli.nthreads.is_some() || cli.nprocesses.is_some(),
		"exactly one of --nthreads or --nprocesses is required"
	);
	let concurrency = cli.nthreads.or(cli.nprocesses).unwrap().max(1);

	for (flag, value) in [("--ogr-layer", &cli.ogr_layer), ("--ogr-where", &cli.ogr_where), ("--ogr-sql", &cli.ogr_sql)] {
		if value.is_some() {
			log::warn!("{flag} has no effect: this build has no GDAL/OGR datasource backend, only whole-polygon WKT files via --ogr-datasource");
		}
	}
	let configuration = config::load(&cli.config)?;

	let mode = SeedMode::from(cli.mode.unwrap_or(ModeArg::Seed));
	let age_limit = cli.older.as_deref().map(parse_timespec).transpose()?;
	let metasize_override = cli.metasize.as_deref().map(|raw| parse_pair(raw, "--metasize")).transpose()?;
	let geometry_filter = cli.ogr_datasource.as_ref().map(|path| load_geometry_filter(path, cli.ogr_exclude_touching)).transpose()?;
	let extent = cli.extent.as_deref().map(parse_extent).transpose()?;
	let zoom_range = cli.zoom.as_deref().map(parse_zoom_range).transpose()?;
	let dimensions = cli.dimensions.iter().map(|raw| parse_dimension(raw)).collect::<Result<Vec<_>>>()?;

	let retry_addresses = match &cli.retry_failed {
		Some(path) => {
			let file = File::open(path).with_context(|| format!("opening retry-failed '{}'", path.display()))?;
			Some(read_retry_log(file)?)
		}
		None => None,
	};

	let failure_log: Option<Box<dyn std::io::Write + Send>> = match &cli.log_failed {
		Some(path) => {
			let file = File::create(path).with_context(|| format!("creating log-failed '{}'", path.display()))?;
			Some(Box::new(BufWriter::new(file)))
		}
		None => None,
	};

	let plan = SeedPlan {
		tileset: cli.tileset,
		grid_name: cli.grid,
		mode,
		dest_tileset: cli.transfer,
		iteration_mode: cli.iteration_mode.map(IterationMode::from),
		age_limit,
		force: cli.force,
		concurrency,
		abort_ratio: cli.percent as f64 / 100.0,
		geometry_filter,
		metasize_override,
		extent,
		zoom_range,
		dimensions,
		retry_addresses,
		failure_log,
	};

	tilecache_seed::run_seed(configuration, plan).await
}

#[cfg(test)]
mod tests {
	use super::*;

	fn try_parse(args: &[&str]) -> Result<Cli, clap::Error> {
		Cli::try_parse_from(args)
	}

	#[test]
	fn help_mentions_description() {
		let err = try_parse(&["tilecache"]).unwrap_err().to_string();
		assert!(err.contains("Bulk-seed, prune, or transfer a map-tile cache."));
	}

	#[test]
	fn requires_config_tileset_grid() {
		assert!(try_parse(&["tilecache"]).is_err());
	}

	#[test]
	fn nthreads_and_nprocesses_are_mutually_exclusive() {
		let err = try_parse(&[
			"tilecache",
			"--config",
			"c.toml",
			"--tileset",
			"ts",
			"--grid",
			"g",
			"--nthreads",
			"4",
			"--nprocesses",
			"4",
		])
		.unwrap_err()
		.to_string();
		assert!(err.contains("cannot be used with"));
	}

	#[test]
	fn parses_minimal_seed_invocation() {
		let cli = try_parse(&["tilecache", "--config", "c.toml", "--tileset", "ts", "--grid", "g", "--nthreads", "4"]).unwrap();
		assert_eq!(cli.tileset, "ts");
		assert!(cli.mode.is_none());
	}

	#[test]
	fn parse_pair_rejects_missing_comma() {
		assert!(parse_pair("4", "--metasize").is_err());
	}

	#[test]
	fn parse_pair_accepts_well_formed_input() {
		assert_eq!(parse_pair("2,3", "--metasize").unwrap(), (2, 3));
	}

	#[test]
	fn parse_extent_accepts_well_formed_input() {
		let extent = parse_extent("-180,-90,180,90").unwrap();
		assert_eq!((extent.minx, extent.miny, extent.maxx, extent.maxy), (-180.0, -90.0, 180.0, 90.0));
	}

	#[test]
	fn parse_extent_rejects_wrong_arity() {
		assert!(parse_extent("-180,-90,180").is_err());
	}

	#[test]
	fn parse_zoom_range_accepts_well_formed_input() {
		assert_eq!(parse_zoom_range("2,8").unwrap(), (2, 8));
	}

	#[test]
	fn parse_zoom_range_rejects_min_above_max() {
		assert!(parse_zoom_range("8,2").is_err());
	}

	#[test]
	fn parse_dimension_splits_on_first_equals() {
		assert_eq!(parse_dimension("style=dark").unwrap(), ("style".to_string(), "dark".to_string()));
	}

	#[test]
	fn parse_dimension_rejects_missing_equals() {
		assert!(parse_dimension("style").is_err());
	}
}
