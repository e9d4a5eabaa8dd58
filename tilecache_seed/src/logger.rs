//! Central seeding logger (spec §4.9.6): a progress ticker, a rolling
//! failure-ratio window used to decide whether to abort, a failure log in
//! `x,y,z` format, and the final report.

use crate::iteration::MetatileAddress;
use std::collections::VecDeque;
use std::io::Write;
use std::time::Instant;
use tilecache_core::progress::{ProgressTrait, get_progress_bar};

pub const DEFAULT_FAILURE_WINDOW: usize = 1000;
pub const DEFAULT_ABORT_RATIO: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
	pub total_metatiles: u64,
	pub total_tiles: u64,
	pub elapsed_secs: f64,
	pub tiles_per_sec: f64,
	/// Set once the rolling failure ratio crossed `abort_ratio`. The CLI
	/// exits 1 when this is set, 0 otherwise (spec §6.3).
	pub aborted: bool,
}

pub struct Logger {
	progress: Box<dyn ProgressTrait>,
	failure_log: Option<Box<dyn Write + Send>>,
	window: VecDeque<bool>,
	window_cap: usize,
	abort_ratio: f64,
	total_metatiles: u64,
	total_tiles: u64,
	tiles_per_metatile: u64,
	started: Instant,
	aborted: bool,
}

impl Logger {
	pub fn new(expected_metatiles: u64, tiles_per_metatile: u64, failure_log: Option<Box<dyn Write + Send>>) -> Self {
		Logger {
			progress: get_progress_bar("seeding", expected_metatiles),
			failure_log,
			window: VecDeque::with_capacity(DEFAULT_FAILURE_WINDOW),
			window_cap: DEFAULT_FAILURE_WINDOW,
			abort_ratio: DEFAULT_ABORT_RATIO,
			total_metatiles: 0,
			total_tiles: 0,
			tiles_per_metatile,
			started: Instant::now(),
			aborted: false,
		}
	}

	pub fn with_abort_ratio(mut self, ratio: f64) -> Self {
		self.abort_ratio = ratio;
		self
	}

	/// Records one completed metatile and returns whether the rolling
	/// failure ratio has crossed the abort threshold.
	pub fn record(&mut self, addr: MetatileAddress, result: &anyhow::Result<()>) -> anyhow::Result<bool> {
		let failed = result.is_err();
		if failed {
			if let Some(log) = self.failure_log.as_mut() {
				writeln!(log, "{},{},{}", addr.x, addr.y, addr.z)?;
			}
		} else {
			self.total_metatiles += 1;
			self.total_tiles += self.tiles_per_metatile;
		}
		self.progress.inc(1);

		if self.window.len() == self.window_cap {
			self.window.pop_front();
		}
		self.window.push_back(failed);

		let failures = self.window.iter().filter(|f| **f).count();
		let ratio = failures as f64 / self.window.len() as f64;
		let abort = self.window.len() == self.window_cap && ratio > self.abort_ratio;
		self.aborted |= abort;
		Ok(abort)
	}

	pub fn finish(mut self) -> Report {
		self.progress.finish();
		let elapsed_secs = self.started.elapsed().as_secs_f64();
		let tiles_per_sec = if elapsed_secs > 0.0 { self.total_tiles as f64 / elapsed_secs } else { 0.0 };
		Report {
			total_metatiles: self.total_metatiles,
			total_tiles: self.total_tiles,
			elapsed_secs,
			tiles_per_sec,
			aborted: self.aborted,
		}
	}
}
