//! Progress indicator used by the seeder's logger (spec §4.9.6).
//!
//! By default this is a no-op drain; the `cli` feature swaps in a terminal
//! progress bar with rate/ETA, matching a real CLI build.

#![allow(unused)]

#[cfg(all(feature = "cli", not(test)))]
mod progress_bar;

#[cfg(any(not(feature = "cli"), test))]
mod progress_drain;

mod traits;
pub use traits::ProgressTrait;

pub fn get_progress_bar(message: &str, max_value: u64) -> Box<dyn ProgressTrait> {
	#[cfg(all(feature = "cli", not(test)))]
	let mut progress = progress_bar::ProgressBar::new();
	#[cfg(any(not(feature = "cli"), test))]
	let mut progress = progress_drain::ProgressDrain::new();
	progress.init(message, max_value);
	Box::new(progress)
}
