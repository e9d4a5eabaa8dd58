//! The source abstraction (spec §2 item 7, §4.3.4), grounded on
//! `versatiles_pipeline::helpers::dummy_image_source::DummyImageSource`'s
//! async trait shape.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tilecache_core::tile::{FeatureInfoRequest, FeatureInfoResult, MapRequest};
use tilecache_core::ImageBuffer;

#[async_trait]
pub trait Source: Send + Sync {
	async fn render_map(&self, request: &MapRequest) -> anyhow::Result<ImageBuffer>;
	async fn query_info(&self, request: &FeatureInfoRequest) -> anyhow::Result<FeatureInfoResult>;
}

/// Retry count plus exponential base delay: attempt `n` (1-indexed) sleeps
/// `base · 2^(n-1)` seconds before retrying (spec §5).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	pub count: u32,
	pub base_delay: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		RetryPolicy {
			count: 3,
			base_delay: Duration::from_secs(1),
		}
	}
}

impl RetryPolicy {
	pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
		self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
	}
}

/// Wraps a source with transparent retry; only the final failure is
/// surfaced (spec §7: "Source retries transparently; only the final
/// failure is surfaced").
pub struct RetrySource<S> {
	inner: S,
	policy: RetryPolicy,
}

impl<S: Source> RetrySource<S> {
	pub fn new(inner: S, policy: RetryPolicy) -> Self {
		RetrySource { inner, policy }
	}
}

#[async_trait]
impl<S: Source> Source for RetrySource<S> {
	async fn render_map(&self, request: &MapRequest) -> anyhow::Result<ImageBuffer> {
		let mut attempt = 0;
		loop {
			attempt += 1;
			match self.inner.render_map(request).await {
				Ok(image) => return Ok(image),
				Err(e) if attempt <= self.policy.count => {
					log::warn!("source render attempt {attempt} failed, retrying: {e}");
					tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
				}
				Err(e) => return Err(e),
			}
		}
	}

	async fn query_info(&self, request: &FeatureInfoRequest) -> anyhow::Result<FeatureInfoResult> {
		let mut attempt = 0;
		loop {
			attempt += 1;
			match self.inner.query_info(request).await {
				Ok(result) => return Ok(result),
				Err(e) if attempt <= self.policy.count => {
					log::warn!("source query_info attempt {attempt} failed, retrying: {e}");
					tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
				}
				Err(e) => return Err(e),
			}
		}
	}
}

/// Ordered list of sources; first success wins. If all fail, the primary's
/// (index 0's) error is surfaced, secondary errors only logged (spec §4.3.4).
pub struct FallbackSource {
	sources: Vec<Arc<dyn Source>>,
}

impl FallbackSource {
	pub fn new(sources: Vec<Arc<dyn Source>>) -> anyhow::Result<Self> {
		anyhow::ensure!(!sources.is_empty(), "fallback source needs at least one source");
		Ok(FallbackSource { sources })
	}
}

#[async_trait]
impl Source for FallbackSource {
	async fn render_map(&self, request: &MapRequest) -> anyhow::Result<ImageBuffer> {
		let mut primary_err = None;
		for (idx, source) in self.sources.iter().enumerate() {
			match source.render_map(request).await {
				Ok(image) => return Ok(image),
				Err(e) => {
					if idx == 0 {
						primary_err = Some(e);
					} else {
						log::warn!("fallback source {idx} failed: {e}");
					}
				}
			}
		}
		Err(primary_err.expect("non-empty by construction"))
	}

	async fn query_info(&self, request: &FeatureInfoRequest) -> anyhow::Result<FeatureInfoResult> {
		let mut primary_err = None;
		for (idx, source) in self.sources.iter().enumerate() {
			match source.query_info(request).await {
				Ok(result) => return Ok(result),
				Err(e) => {
					if idx == 0 {
						primary_err = Some(e);
					} else {
						log::warn!("fallback source {idx} failed: {e}");
					}
				}
			}
		}
		Err(primary_err.expect("non-empty by construction"))
	}
}

/// Renders every request as a uniform RGBA color, grounded on
/// `versatiles_pipeline`'s `DummyImageSource::from_color`. Useful as a CLI
/// placeholder source and for demos/tests that don't need real imagery.
pub struct SolidSource {
	color: [u8; 4],
}

impl SolidSource {
	pub fn new(color: [u8; 4]) -> Self {
		SolidSource { color }
	}
}

#[async_trait]
impl Source for SolidSource {
	async fn render_map(&self, request: &MapRequest) -> anyhow::Result<ImageBuffer> {
		let pixel_count = (request.width as usize) * (request.height as usize);
		let mut raw = Vec::with_capacity(pixel_count * 4);
		for _ in 0..pixel_count {
			raw.extend_from_slice(&self.color);
		}
		Ok(ImageBuffer::from_raw(request.width, request.height, raw))
	}

	async fn query_info(&self, _request: &FeatureInfoRequest) -> anyhow::Result<FeatureInfoResult> {
		Ok(FeatureInfoResult::default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Mutex;
	use tilecache_core::grid::Extent;
	use tilecache_core::DimensionSet;

	struct DummySource {
		color: [u8; 4],
		fail_times: Mutex<u32>,
		calls: AtomicUsize,
	}

	impl DummySource {
		fn solid(color: [u8; 4]) -> Self {
			DummySource {
				color,
				fail_times: Mutex::new(0),
				calls: AtomicUsize::new(0),
			}
		}

		fn failing(times: u32) -> Self {
			DummySource {
				color: [0, 0, 0, 255],
				fail_times: Mutex::new(times),
				calls: AtomicUsize::new(0),
			}
		}
	}

	fn request() -> MapRequest {
		MapRequest {
			tileset: "ts".into(),
			grid_name: "g".into(),
			extent: Extent::new(0.0, 0.0, 1.0, 1.0).unwrap(),
			width: 2,
			height: 2,
			z: 0,
			dimensions: DimensionSet::empty(),
		}
	}

	#[async_trait]
	impl Source for DummySource {
		async fn render_map(&self, _request: &MapRequest) -> anyhow::Result<ImageBuffer> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			let mut remaining = self.fail_times.lock().unwrap();
			if *remaining > 0 {
				*remaining -= 1;
				anyhow::bail!("transient failure");
			}
			Ok(ImageBuffer::from_raw(2, 2, self.color.repeat(4)))
		}

		async fn query_info(&self, _request: &FeatureInfoRequest) -> anyhow::Result<FeatureInfoResult> {
			unimplemented!()
		}
	}

	#[tokio::test]
	async fn retry_source_succeeds_after_transient_failures() {
		let source = RetrySource::new(
			DummySource::failing(2),
			RetryPolicy {
				count: 3,
				base_delay: Duration::from_millis(1),
			},
		);
		let image = source.render_map(&request()).await.unwrap();
		assert_eq!(image.raw_rgba.unwrap().len(), 16);
	}

	#[tokio::test]
	async fn retry_source_surfaces_final_failure() {
		let source = RetrySource::new(
			DummySource::failing(5),
			RetryPolicy {
				count: 2,
				base_delay: Duration::from_millis(1),
			},
		);
		assert!(source.render_map(&request()).await.is_err());
	}

	#[tokio::test]
	async fn fallback_tries_secondary_on_primary_failure() {
		let fallback = FallbackSource::new(vec![Arc::new(DummySource::failing(99)), Arc::new(DummySource::solid([1, 2, 3, 4]))]).unwrap();
		let image = fallback.render_map(&request()).await.unwrap();
		assert_eq!(&image.raw_rgba.unwrap()[0..4], &[1, 2, 3, 4]);
	}

	#[tokio::test]
	async fn fallback_surfaces_primary_error_when_all_fail() {
		let fallback = FallbackSource::new(vec![Arc::new(DummySource::failing(99)), Arc::new(DummySource::failing(99))]).unwrap();
		assert!(fallback.render_map(&request()).await.is_err());
	}
}
