//! Fast->slow tiered cache composition (spec §4.3.3).

use crate::traits::{CacheBackend, GetOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use tilecache_core::Tile;

pub struct MultitierCache {
	/// Ordered fast -> slow; the last entry is the authoritative write target.
	tiers: Vec<Arc<dyn CacheBackend>>,
}

impl MultitierCache {
	pub fn new(tiers: Vec<Arc<dyn CacheBackend>>) -> anyhow::Result<Self> {
		anyhow::ensure!(!tiers.is_empty(), "multitier cache needs at least one tier");
		Ok(MultitierCache { tiers })
	}
}

#[async_trait]
impl CacheBackend for MultitierCache {
	/// Logical OR across children (first hit wins).
	async fn exists(&self, tile: &Tile) -> anyhow::Result<bool> {
		for tier in &self.tiers {
			if tier.exists(tile).await? {
				return Ok(true);
			}
		}
		Ok(false)
	}

	/// Try children in order; on a hit past position 0, asynchronously
	/// promote into every preceding tier (errors swallowed).
	async fn get(&self, tile: &mut Tile) -> anyhow::Result<GetOutcome> {
		for (idx, tier) in self.tiers.iter().enumerate() {
			let mut probe = tile.clone();
			if tier.get(&mut probe).await? == GetOutcome::Hit {
				*tile = probe;
				if idx > 0 {
					let promoted = tile.clone();
					for preceding in self.tiers[..idx].iter().cloned() {
						let promoted = promoted.clone();
						tokio::spawn(async move {
							if let Err(e) = preceding.set(&promoted).await {
								log::warn!("multitier promotion failed: {e}");
							}
						});
					}
				}
				return Ok(GetOutcome::Hit);
			}
		}
		Ok(GetOutcome::Miss)
	}

	/// Write-through to the last (slowest, authoritative) tier only.
	async fn set(&self, tile: &Tile) -> anyhow::Result<()> {
		self.tiers.last().expect("non-empty by construction").set(tile).await
	}

	async fn multi_set(&self, tiles: &[Tile]) -> anyhow::Result<()> {
		self.tiers.last().expect("non-empty by construction").multi_set(tiles).await
	}

	/// Attempt on every tier; ignore per-tier errors.
	async fn delete(&self, tile: &Tile) -> anyhow::Result<()> {
		for tier in &self.tiers {
			if let Err(e) = tier.delete(tile).await {
				log::warn!("multitier delete failed on one tier: {e}");
			}
		}
		Ok(())
	}
}
