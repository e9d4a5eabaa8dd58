//! The examine-tile decision table (spec §4.9.5).

use crate::command::Command;
use std::time::SystemTime;
use tilecache_cache::CacheBackend;
use tilecache_core::tile::Tile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedMode {
	Seed,
	Delete,
	Transfer,
}

impl SeedMode {
	fn command(self) -> Command {
		match self {
			SeedMode::Seed => Command::Seed,
			SeedMode::Delete => Command::Delete,
			SeedMode::Transfer => Command::Transfer,
		}
	}
}

pub struct ExamineContext<'a> {
	pub cache: &'a dyn CacheBackend,
	/// Required when `mode` is `Transfer`.
	pub dest_cache: Option<&'a dyn CacheBackend>,
	pub mode: SeedMode,
	pub age_limit: Option<SystemTime>,
	pub force: bool,
}

/// Decide what to enqueue for the metatile `representative` (its origin
/// tile) stands for. Returns an ordered sequence of commands; some rows
/// produce two (e.g. "DELETE then SEED").
pub async fn examine_tile(ctx: &ExamineContext<'_>, representative: &Tile) -> anyhow::Result<Vec<Command>> {
	if ctx.force {
		return Ok(vec![ctx.mode.command()]);
	}

	let mut probe = representative.clone();
	let exists = ctx.cache.exists(&probe).await?;
	if !exists {
		return Ok(match ctx.mode {
			SeedMode::Seed | SeedMode::Transfer => vec![ctx.mode.command()],
			SeedMode::Delete => vec![Command::Skip],
		});
	}

	let expired = match ctx.age_limit {
		Some(limit) => {
			ctx.cache.get(&mut probe).await?;
			probe.mtime.is_some_and(|mtime| mtime < limit)
		}
		None => false,
	};

	match (ctx.mode, expired) {
		(SeedMode::Seed, false) => Ok(vec![Command::Skip]),
		(SeedMode::Seed, true) => Ok(vec![Command::Delete, Command::Seed]),
		(SeedMode::Delete, _) => Ok(vec![Command::Delete]),
		(SeedMode::Transfer, false) => {
			let dest = ctx.dest_cache.expect("transfer mode requires a destination cache");
			if dest.exists(&probe).await? {
				Ok(vec![Command::Skip])
			} else {
				Ok(vec![Command::Transfer])
			}
		}
		// The DELETE here spans both caches; see the worker's transfer-mode dispatch.
		(SeedMode::Transfer, true) => Ok(vec![Command::Delete, Command::Transfer]),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::time::Duration;
	use tilecache_cache::memory::MemoryCache;

	fn tile() -> Tile {
		Tile::new("ts", "g", 0, 0, 0)
	}

	fn stored_tile() -> Tile {
		let mut t = tile();
		t.encoded_data = Some(Arc::new(vec![1, 2, 3]));
		t
	}

	#[tokio::test]
	async fn missing_tile_enqueues_seed() {
		let cache = MemoryCache::new();
		let ctx = ExamineContext {
			cache: &cache,
			dest_cache: None,
			mode: SeedMode::Seed,
			age_limit: None,
			force: false,
		};
		assert_eq!(examine_tile(&ctx, &tile()).await.unwrap(), vec![Command::Seed]);
	}

	#[tokio::test]
	async fn missing_tile_in_delete_mode_skips() {
		let cache = MemoryCache::new();
		let ctx = ExamineContext {
			cache: &cache,
			dest_cache: None,
			mode: SeedMode::Delete,
			age_limit: None,
			force: false,
		};
		assert_eq!(examine_tile(&ctx, &tile()).await.unwrap(), vec![Command::Skip]);
	}

	#[tokio::test]
	async fn present_unexpired_seed_skips() {
		let cache = MemoryCache::new();
		cache.set(&stored_tile()).await.unwrap();
		let ctx = ExamineContext {
			cache: &cache,
			dest_cache: None,
			mode: SeedMode::Seed,
			age_limit: None,
			force: false,
		};
		assert_eq!(examine_tile(&ctx, &tile()).await.unwrap(), vec![Command::Skip]);
	}

	#[tokio::test]
	async fn force_bypasses_existence_check() {
		let cache = MemoryCache::new();
		cache.set(&stored_tile()).await.unwrap();
		let ctx = ExamineContext {
			cache: &cache,
			dest_cache: None,
			mode: SeedMode::Seed,
			age_limit: None,
			force: true,
		};
		assert_eq!(examine_tile(&ctx, &tile()).await.unwrap(), vec![Command::Seed]);
	}

	#[tokio::test]
	async fn transfer_present_in_dest_skips() {
		let primary = MemoryCache::new();
		let dest = MemoryCache::new();
		primary.set(&stored_tile()).await.unwrap();
		dest.set(&stored_tile()).await.unwrap();
		let ctx = ExamineContext {
			cache: &primary,
			dest_cache: Some(&dest),
			mode: SeedMode::Transfer,
			age_limit: None,
			force: false,
		};
		assert_eq!(examine_tile(&ctx, &tile()).await.unwrap(), vec![Command::Skip]);
	}

	#[tokio::test]
	async fn transfer_absent_in_dest_transfers() {
		let primary = MemoryCache::new();
		let dest = MemoryCache::new();
		primary.set(&stored_tile()).await.unwrap();
		let ctx = ExamineContext {
			cache: &primary,
			dest_cache: Some(&dest),
			mode: SeedMode::Transfer,
			age_limit: None,
			force: false,
		};
		assert_eq!(examine_tile(&ctx, &tile()).await.unwrap(), vec![Command::Transfer]);
	}

	#[tokio::test]
	async fn expired_seed_deletes_then_seeds() {
		let cache = MemoryCache::new();
		cache.set(&stored_tile()).await.unwrap();
		let ctx = ExamineContext {
			cache: &cache,
			dest_cache: None,
			mode: SeedMode::Seed,
			age_limit: Some(SystemTime::now() + Duration::from_secs(3600)),
			force: false,
		};
		assert_eq!(examine_tile(&ctx, &tile()).await.unwrap(), vec![Command::Delete, Command::Seed]);
	}
}
