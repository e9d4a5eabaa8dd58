//! The cache backend abstraction (spec §4.3).

use async_trait::async_trait;
use tilecache_core::Tile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetOutcome {
	Hit,
	Miss,
}

/// Every concrete backend (memory, file, and — beyond this crate's scope —
/// memcache/redis/bdb/lmdb/tokyo/riak/couchbase/tiff/swift) implements this
/// contract. `configuration_check`/`child_init` run once after configuration
/// is finalized and once per process, respectively (spec §4.3).
#[async_trait]
pub trait CacheBackend: Send + Sync {
	/// Non-authoritative hint; implementers may short-circuit `get`.
	async fn exists(&self, tile: &Tile) -> anyhow::Result<bool>;

	/// On `Hit`, fills `encoded_data` and `mtime` on the passed-in tile.
	async fn get(&self, tile: &mut Tile) -> anyhow::Result<GetOutcome>;

	/// Requires `tile.encoded_data` or `tile.raw_image` to be populated;
	/// callers are expected to encode before calling `set` (the renderer
	/// does so at step 4 of §4.4.2). A backend may still refuse blank tiles
	/// or store the 5-byte sentinel instead (spec §4.3.1).
	async fn set(&self, tile: &Tile) -> anyhow::Result<()>;

	/// Single transactional batch if the backend supports it, else loops `set`.
	async fn multi_set(&self, tiles: &[Tile]) -> anyhow::Result<()> {
		for tile in tiles {
			self.set(tile).await?;
		}
		Ok(())
	}

	/// Idempotent: safe to call on an absent key.
	async fn delete(&self, tile: &Tile) -> anyhow::Result<()>;

	fn configuration_check(&self) -> anyhow::Result<()> {
		Ok(())
	}

	fn child_init(&self) -> anyhow::Result<()> {
		Ok(())
	}

	/// Whether reads are permitted to mutate storage (e.g. multitier
	/// promotion); `false` under a read-only tileset configuration.
	fn read_only(&self) -> bool {
		false
	}
}
