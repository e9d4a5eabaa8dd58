//! In-memory cache backend, grounded on `versatiles_core::cache::InMemoryCache`:
//! a plain `HashMap` guarded by a mutex, useful for tests and ephemeral tiers
//! in a multitier composition.

use crate::traits::{CacheBackend, GetOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;
use tilecache_core::tile_key::{KeyTemplate, get_tile_key};
use tilecache_core::{Tile, blank_png};

struct Entry {
	bytes: Vec<u8>,
	mtime: SystemTime,
}

pub struct MemoryCache {
	data: Mutex<HashMap<String, Entry>>,
	read_only: bool,
}

impl Default for MemoryCache {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryCache {
	pub fn new() -> Self {
		MemoryCache {
			data: Mutex::new(HashMap::new()),
			read_only: false,
		}
	}

	pub fn read_only(mut self, read_only: bool) -> Self {
		self.read_only = read_only;
		self
	}

	fn key(tile: &Tile) -> String {
		get_tile_key(tile, &KeyTemplate::default())
	}
}

#[async_trait]
impl CacheBackend for MemoryCache {
	async fn exists(&self, tile: &Tile) -> anyhow::Result<bool> {
		Ok(self.data.lock().unwrap().contains_key(&Self::key(tile)))
	}

	async fn get(&self, tile: &mut Tile) -> anyhow::Result<GetOutcome> {
		let data = self.data.lock().unwrap();
		match data.get(&Self::key(tile)) {
			Some(entry) => {
				tile.encoded_data = Some(std::sync::Arc::new(blank_png::expand_stored_bytes(&entry.bytes)));
				tile.mtime = Some(entry.mtime);
				Ok(GetOutcome::Hit)
			}
			None => Ok(GetOutcome::Miss),
		}
	}

	async fn set(&self, tile: &Tile) -> anyhow::Result<()> {
		anyhow::ensure!(!self.read_only, "cache is read-only");
		let bytes = if let Some(blank) = tile.raw_image.as_ref().and_then(|img| img.blank_pixel()) {
			blank_png::encode_sentinel(blank).to_vec()
		} else if let Some(encoded) = &tile.encoded_data {
			encoded.as_ref().clone()
		} else {
			anyhow::bail!("set() requires raw_image or encoded_data to be populated");
		};
		self.data.lock().unwrap().insert(
			Self::key(tile),
			Entry {
				bytes,
				mtime: SystemTime::now(),
			},
		);
		Ok(())
	}

	async fn delete(&self, tile: &Tile) -> anyhow::Result<()> {
		self.data.lock().unwrap().remove(&Self::key(tile));
		Ok(())
	}

	fn read_only(&self) -> bool {
		self.read_only
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tile(x: u32, y: u32, z: u8) -> Tile {
		Tile::new("ts", "g", x, y, z)
	}

	#[tokio::test]
	async fn roundtrip_set_get_delete() {
		let cache = MemoryCache::new();
		let mut t = tile(1, 2, 3);
		t.encoded_data = Some(std::sync::Arc::new(vec![1, 2, 3]));

		assert!(!cache.exists(&t).await.unwrap());
		cache.set(&t).await.unwrap();
		assert!(cache.exists(&t).await.unwrap());

		let mut readback = tile(1, 2, 3);
		assert_eq!(cache.get(&mut readback).await.unwrap(), GetOutcome::Hit);
		assert_eq!(readback.encoded_data.unwrap().as_ref(), &vec![1u8, 2, 3]);

		cache.delete(&t).await.unwrap();
		assert!(!cache.exists(&t).await.unwrap());
	}

	#[tokio::test]
	async fn delete_is_idempotent() {
		let cache = MemoryCache::new();
		let t = tile(0, 0, 0);
		cache.delete(&t).await.unwrap();
		cache.delete(&t).await.unwrap();
	}

	#[tokio::test]
	async fn read_only_rejects_set() {
		let cache = MemoryCache::new().read_only(true);
		let mut t = tile(0, 0, 0);
		t.encoded_data = Some(std::sync::Arc::new(vec![9]));
		assert!(cache.set(&t).await.is_err());
	}

	#[tokio::test]
	async fn blank_tile_is_stored_as_sentinel() {
		let cache = MemoryCache::new();
		let mut t = tile(0, 0, 0);
		let mut img = tilecache_core::ImageBuffer::from_raw(256, 256, vec![10, 20, 30, 255].repeat(256 * 256));
		img.detect_blank();
		t.raw_image = Some(img);

		cache.set(&t).await.unwrap();
		let mut readback = tile(0, 0, 0);
		cache.get(&mut readback).await.unwrap();
		assert_eq!(readback.encoded_data.unwrap().as_ref(), &blank_png::synthesize_blank_png([10, 20, 30, 255]));
	}
}
