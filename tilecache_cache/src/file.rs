//! File-based cache backend, grounded on `versatiles_core::cache::OnDiskCache`
//! (percent-encoded file names under a root directory) plus the blank-tile
//! sentinel of spec §4.3.1.

use crate::traits::{CacheBackend, GetOutcome};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tilecache_core::tile_key::{KeyTemplate, get_tile_key};
use tilecache_core::{Tile, blank_png};

pub struct FileCache {
	root: PathBuf,
	read_only: bool,
}

impl FileCache {
	pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
		let root = root.into();
		fs::create_dir_all(&root)?;
		Ok(FileCache { root, read_only: false })
	}

	pub fn read_only(mut self, read_only: bool) -> Self {
		self.read_only = read_only;
		self
	}

	fn path_for(&self, tile: &Tile) -> PathBuf {
		let key = get_tile_key(tile, &KeyTemplate::default());
		let encoded = percent_encode_path(&key);
		self.root.join(encoded)
	}
}

/// Every path separator stays a directory boundary; other reserved/unsafe
/// bytes are percent-encoded, mirroring `OnDiskCache::get_entry_path`'s
/// alnum-passthrough-plus-`%xx` scheme, but preserving `/` so the default key
/// template's `tileset/grid/z/y/x.ext` layout still nests into directories.
fn percent_encode_path(key: &str) -> String {
	key
		.split('/')
		.map(|segment| {
			segment
				.bytes()
				.map(|b| {
					if (b as char).is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-' | b',' | b'#') {
						(b as char).to_string()
					} else {
						format!("%{b:02x}")
					}
				})
				.collect::<String>()
		})
		.collect::<Vec<_>>()
		.join("/")
}

fn mtime_of(path: &Path) -> Option<SystemTime> {
	fs::metadata(path).ok()?.modified().ok()
}

#[async_trait]
impl CacheBackend for FileCache {
	async fn exists(&self, tile: &Tile) -> anyhow::Result<bool> {
		Ok(self.path_for(tile).exists())
	}

	async fn get(&self, tile: &mut Tile) -> anyhow::Result<GetOutcome> {
		let path = self.path_for(tile);
		if !path.exists() {
			return Ok(GetOutcome::Miss);
		}
		let bytes = fs::read(&path)?;
		tile.mtime = mtime_of(&path);
		tile.encoded_data = Some(std::sync::Arc::new(blank_png::expand_stored_bytes(&bytes)));
		Ok(GetOutcome::Hit)
	}

	async fn set(&self, tile: &Tile) -> anyhow::Result<()> {
		anyhow::ensure!(!self.read_only, "cache is read-only");
		let path = self.path_for(tile);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		let bytes = if let Some(blank) = tile.raw_image.as_ref().and_then(|img| img.blank_pixel()) {
			blank_png::encode_sentinel(blank).to_vec()
		} else if let Some(encoded) = &tile.encoded_data {
			encoded.as_ref().clone()
		} else {
			anyhow::bail!("set() requires raw_image or encoded_data to be populated");
		};
		let tmp = path.with_extension("tmp");
		fs::write(&tmp, bytes)?;
		fs::rename(&tmp, &path)?;
		Ok(())
	}

	async fn multi_set(&self, tiles: &[Tile]) -> anyhow::Result<()> {
		// No transactional batch write at the filesystem level; loop like
		// the default, but surface the first error after attempting every
		// tile so a partial metatile write isn't silently incomplete.
		let mut first_err = None;
		for tile in tiles {
			if let Err(e) = self.set(tile).await
				&& first_err.is_none()
			{
				first_err = Some(e);
			}
		}
		match first_err {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}

	async fn delete(&self, tile: &Tile) -> anyhow::Result<()> {
		let path = self.path_for(tile);
		if path.exists() {
			fs::remove_file(&path)?;
		}
		Ok(())
	}

	fn read_only(&self) -> bool {
		self.read_only
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn tile(x: u32, y: u32, z: u8) -> Tile {
		Tile::new("ts", "g", x, y, z)
	}

	fn new_cache() -> (TempDir, FileCache) {
		let dir = tempfile::tempdir().unwrap();
		let cache = FileCache::new(dir.path().join("cache")).unwrap();
		(dir, cache)
	}

	#[tokio::test]
	async fn roundtrip_set_get_delete() {
		let (_tmp, cache) = new_cache();
		let mut t = tile(3, 4, 5);
		t.encoded_data = Some(std::sync::Arc::new(vec![9, 9, 9]));

		assert!(!cache.exists(&t).await.unwrap());
		cache.set(&t).await.unwrap();
		assert!(cache.exists(&t).await.unwrap());

		let mut readback = tile(3, 4, 5);
		assert_eq!(cache.get(&mut readback).await.unwrap(), GetOutcome::Hit);
		assert_eq!(readback.encoded_data.unwrap().as_ref(), &vec![9u8, 9, 9]);
		assert!(readback.mtime.is_some());

		cache.delete(&t).await.unwrap();
		assert!(!cache.exists(&t).await.unwrap());
	}

	#[tokio::test]
	async fn delete_absent_key_is_safe() {
		let (_tmp, cache) = new_cache();
		cache.delete(&tile(0, 0, 0)).await.unwrap();
	}

	#[tokio::test]
	async fn blank_tile_stored_as_5_byte_sentinel_scenario_s3() {
		let (_tmp, cache) = new_cache();
		let mut t = tile(0, 0, 0);
		let mut img = tilecache_core::ImageBuffer::from_raw(256, 256, vec![255, 0, 0, 128].repeat(256 * 256));
		img.detect_blank();
		t.raw_image = Some(img);
		cache.set(&t).await.unwrap();

		let path = cache.path_for(&t);
		let bytes = std::fs::read(&path).unwrap();
		assert_eq!(bytes, vec![0x23, 0xFF, 0x00, 0x00, 0x80]);
	}

	#[tokio::test]
	async fn blank_tile_get_expands_sentinel_to_a_full_png() {
		let (_tmp, cache) = new_cache();
		let mut t = tile(0, 0, 0);
		let mut img = tilecache_core::ImageBuffer::from_raw(256, 256, vec![255, 0, 0, 128].repeat(256 * 256));
		img.detect_blank();
		t.raw_image = Some(img);
		cache.set(&t).await.unwrap();

		let mut readback = tile(0, 0, 0);
		assert_eq!(cache.get(&mut readback).await.unwrap(), GetOutcome::Hit);
		assert_eq!(readback.encoded_data.unwrap().as_ref(), &blank_png::synthesize_blank_png([255, 0, 0, 128]));
	}

	#[tokio::test]
	async fn read_only_rejects_writes() {
		let dir = tempfile::tempdir().unwrap();
		let cache = FileCache::new(dir.path().join("cache")).unwrap().read_only(true);
		let mut t = tile(0, 0, 0);
		t.encoded_data = Some(std::sync::Arc::new(vec![1]));
		assert!(cache.set(&t).await.is_err());
	}
}
