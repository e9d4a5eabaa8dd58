//! The four request shapes that flow through the pipeline: Tile, Map,
//! Metatile (see `metatile.rs`), and FeatureInfo (spec §2 item 5, §3.3).

use crate::dimension::DimensionSet;
use std::sync::Arc;
use std::time::SystemTime;

/// Decoded RGBA surface plus encoded byte buffer, with tri-state hints.
/// See spec §2 item 1.
#[derive(Debug, Clone, Default)]
pub struct ImageBuffer {
	pub raw_rgba: Option<Arc<Vec<u8>>>,
	pub width: u32,
	pub height: u32,
	pub encoded: Option<Arc<Vec<u8>>>,
	pub has_alpha: Option<bool>,
	pub is_blank: Option<bool>,
}

impl ImageBuffer {
	pub fn from_raw(width: u32, height: u32, raw_rgba: Vec<u8>) -> Self {
		debug_assert_eq!(raw_rgba.len(), width as usize * height as usize * 4);
		Self {
			raw_rgba: Some(Arc::new(raw_rgba)),
			width,
			height,
			encoded: None,
			has_alpha: None,
			is_blank: None,
		}
	}

    pub fn from_encoded(encoded: Vec<u8>) -> Self {
        Self {
            raw_rgba: None,
            width: 0,
            height: 0,
            encoded: Some(Arc::new(encoded)),
            has_alpha: None,
            is_blank: None,
        }
    }

	/// Single-pass blank check: every pixel identical to `data[0]` (spec §4.3.1).
	pub fn detect_blank(&mut self) -> Option<bool> {
		let raw = self.raw_rgba.as_ref()?;
		if raw.len() < 4 {
			return None;
		}
		let first = &raw[0..4];
		let blank = raw.chunks_exact(4).all(|px| px == first);
		self.is_blank = Some(blank);
		Some(blank)
	}

	pub fn blank_pixel(&self) -> Option<[u8; 4]> {
		if self.is_blank == Some(true) {
			let raw = self.raw_rgba.as_ref()?;
			Some([raw[0], raw[1], raw[2], raw[3]])
		} else {
			None
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct Expires {
	pub seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Tile {
	pub tileset: String,
	pub grid_link: String,
	pub x: u32,
	pub y: u32,
	pub z: u8,
	pub dimensions: DimensionSet,
	pub raw_image: Option<ImageBuffer>,
	pub encoded_data: Option<Arc<Vec<u8>>>,
	pub mtime: Option<SystemTime>,
	pub expires: Expires,
	/// The source/cache signaled "no data" for this address (spec §3.3,
	/// distinct from error).
	pub nodata: bool,
}

impl Tile {
	pub fn new(tileset: impl Into<String>, grid_link: impl Into<String>, x: u32, y: u32, z: u8) -> Self {
		Tile {
			tileset: tileset.into(),
			grid_link: grid_link.into(),
			x,
			y,
			z,
			dimensions: DimensionSet::empty(),
			raw_image: None,
			encoded_data: None,
			mtime: None,
			expires: Expires::default(),
			nodata: false,
		}
	}

	pub fn with_dimensions(mut self, dimensions: DimensionSet) -> Self {
		self.dimensions = dimensions;
		self
	}

	/// At any instant at least one of raw_image/encoded_data is meaningful
	/// once a successful get/render completes, unless `nodata` (spec §3.3).
	pub fn has_content(&self) -> bool {
		self.nodata || self.raw_image.is_some() || self.encoded_data.is_some()
	}
}

/// A rendering request covering an arbitrary map extent (as opposed to a
/// single tile address); the unit the `Source` trait actually renders.
#[derive(Debug, Clone)]
pub struct MapRequest {
	pub tileset: String,
	pub grid_name: String,
	pub extent: crate::grid::Extent,
	pub width: u32,
	pub height: u32,
	pub z: u8,
	pub dimensions: DimensionSet,
}

/// `query_info` request shape: a tile address plus a pixel location within it.
#[derive(Debug, Clone)]
pub struct FeatureInfoRequest {
	pub tile: Tile,
	pub x_px: u32,
	pub y_px: u32,
}

#[derive(Debug, Clone, Default)]
pub struct FeatureInfoResult {
	pub content_type: String,
	pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn detect_blank_true_for_uniform_image() {
		let mut img = ImageBuffer::from_raw(2, 2, vec![10, 20, 30, 40].repeat(4));
		assert_eq!(img.detect_blank(), Some(true));
		assert_eq!(img.blank_pixel(), Some([10, 20, 30, 40]));
	}

	#[test]
	fn detect_blank_false_for_mixed_image() {
		let mut raw = vec![10, 20, 30, 40].repeat(3);
		raw.extend_from_slice(&[1, 2, 3, 4]);
		let mut img = ImageBuffer::from_raw(2, 2, raw);
		assert_eq!(img.detect_blank(), Some(false));
		assert_eq!(img.blank_pixel(), None);
	}

	#[test]
	fn nodata_tile_has_content() {
		let mut tile = Tile::new("ts", "gl", 0, 0, 0);
		assert!(!tile.has_content());
		tile.nodata = true;
		assert!(tile.has_content());
	}
}
