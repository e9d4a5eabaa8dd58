//! PNG codec boundary implementation (spec §1 non-goal: codec internals are
//! opaque `encode`/`decode`; this crate supplies the one concrete instance
//! the render pipeline needs), built on the `image` crate the way
//! `versatiles_image` wraps it.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageReader};
use std::io::Cursor;
use tilecache_core::codec::TileCodec;
use tilecache_core::tile::ImageBuffer;

pub struct PngCodec;

impl TileCodec for PngCodec {
	fn format_extension(&self) -> &str {
		"png"
	}

	fn encode(&self, image: &ImageBuffer) -> anyhow::Result<Vec<u8>> {
		let raw = image.raw_rgba.as_ref().ok_or_else(|| anyhow::anyhow!("encode requires a decoded raw_rgba buffer"))?;
		anyhow::ensure!(
			raw.len() == image.width as usize * image.height as usize * 4,
			"raw buffer length does not match width*height*4"
		);
		let mut out = Vec::new();
		PngEncoder::new(&mut out).write_image(raw, image.width, image.height, ExtendedColorType::Rgba8)?;
		Ok(out)
	}

	fn decode(&self, bytes: &[u8]) -> anyhow::Result<ImageBuffer> {
		let decoded = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?.decode()?.to_rgba8();
		let (width, height) = (decoded.width(), decoded.height());
		Ok(ImageBuffer::from_raw(width, height, decoded.into_raw()))
	}
}
