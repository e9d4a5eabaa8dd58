//! Opaque codec boundary (spec §1 non-goal: "Image codec internals...
//! treated as opaque `encode(image)->bytes` / `decode(bytes)->image`
//! operations").

use crate::tile::ImageBuffer;
use anyhow::Result;

pub trait TileCodec: Send + Sync {
	fn format_extension(&self) -> &str;
	fn encode(&self, image: &ImageBuffer) -> Result<Vec<u8>>;
	fn decode(&self, bytes: &[u8]) -> Result<ImageBuffer>;
}
