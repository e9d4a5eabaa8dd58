//! Out-of-zoom reassembly (spec §3.2): once a request passes a tileset's
//! `max_cached_zoom`, `OutOfZoomStrategy::Reassemble` serves it by cropping
//! and nearest-neighbor upsampling the corresponding sub-region of the
//! nearest cached ancestor tile, the way
//! `meridian_vector_tiles::generation::overzooming::OverzoomHandler` walks
//! up to a source zoom and rescales from there.

use tilecache_core::tile::ImageBuffer;

/// The ancestor tile address at `ancestor_z` (`<= z`) that contains `(x, y, z)`.
pub fn ancestor_at(x: u32, y: u32, z: u8, ancestor_z: u8) -> (u32, u32, u8) {
	let shift = z - ancestor_z;
	(x >> shift, y >> shift, ancestor_z)
}

/// `(offset_x, offset_y, scale)`: the child tile's position within its
/// ancestor's footprint, in units of child tiles, and the per-axis zoom
/// factor between the two levels.
pub fn offset_within_ancestor(x: u32, y: u32, z: u8, ancestor_z: u8) -> (u32, u32, u32) {
	let shift = z - ancestor_z;
	let scale = 1u32 << shift;
	(x & (scale - 1), y & (scale - 1), scale)
}

/// Crops the sub-rectangle of `ancestor` that `(offset_x, offset_y)` at
/// `scale` covers, then nearest-neighbor upsamples it back to `tile_sx x
/// tile_sy`. `ancestor` must already be exactly one tile (`tile_sx x
/// tile_sy`) of raw RGBA.
pub fn crop_and_upsample(ancestor: &ImageBuffer, offset_x: u32, offset_y: u32, scale: u32, tile_sx: u32, tile_sy: u32) -> anyhow::Result<ImageBuffer> {
	let raw = ancestor.raw_rgba.as_ref().ok_or_else(|| anyhow::anyhow!("ancestor image has no raw_rgba"))?;
	anyhow::ensure!(
		ancestor.width == tile_sx && ancestor.height == tile_sy,
		"ancestor image ({}x{}) doesn't match the grid's tile size ({tile_sx}x{tile_sy})",
		ancestor.width,
		ancestor.height
	);

	let mut out = Vec::with_capacity((tile_sx * tile_sy * 4) as usize);
	for oy in 0..tile_sy {
		let src_row = (offset_y * tile_sy + oy) / scale;
		for ox in 0..tile_sx {
			let src_col = (offset_x * tile_sx + ox) / scale;
			let idx = ((src_row * tile_sx + src_col) * 4) as usize;
			out.extend_from_slice(&raw[idx..idx + 4]);
		}
	}
	Ok(ImageBuffer::from_raw(tile_sx, tile_sy, out))
}
