//! RGBA compositing used by watermarking and `STACK` dimension assembly
//! (spec §4.4.4, §4.6), grounded on the integer alpha-blend style of
//! `versatiles_pipeline::operations::raster::raster_mask::blur_function`
//! (a small, table-free numeric helper with the same terse doc density).

use std::time::SystemTime;
use tilecache_core::tile::{Expires, ImageBuffer};

/// Premultiplied-alpha "over" compositing, `overlay` atop `base`, using the
/// `a/256` integer approximation from spec §4.4.4. Buffers must share
/// dimensions.
pub fn alpha_over(base: &ImageBuffer, overlay: &ImageBuffer) -> anyhow::Result<ImageBuffer> {
	anyhow::ensure!(base.width == overlay.width && base.height == overlay.height, "alpha_over requires matching dimensions");
	let base_raw = base.raw_rgba.as_ref().ok_or_else(|| anyhow::anyhow!("base image has no raw_rgba"))?;
	let overlay_raw = overlay.raw_rgba.as_ref().ok_or_else(|| anyhow::anyhow!("overlay image has no raw_rgba"))?;
	anyhow::ensure!(base_raw.len() == overlay_raw.len(), "pixel buffer length mismatch");

	let mut out = Vec::with_capacity(base_raw.len());
	for (b, o) in base_raw.chunks_exact(4).zip(overlay_raw.chunks_exact(4)) {
		let inv_a = 256 - o[3] as u32;
		for c in 0..4 {
			let blended = o[c] as u32 + (b[c] as u32 * inv_a) / 256;
			out.push(blended.min(255) as u8);
		}
	}
	Ok(ImageBuffer::from_raw(base.width, base.height, out))
}

/// Merged output inherits the earliest expiration and latest modification
/// time among inputs (spec §4.4.4).
pub fn merge_metadata(mtimes: &[Option<SystemTime>], expires: &[Expires]) -> (Option<SystemTime>, Expires) {
	let mtime = mtimes.iter().flatten().max().copied();
	let seconds = expires.iter().filter_map(|e| e.seconds).min();
	(mtime, Expires { seconds })
}
