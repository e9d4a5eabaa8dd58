//! Cache key template expansion (spec §3.6, §4.2).

use crate::tile::Tile;

pub const DEFAULT_TEMPLATE: &str = "{tileset}/{grid}[/{dim}]/{z}/{y}/{x}.{ext}";
const DEFAULT_REJECT: &str = "/.";
const DEFAULT_ESCAPE: char = '#';

/// `quadkey` encoding: for each zoom 1..z, bit k of x contributes 1 and bit k
/// of y contributes 2 to the corresponding character (spec §4.2, scenario S2).
pub fn encode_quadkey(x: u32, y: u32, z: u8) -> String {
	let mut s = String::with_capacity(z as usize);
	for i in (1..=z).rev() {
		let mask = 1u32 << (i - 1);
		let mut digit = 0u8;
		if x & mask != 0 {
			digit += 1;
		}
		if y & mask != 0 {
			digit += 2;
		}
		s.push((b'0' + digit) as char);
	}
	s
}

pub fn decode_quadkey(quadkey: &str) -> anyhow::Result<(u32, u32, u8)> {
	let mut x = 0u32;
	let mut y = 0u32;
	let z = quadkey.len() as u8;
	for (i, c) in quadkey.chars().enumerate() {
		let shift = z as u32 - 1 - i as u32;
		let digit = c.to_digit(10).ok_or_else(|| anyhow::anyhow!("invalid quadkey digit '{c}'"))?;
		anyhow::ensure!(digit <= 3, "invalid quadkey digit '{c}'");
		if digit & 1 != 0 {
			x |= 1 << shift;
		}
		if digit & 2 != 0 {
			y |= 1 << shift;
		}
	}
	Ok((x, y, z))
}

fn sanitize(value: &str, reject: &str, escape: char) -> String {
	value.chars().map(|c| if reject.contains(c) { escape } else { c }).collect()
}

/// `{dim}` expands to `#name1#value1#name2#value2...`; cached values are
/// sanitized the same way `{dim:NAME}` is (spec §3.6).
fn dim_block(tile: &Tile, reject: &str, escape: char) -> String {
	let mut s = String::new();
	for entry in &tile.dimensions.entries {
		let value = entry.cached_value.as_deref().unwrap_or(&entry.requested_value);
		s.push(escape);
		s.push_str(&entry.dimension);
		s.push(escape);
		s.push_str(&sanitize(value, reject, escape));
	}
	s
}

pub struct KeyTemplate<'a> {
	pub template: &'a str,
	pub reject: &'a str,
	pub escape: char,
	pub ext: &'a str,
}

impl<'a> Default for KeyTemplate<'a> {
	fn default() -> Self {
		KeyTemplate {
			template: DEFAULT_TEMPLATE,
			reject: DEFAULT_REJECT,
			escape: DEFAULT_ESCAPE,
			ext: "png",
		}
	}
}

/// `util_get_tile_key(tile, template) -> key` (spec §4.2). Performs literal
/// substitution for every token in §3.6; unknown `{...}` sequences are left
/// verbatim; the `[...]` optional-section syntax is dropped if it contains
/// only `{dim}`/`{dim:NAME}` and the dimension set is empty.
pub fn get_tile_key(tile: &Tile, opts: &KeyTemplate) -> String {
	let dim_all = dim_block(tile, opts.reject, opts.escape);
	let has_dims = !tile.dimensions.is_empty();

	let mut out = String::new();
	let mut chars = opts.template.chars().peekable();
	while let Some(c) = chars.next() {
		match c {
			'[' => {
				// collect up to matching ']', only emit if dimensions are present
				let mut inner = String::new();
				for ic in chars.by_ref() {
					if ic == ']' {
						break;
					}
					inner.push(ic);
				}
				if has_dims {
					out.push_str(&expand_tokens(&inner, tile, &dim_all, opts));
				}
			}
			'{' => {
				let mut token = String::new();
				let mut closed = false;
				for tc in chars.by_ref() {
					if tc == '}' {
						closed = true;
						break;
					}
					token.push(tc);
				}
				if closed {
					out.push_str(&expand_token(&token, tile, &dim_all, opts));
				} else {
					out.push('{');
					out.push_str(&token);
				}
			}
			other => out.push(other),
		}
	}
	out
}

fn expand_tokens(s: &str, tile: &Tile, dim_all: &str, opts: &KeyTemplate) -> String {
	let mut out = String::new();
	let mut chars = s.chars().peekable();
	while let Some(c) = chars.next() {
		if c == '{' {
			let mut token = String::new();
			let mut closed = false;
			for tc in chars.by_ref() {
				if tc == '}' {
					closed = true;
					break;
				}
				token.push(tc);
			}
			if closed {
				out.push_str(&expand_token(&token, tile, dim_all, opts));
			}
		} else {
			out.push(c);
		}
	}
	out
}

fn expand_token(token: &str, tile: &Tile, dim_all: &str, opts: &KeyTemplate) -> String {
	if let Some(name) = token.strip_prefix("dim:") {
		return tile
			.dimensions
			.get(name)
			.map(|e| sanitize(e.cached_value.as_deref().unwrap_or(&e.requested_value), opts.reject, opts.escape))
			.unwrap_or_default();
	}
	match token {
		"tileset" => tile.tileset.clone(),
		"grid" => tile.grid_link.clone(),
		"z" => tile.z.to_string(),
		"x" => tile.x.to_string(),
		"y" => tile.y.to_string(),
		"inv_x" => format!("{}", inv_index(tile.x, tile.z)),
		"inv_y" => format!("{}", inv_index(tile.y, tile.z)),
		"quadkey" => encode_quadkey(tile.x, tile.y, tile.z),
		"dim" => dim_all.clone(),
		"ext" => opts.ext.to_string(),
		_ => format!("{{{token}}}"),
	}
}

fn inv_index(v: u32, z: u8) -> u32 {
	let max = 1u32 << z;
	max.saturating_sub(1).saturating_sub(v)
}
