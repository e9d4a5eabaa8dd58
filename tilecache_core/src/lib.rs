//! Grid geometry, tile/metatile model, dimension requests, tile-key
//! derivation, and the shared error taxonomy for the tilecache engine.
//!
//! This crate has no knowledge of cache backends, sources, or concurrency —
//! those live in `tilecache_cache`, `tilecache_lock`, `tilecache_render`, and
//! `tilecache_seed`, which depend on it.

pub mod blank_png;
pub mod codec;
pub mod concurrency;
pub mod dimension;
pub mod error;
pub mod grid;
pub mod grid_link;
pub mod metatile;
pub mod progress;
pub mod tile;
pub mod tile_key;

pub use codec::TileCodec;
pub use dimension::{AssemblyType, Dimension, DimensionRequest, DimensionSet};
pub use error::{CacheError, Status};
pub use grid::{Extent, Grid, Level, Origin, TileLimits, Unit};
pub use grid_link::{GridLink, OutOfZoomStrategy};
pub use metatile::{Metatile, MetatileShape};
pub use tile::{Expires, FeatureInfoRequest, FeatureInfoResult, ImageBuffer, MapRequest, Tile};
pub use tile_key::{KeyTemplate, decode_quadkey, encode_quadkey, get_tile_key};
