//! Metatile render pipeline, cache coordination, and runtime configuration
//! (spec §4.4-§4.6, §6.1). Depends on `tilecache_core` for addressing and
//! geometry, `tilecache_cache` for storage, and `tilecache_lock` for
//! render-coalescing.

pub mod config;
pub mod coordinator;
pub mod image_codec;
pub mod merge;
pub mod overzoom;
pub mod renderer;
pub mod source;

pub use config::{Configuration, TilesetConfig};
pub use coordinator::Coordinator;
pub use image_codec::PngCodec;
pub use renderer::{Renderer, metatile_lock_key};
pub use source::{FallbackSource, RetryPolicy, RetrySource, SolidSource, Source};
