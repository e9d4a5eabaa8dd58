//! Bulk seeding engine (spec §4.9): iteration strategies, geometry
//! filtering, the examine-tile decision table, and the seed/delete/transfer
//! worker pipeline built on `tilecache_render`'s coordinator and renderer.

pub mod command;
pub mod examine;
pub mod geometry;
pub mod iteration;
pub mod logger;
pub mod queue;
pub mod seeder;
pub mod timespec;

pub use command::{Command, WorkItem};
pub use examine::{ExamineContext, SeedMode, examine_tile};
pub use geometry::{FilterStrategy, GeometryFilter};
pub use iteration::{DrillDownIter, IterationMode, LevelByLevelIter, MetatileAddress, read_retry_log};
pub use logger::{Logger, Report};
pub use seeder::{SeedPlan, run_seed};
pub use timespec::parse_timespec;
