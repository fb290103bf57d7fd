//! Mean bone position pipeline
//!
//! Two data-parallel stages run every frame for each skinned mesh:
//! - the resolver maps each bone's world position into object space
//! - the aggregator blends, per vertex, the four referenced bone positions by
//!   their skin weights
//!
//! The aggregator is chained after the resolver through the frame job, and
//! results are only readable after the join point.

mod bone_positions;
mod frame_job;
mod lifecycle;
mod mean_bone_positions;
mod skin_source;

pub use bone_positions::{resolve_bone_position, resolve_bone_positions};
pub use frame_job::{FrameBuffers, FrameJob, FrameJobConfig};
pub use lifecycle::{FrameResults, PipelineSource, SpheroidNormalPipeline};
pub use mean_bone_positions::{aggregate_mean_bone_positions, mean_bone_position, DEFAULT_BATCH_SIZE};
pub use skin_source::SkinSource;
