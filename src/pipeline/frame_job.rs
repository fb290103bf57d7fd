use bevy::{
    math::{Mat4, Vec3},
    tasks::{block_on, Task, TaskPool},
};

use super::{
    bone_positions::resolve_bone_positions, mean_bone_positions::aggregate_mean_bone_positions,
    skin_source::SkinSource,
};

/// The per-frame working set of one pipeline instance.
///
/// Sized once at initialization: `bone_world_positions` and `bone_positions`
/// hold one entry per bone, `mean_bone_positions` one entry per vertex.
#[derive(Debug, Default)]
pub struct FrameBuffers {
    pub bone_world_positions: Vec<Vec3>,
    pub bone_positions: Vec<Vec3>,
    pub mean_bone_positions: Vec<Vec3>,
}

impl FrameBuffers {
    pub fn new(bone_count: usize, vertex_count: usize) -> Self {
        Self {
            bone_world_positions: vec![Vec3::ZERO; bone_count],
            bone_positions: vec![Vec3::ZERO; bone_count],
            mean_bone_positions: vec![Vec3::ZERO; vertex_count],
        }
    }

    pub fn bone_count(&self) -> usize {
        self.bone_positions.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.mean_bone_positions.len()
    }
}

/// Scheduling parameters for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameJobConfig {
    pub batch_size: usize,
    /// Run the mean bone position stage after the resolver.
    pub mean_bone_positions: bool,
}

/// Handle to the two chained computations of a single frame.
///
/// The frame buffers are moved into the job when it is scheduled and can only
/// be recovered through [`FrameJob::complete`], so nothing can read them
/// before the join point or free them while the job is running.
#[must_use = "a frame job must be completed before its buffers can be reused"]
pub struct FrameJob {
    task: Task<FrameBuffers>,
}

impl FrameJob {
    pub fn schedule(
        pool: &TaskPool,
        world_to_object: Mat4,
        skin: SkinSource,
        buffers: FrameBuffers,
        config: FrameJobConfig,
    ) -> Self {
        let FrameBuffers {
            bone_world_positions,
            mut bone_positions,
            mut mean_bone_positions,
        } = buffers;
        let batch_size = config.batch_size;

        let resolve = pool.spawn(async move {
            resolve_bone_positions(
                world_to_object,
                &bone_world_positions,
                &mut bone_positions,
                batch_size,
            );
            (bone_world_positions, bone_positions)
        });

        let task = pool.spawn(async move {
            // Stage two reads the bone positions only once stage one has handed them over.
            let (bone_world_positions, bone_positions) = resolve.await;

            if config.mean_bone_positions {
                aggregate_mean_bone_positions(
                    &bone_positions,
                    skin.bone_indices(),
                    skin.bone_weights(),
                    &mut mean_bone_positions,
                    batch_size,
                );
            }

            FrameBuffers {
                bone_world_positions,
                bone_positions,
                mean_bone_positions,
            }
        });

        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Blocks until both stages have run and returns the frame buffers.
    pub fn complete(self) -> FrameBuffers {
        block_on(self.task)
    }
}
