use bevy::{
    ecs::entity::Entity,
    math::{Mat4, Vec3},
    tasks::{AsyncComputeTaskPool, TaskPool},
};

use super::{
    frame_job::{FrameBuffers, FrameJob, FrameJobConfig},
    skin_source::SkinSource,
};
use crate::error::{Result, SpheroidNormalError};

/// Everything a pipeline needs to allocate: the skin data and the joint list
/// used to sample bone transforms each frame.
#[derive(Debug, Clone)]
pub struct PipelineSource {
    skin: SkinSource,
    joints: Vec<Entity>,
}

impl PipelineSource {
    pub fn new(skin: SkinSource, joints: Vec<Entity>) -> Result<Self> {
        if joints.len() != skin.bone_count() {
            return Err(SpheroidNormalError::BoneCountMismatch {
                expected: skin.bone_count(),
                actual: joints.len(),
            });
        }
        Ok(Self { skin, joints })
    }
}

/// Read-only view of the latest completed frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameResults<'a> {
    pub bone_positions: &'a [Vec3],
    pub mean_bone_positions: &'a [Vec3],
}

enum FrameSlot {
    Idle(FrameBuffers),
    InFlight(FrameJob),
}

impl FrameSlot {
    fn is_in_flight(&self) -> bool {
        matches!(self, FrameSlot::InFlight(_))
    }
}

struct AllocatedResources {
    skin: SkinSource,
    joints: Vec<Entity>,
    frame: FrameSlot,
}

impl AllocatedResources {
    /// Takes the frame buffers out of the slot, completing any outstanding job first.
    fn take_buffers(&mut self) -> FrameBuffers {
        match std::mem::replace(&mut self.frame, FrameSlot::Idle(FrameBuffers::default())) {
            FrameSlot::Idle(buffers) => buffers,
            FrameSlot::InFlight(job) => job.complete(),
        }
    }
}

enum PipelineState {
    Unallocated,
    Allocated(AllocatedResources),
}

/// Owns the buffers of one skinned mesh and drives its two-stage job.
///
/// The pipeline is either unallocated (nothing exists) or allocated (skin
/// data, joint list and frame buffers all exist and are consistently sized).
/// Transitions go through [`initialize`](Self::initialize) and
/// [`release`](Self::release), both of which tolerate being called from
/// either state.
pub struct SpheroidNormalPipeline {
    state: PipelineState,
    init_call_count: u32,
    release_call_count: u32,
    frames_completed: u64,
}

impl Default for SpheroidNormalPipeline {
    fn default() -> Self {
        Self {
            state: PipelineState::Unallocated,
            init_call_count: 0,
            release_call_count: 0,
            frames_completed: 0,
        }
    }
}

impl SpheroidNormalPipeline {
    /// Allocates the pipeline from the source produced by `source`.
    ///
    /// If the pipeline is already allocated the invariant is re-checked and
    /// nothing else happens; `source` is not called. Returns `Ok(true)` when a
    /// new allocation was made. On error the pipeline is left unallocated.
    pub fn initialize<F>(&mut self, source: F) -> Result<bool>
    where
        F: FnOnce() -> Result<PipelineSource>,
    {
        if self.is_allocated() {
            self.assert_internal_state(true);
            return Ok(false);
        }

        self.release();

        self.init_call_count += 1;
        log::info!(
            "[SPHEROID NORMAL] initialize() was called {} times",
            self.init_call_count
        );
        self.assert_internal_state(false);

        let PipelineSource { skin, joints } = source()?;
        let frame = FrameBuffers::new(skin.bone_count(), skin.vertex_count());
        log::debug!(
            "[SPHEROID NORMAL] allocating {} bones, {} vertices",
            skin.bone_count(),
            skin.vertex_count()
        );

        self.state = PipelineState::Allocated(AllocatedResources {
            skin,
            joints,
            frame: FrameSlot::Idle(frame),
        });
        self.assert_internal_state(true);
        Ok(true)
    }

    /// Frees every buffer. Outstanding work is completed before anything is dropped.
    pub fn release(&mut self) {
        self.release_call_count += 1;
        log::info!(
            "[SPHEROID NORMAL] release() was called {} times",
            self.release_call_count
        );

        if let PipelineState::Allocated(resources) = &mut self.state {
            resources.take_buffers();
        }
        self.state = PipelineState::Unallocated;
        self.assert_internal_state(false);
    }

    /// Samples the skeleton and schedules both stages for this frame.
    ///
    /// `sample` receives the joint list and the bone world position buffer to
    /// fill; returning `false` (a joint could not be sampled) skips the frame.
    /// Any job still outstanding from a previous frame is completed before its
    /// buffers are reused. Returns whether a job was scheduled.
    pub fn schedule_frame<F>(&mut self, config: FrameJobConfig, world_to_object: Mat4, sample: F) -> bool
    where
        F: FnOnce(&[Entity], &mut [Vec3]) -> bool,
    {
        let PipelineState::Allocated(resources) = &mut self.state else {
            return false;
        };

        let mut buffers = resources.take_buffers();
        if !sample(&resources.joints, &mut buffers.bone_world_positions) {
            resources.frame = FrameSlot::Idle(buffers);
            return false;
        }

        let pool: &TaskPool = AsyncComputeTaskPool::get_or_init(TaskPool::default);
        let job = FrameJob::schedule(pool, world_to_object, resources.skin.clone(), buffers, config);
        resources.frame = FrameSlot::InFlight(job);
        true
    }

    /// The join point: completes the outstanding frame job, if any, and returns its results.
    pub fn complete_frame(&mut self) -> Option<FrameResults<'_>> {
        match &mut self.state {
            PipelineState::Allocated(resources) if resources.frame.is_in_flight() => {
                let buffers = resources.take_buffers();
                resources.frame = FrameSlot::Idle(buffers);
            }
            _ => return None,
        }

        self.frames_completed += 1;
        self.latest_results()
    }

    /// Results of the last completed frame, unless a job is currently running.
    pub fn latest_results(&self) -> Option<FrameResults<'_>> {
        match &self.state {
            PipelineState::Allocated(AllocatedResources {
                frame: FrameSlot::Idle(buffers),
                ..
            }) => Some(FrameResults {
                bone_positions: &buffers.bone_positions,
                mean_bone_positions: &buffers.mean_bone_positions,
            }),
            _ => None,
        }
    }

    /// Checks the all-or-nothing allocation invariant.
    pub fn assert_internal_state(&self, allocated: bool) {
        match &self.state {
            PipelineState::Allocated(resources) => {
                debug_assert!(allocated, "pipeline is allocated but expected unallocated");
                let skin = &resources.skin;
                debug_assert_eq!(skin.bone_indices().len(), skin.vertex_count());
                debug_assert_eq!(skin.bone_weights().len(), skin.vertex_count());
                debug_assert_eq!(resources.joints.len(), skin.bone_count());
                if let FrameSlot::Idle(buffers) = &resources.frame {
                    debug_assert_eq!(buffers.bone_world_positions.len(), skin.bone_count());
                    debug_assert_eq!(buffers.bone_count(), skin.bone_count());
                    debug_assert_eq!(buffers.vertex_count(), skin.vertex_count());
                }
            }
            PipelineState::Unallocated => {
                debug_assert!(!allocated, "pipeline is unallocated but expected allocated");
            }
        }
    }

    pub fn is_allocated(&self) -> bool {
        matches!(self.state, PipelineState::Allocated(_))
    }

    pub fn is_in_flight(&self) -> bool {
        match &self.state {
            PipelineState::Allocated(resources) => resources.frame.is_in_flight(),
            PipelineState::Unallocated => false,
        }
    }

    pub fn skin_source(&self) -> Option<&SkinSource> {
        match &self.state {
            PipelineState::Allocated(resources) => Some(&resources.skin),
            PipelineState::Unallocated => None,
        }
    }

    pub fn joints(&self) -> &[Entity] {
        match &self.state {
            PipelineState::Allocated(resources) => &resources.joints,
            PipelineState::Unallocated => &[],
        }
    }

    pub fn init_call_count(&self) -> u32 {
        self.init_call_count
    }

    pub fn release_call_count(&self) -> u32 {
        self.release_call_count
    }

    pub fn frames_completed(&self) -> u64 {
        self.frames_completed
    }
}

impl Drop for SpheroidNormalPipeline {
    fn drop(&mut self) {
        if self.is_allocated() {
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{mean_bone_position, resolve_bone_position};
    use bevy::math::{Quat, UVec4, Vec4};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const CONFIG: FrameJobConfig = FrameJobConfig {
        batch_size: 32,
        mean_bone_positions: true,
    };

    fn joints(count: usize) -> Vec<Entity> {
        (0..count as u32).map(Entity::from_raw).collect()
    }

    fn source(indices: Vec<UVec4>, weights: Vec<Vec4>, bone_count: usize) -> impl FnOnce() -> Result<PipelineSource> {
        move || PipelineSource::new(SkinSource::from_parts(indices, weights, bone_count)?, joints(bone_count))
    }

    fn run_frame(pipeline: &mut SpheroidNormalPipeline, world_to_object: Mat4, world: &[Vec3]) -> bool {
        pipeline.schedule_frame(CONFIG, world_to_object, |_, out| {
            out.copy_from_slice(world);
            true
        })
    }

    #[test]
    fn test_single_bone_identity_scenario() {
        let mut pipeline = SpheroidNormalPipeline::default();
        pipeline
            .initialize(source(vec![UVec4::ZERO], vec![Vec4::new(1.0, 0.0, 0.0, 0.0)], 1))
            .unwrap();

        let bone = Vec3::new(0.3, 1.7, -2.0);
        assert!(run_frame(&mut pipeline, Mat4::IDENTITY, &[bone]));
        let results = pipeline.complete_frame().unwrap();

        assert_eq!(results.bone_positions, &[bone]);
        assert_eq!(results.mean_bone_positions, &[bone]);
    }

    #[test]
    fn test_two_bone_midpoint_scenario() {
        let mut pipeline = SpheroidNormalPipeline::default();
        pipeline
            .initialize(source(
                vec![UVec4::new(0, 1, 0, 0)],
                vec![Vec4::new(0.5, 0.5, 0.0, 0.0)],
                2,
            ))
            .unwrap();

        run_frame(&mut pipeline, Mat4::IDENTITY, &[Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)]);
        let results = pipeline.complete_frame().unwrap();
        assert_eq!(results.mean_bone_positions, &[Vec3::new(1.0, 0.0, 0.0)]);
    }

    #[test]
    fn test_out_of_range_index_fails_before_scheduling() {
        let mut pipeline = SpheroidNormalPipeline::default();
        let error = pipeline
            .initialize(source(vec![UVec4::new(0, 3, 0, 0)], vec![Vec4::X], 2))
            .unwrap_err();

        assert!(matches!(error, SpheroidNormalError::BoneIndexOutOfRange { bone_index: 3, .. }));
        assert!(!pipeline.is_allocated());
        assert!(!run_frame(&mut pipeline, Mat4::IDENTITY, &[]));
        assert!(pipeline.complete_frame().is_none());
    }

    #[test]
    fn test_joint_count_mismatch_is_rejected() {
        let mut pipeline = SpheroidNormalPipeline::default();
        let error = pipeline
            .initialize(|| {
                PipelineSource::new(SkinSource::from_parts(vec![UVec4::ZERO], vec![Vec4::X], 2)?, joints(3))
            })
            .unwrap_err();
        assert_eq!(error, SpheroidNormalError::BoneCountMismatch { expected: 2, actual: 3 });
        assert!(!pipeline.is_allocated());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut pipeline = SpheroidNormalPipeline::default();
        assert!(pipeline
            .initialize(source(vec![UVec4::ZERO; 4], vec![Vec4::X; 4], 1))
            .unwrap());
        run_frame(&mut pipeline, Mat4::IDENTITY, &[Vec3::ONE]);
        pipeline.complete_frame();

        let before_skin = pipeline.skin_source().cloned();
        let before_ptr = pipeline.latest_results().unwrap().mean_bone_positions.as_ptr();
        let before_mean = pipeline.latest_results().unwrap().mean_bone_positions.to_vec();

        let newly_allocated = pipeline
            .initialize(|| panic!("source must not be read while allocated"))
            .unwrap();

        assert!(!newly_allocated);
        assert_eq!(pipeline.init_call_count(), 1);
        assert_eq!(pipeline.skin_source().cloned(), before_skin);
        let after = pipeline.latest_results().unwrap();
        assert_eq!(after.mean_bone_positions.as_ptr(), before_ptr);
        assert_eq!(after.mean_bone_positions, before_mean.as_slice());
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut pipeline = SpheroidNormalPipeline::default();
        pipeline
            .initialize(source(vec![UVec4::ZERO], vec![Vec4::X], 1))
            .unwrap();

        pipeline.release();
        pipeline.release();

        assert!(!pipeline.is_allocated());
        assert!(pipeline.latest_results().is_none());
        assert!(pipeline.joints().is_empty());
    }

    #[test]
    fn test_release_completes_in_flight_work() {
        let mut pipeline = SpheroidNormalPipeline::default();
        pipeline
            .initialize(source(vec![UVec4::ZERO; 1000], vec![Vec4::X; 1000], 1))
            .unwrap();
        run_frame(&mut pipeline, Mat4::IDENTITY, &[Vec3::ONE]);
        assert!(pipeline.is_in_flight());

        pipeline.release();

        assert!(!pipeline.is_in_flight());
        assert!(!pipeline.is_allocated());
    }

    #[test]
    fn test_reinitialize_reproduces_skin_data() {
        let indices = vec![UVec4::new(0, 1, 2, 0), UVec4::new(2, 2, 1, 0)];
        let weights = vec![Vec4::new(0.7, 0.2, 0.1, 0.0), Vec4::new(0.5, 0.25, 0.25, 0.0)];

        let mut pipeline = SpheroidNormalPipeline::default();
        pipeline
            .initialize(source(indices.clone(), weights.clone(), 3))
            .unwrap();
        let first = pipeline.skin_source().cloned().unwrap();

        pipeline.release();
        pipeline
            .initialize(source(indices, weights, 3))
            .unwrap();

        assert_eq!(pipeline.skin_source(), Some(&first));
        assert_eq!(pipeline.init_call_count(), 2);
        // initialize() starts with a release, plus the explicit one.
        assert_eq!(pipeline.release_call_count(), 3);
    }

    #[test]
    fn test_scheduling_again_completes_the_previous_frame() {
        let mut pipeline = SpheroidNormalPipeline::default();
        pipeline
            .initialize(source(vec![UVec4::ZERO], vec![Vec4::X], 1))
            .unwrap();

        run_frame(&mut pipeline, Mat4::IDENTITY, &[Vec3::X]);
        run_frame(&mut pipeline, Mat4::IDENTITY, &[Vec3::Y]);
        let results = pipeline.complete_frame().unwrap();

        assert_eq!(results.bone_positions, &[Vec3::Y]);
        assert_eq!(pipeline.frames_completed(), 1);
    }

    #[test]
    fn test_failed_sample_skips_the_frame() {
        let mut pipeline = SpheroidNormalPipeline::default();
        pipeline
            .initialize(source(vec![UVec4::ZERO], vec![Vec4::X], 1))
            .unwrap();

        let scheduled = pipeline.schedule_frame(CONFIG, Mat4::IDENTITY, |_, _| false);

        assert!(!scheduled);
        assert!(pipeline.complete_frame().is_none());
        pipeline.assert_internal_state(true);
    }

    #[test]
    fn test_randomized_frames_never_observe_partial_bone_positions() {
        const BONES: usize = 8;
        const VERTICES: usize = 64;
        let mut rng = StdRng::seed_from_u64(0x5eed);

        let indices: Vec<UVec4> = (0..VERTICES)
            .map(|_| {
                UVec4::new(
                    rng.gen_range(0..BONES as u32),
                    rng.gen_range(0..BONES as u32),
                    rng.gen_range(0..BONES as u32),
                    rng.gen_range(0..BONES as u32),
                )
            })
            .collect();
        let weights: Vec<Vec4> = (0..VERTICES)
            .map(|_| Vec4::new(rng.gen(), rng.gen(), rng.gen(), rng.gen()))
            .collect();

        let mut pipeline = SpheroidNormalPipeline::default();
        pipeline
            .initialize(source(indices.clone(), weights.clone(), BONES))
            .unwrap();

        let config = FrameJobConfig {
            batch_size: 5,
            mean_bone_positions: true,
        };
        for _ in 0..10_000 {
            let world: Vec<Vec3> = (0..BONES)
                .map(|_| Vec3::new(rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0)))
                .collect();
            let world_to_object = Mat4::from_rotation_translation(
                Quat::from_rotation_z(rng.gen_range(0.0..6.28)),
                Vec3::new(rng.gen_range(-5.0..5.0), 0.0, rng.gen_range(-5.0..5.0)),
            )
            .inverse();

            assert!(pipeline.schedule_frame(config, world_to_object, |_, out| {
                out.copy_from_slice(&world);
                true
            }));
            let results = pipeline.complete_frame().unwrap();

            let expected_bones: Vec<Vec3> = world
                .iter()
                .map(|p| resolve_bone_position(&world_to_object, *p))
                .collect();
            assert_eq!(results.bone_positions, expected_bones.as_slice());
            for v in 0..VERTICES {
                assert_eq!(
                    results.mean_bone_positions[v],
                    mean_bone_position(&expected_bones, indices[v], weights[v])
                );
            }
        }
        assert_eq!(pipeline.frames_completed(), 10_000);
    }
}
