use bevy::prelude::*;

use crate::{
    error::SpheroidNormalError,
    pipeline::SpheroidNormalPipeline,
    render::{SpheroidNormalBuffers, SpheroidNormalMaterial},
    resources::SpheroidNormalSettings,
};

/// Attach to a skinned mesh entity to compute its mean bone positions every frame.
///
/// Toggling `enabled` drives the resource lifecycle: enabling allocates the
/// pipeline once the mesh is loaded, disabling releases it. The remaining
/// fields are shader toggles read every frame.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component, Default)]
#[require(SpheroidNormalState)]
pub struct SpheroidNormalController {
    pub enabled: bool,
    pub use_passthrough_mean_bone_position: bool,
    pub normal_hull: bool,
    pub normal_hull_scale: f32,
    /// Run the mean bone position stage. When off only bone positions are updated.
    pub mean_bone_positions: bool,
}

impl Default for SpheroidNormalController {
    fn default() -> Self {
        Self {
            enabled: true,
            use_passthrough_mean_bone_position: false,
            normal_hull: false,
            normal_hull_scale: 0.0,
            mean_bone_positions: true,
        }
    }
}

impl SpheroidNormalController {
    pub fn from_settings(settings: &SpheroidNormalSettings) -> Self {
        Self {
            use_passthrough_mean_bone_position: settings.defaults.use_passthrough_mean_bone_position,
            normal_hull: settings.defaults.normal_hull,
            normal_hull_scale: settings.defaults.normal_hull_scale,
            ..Default::default()
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_normal_hull(mut self, scale: f32) -> Self {
        self.normal_hull = true;
        self.normal_hull_scale = scale;
        self
    }
}

/// Runtime state owned by a controlled entity: the pipeline, its device
/// buffers and the per-instance material.
#[derive(Component, Default)]
pub struct SpheroidNormalState {
    pub(crate) pipeline: SpheroidNormalPipeline,
    pub(crate) buffers: Option<SpheroidNormalBuffers>,
    pub(crate) material: Option<Handle<SpheroidNormalMaterial>>,
    pub(crate) fault: Option<SpheroidNormalError>,
    pub(crate) pending_publish: bool,
    pub(crate) skipped_frames: u64,
    pub(crate) skip_reported: bool,
}

impl SpheroidNormalState {
    pub fn pipeline(&self) -> &SpheroidNormalPipeline {
        &self.pipeline
    }

    pub fn buffers(&self) -> Option<&SpheroidNormalBuffers> {
        self.buffers.as_ref()
    }

    pub fn material(&self) -> Option<&Handle<SpheroidNormalMaterial>> {
        self.material.as_ref()
    }

    /// Configuration defect that stopped this instance from initializing.
    pub fn fault(&self) -> Option<&SpheroidNormalError> {
        self.fault.as_ref()
    }

    /// Frames not scheduled because the root or a joint had no transform.
    pub fn skipped_frames(&self) -> u64 {
        self.skipped_frames
    }

    pub fn is_allocated(&self) -> bool {
        self.pipeline.is_allocated()
    }

    /// The pipeline and its device buffers exist together or not at all.
    pub fn assert_internal_state(&self, allocated: bool) {
        self.pipeline.assert_internal_state(allocated);
        debug_assert_eq!(self.buffers.is_some(), allocated);
    }

    /// Completes this frame's job; the results are published afterwards.
    pub fn join_frame(&mut self) {
        if self.pipeline.complete_frame().is_some() {
            self.pending_publish = true;
        }
    }

    /// Releases the pipeline and drops the device buffer handles.
    pub fn release(&mut self) {
        self.pipeline.release();
        self.buffers = None;
        self.pending_publish = false;
        self.skip_reported = false;
        self.assert_internal_state(false);
    }
}
