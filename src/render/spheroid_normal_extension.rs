//! Material extension exposing the mean bone position buffers to shaders
//!
//! The four storage buffers keep their handles for as long as the owning
//! pipeline stays allocated; only their contents change, once per frame,
//! after the join point.

use bevy::pbr::{ExtendedMaterial, MaterialExtension, StandardMaterial};
use bevy::prelude::*;
use bevy::render::{render_resource::*, storage::ShaderStorageBuffer};

use crate::{components::SpheroidNormalController, pipeline::FrameResults, pipeline::SkinSource};

/// Binding names the consuming shaders are written against.
pub const BONE_INDICES_BINDING: &str = "BoneIndices";
pub const BONE_WEIGHTS_BINDING: &str = "BoneWeights";
pub const BONE_POSITIONS_BINDING: &str = "BonePositions";
pub const MEAN_BONE_POSITIONS_BINDING: &str = "MeanBonePositions";

pub const SPHEROID_NORMAL_PARAMS_BINDING_INDEX: u32 = 100;
pub const BONE_INDICES_BINDING_INDEX: u32 = 101;
pub const BONE_WEIGHTS_BINDING_INDEX: u32 = 102;
pub const BONE_POSITIONS_BINDING_INDEX: u32 = 103;
pub const MEAN_BONE_POSITIONS_BINDING_INDEX: u32 = 104;

pub type SpheroidNormalMaterial = ExtendedMaterial<StandardMaterial, SpheroidNormalExtension>;

/// Per-frame shader toggles, forwarded from [`SpheroidNormalController`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Reflect, ShaderType)]
pub struct SpheroidNormalParams {
    pub enable_spheroid_normals: u32,
    pub use_passthrough_mean_bone_position: u32,
    pub normal_hull: u32,
    pub normal_hull_scale: f32,
}

impl SpheroidNormalParams {
    pub fn from_controller(controller: &SpheroidNormalController, allocated: bool) -> Self {
        Self {
            enable_spheroid_normals: allocated as u32,
            use_passthrough_mean_bone_position: controller.use_passthrough_mean_bone_position as u32,
            normal_hull: controller.normal_hull as u32,
            normal_hull_scale: controller.normal_hull_scale,
        }
    }
}

#[derive(Asset, AsBindGroup, Reflect, Debug, Clone, Default)]
pub struct SpheroidNormalExtension {
    #[uniform(100)]
    pub params: SpheroidNormalParams,

    /// 4 x u32 per vertex
    #[storage(101, read_only)]
    pub bone_indices: Handle<ShaderStorageBuffer>,

    /// 4 x f32 per vertex
    #[storage(102, read_only)]
    pub bone_weights: Handle<ShaderStorageBuffer>,

    /// vec3 per bone, object space
    #[storage(103, read_only)]
    pub bone_positions: Handle<ShaderStorageBuffer>,

    /// vec3 per vertex, object space
    #[storage(104, read_only)]
    pub mean_bone_positions: Handle<ShaderStorageBuffer>,
}

impl MaterialExtension for SpheroidNormalExtension {}

impl SpheroidNormalExtension {
    pub fn is_bound_to(&self, buffers: &SpheroidNormalBuffers) -> bool {
        self.bone_indices == buffers.bone_indices
            && self.bone_weights == buffers.bone_weights
            && self.bone_positions == buffers.bone_positions
            && self.mean_bone_positions == buffers.mean_bone_positions
    }

    pub fn bind(&mut self, buffers: &SpheroidNormalBuffers) {
        self.bone_indices = buffers.bone_indices.clone();
        self.bone_weights = buffers.bone_weights.clone();
        self.bone_positions = buffers.bone_positions.clone();
        self.mean_bone_positions = buffers.mean_bone_positions.clone();
    }
}

/// Device-visible mirrors of one pipeline's buffers.
#[derive(Debug, Clone)]
pub struct SpheroidNormalBuffers {
    pub bone_indices: Handle<ShaderStorageBuffer>,
    pub bone_weights: Handle<ShaderStorageBuffer>,
    pub bone_positions: Handle<ShaderStorageBuffer>,
    pub mean_bone_positions: Handle<ShaderStorageBuffer>,
    published_frames: u64,
}

impl SpheroidNormalBuffers {
    /// Uploads the static skin data and the initial (zeroed) position arrays.
    pub fn create(
        storage_buffers: &mut Assets<ShaderStorageBuffer>,
        skin: &SkinSource,
        initial: FrameResults,
    ) -> Self {
        Self {
            bone_indices: storage_buffers.add(ShaderStorageBuffer::from(skin.bone_indices().to_vec())),
            bone_weights: storage_buffers.add(ShaderStorageBuffer::from(skin.bone_weights().to_vec())),
            bone_positions: storage_buffers
                .add(ShaderStorageBuffer::from(initial.bone_positions.to_vec())),
            mean_bone_positions: storage_buffers
                .add(ShaderStorageBuffer::from(initial.mean_bone_positions.to_vec())),
            published_frames: 0,
        }
    }

    /// Refreshes the per-frame buffers in place; the handles are unchanged.
    pub fn publish(&mut self, storage_buffers: &mut Assets<ShaderStorageBuffer>, results: FrameResults) {
        if let Some(buffer) = storage_buffers.get_mut(&self.bone_positions) {
            buffer.set_data(results.bone_positions.to_vec());
        } else {
            log::warn!("[SPHEROID NORMAL] bone position buffer {:?} is gone", self.bone_positions.id());
        }

        if let Some(buffer) = storage_buffers.get_mut(&self.mean_bone_positions) {
            buffer.set_data(results.mean_bone_positions.to_vec());
        } else {
            log::warn!(
                "[SPHEROID NORMAL] mean bone position buffer {:?} is gone",
                self.mean_bone_positions.id()
            );
        }

        self.published_frames += 1;
    }

    pub fn published_frames(&self) -> u64 {
        self.published_frames
    }
}

/// Creates a per-instance [`SpheroidNormalMaterial`] for an entity.
///
/// An entity already using a spheroid normal material gets its own copy so
/// that per-instance buffers never leak into other meshes sharing the asset.
/// An entity using a plain [`StandardMaterial`] gets it wrapped as the base.
pub fn instantiate_material(
    materials: &mut Assets<SpheroidNormalMaterial>,
    standard_materials: Option<&Assets<StandardMaterial>>,
    current: Option<&Handle<SpheroidNormalMaterial>>,
    current_standard: Option<&Handle<StandardMaterial>>,
) -> Option<Handle<SpheroidNormalMaterial>> {
    if let Some(material) = current.and_then(|handle| materials.get(handle)) {
        let instance = material.clone();
        return Some(materials.add(instance));
    }

    let base = current_standard.and_then(|handle| standard_materials?.get(handle))?;
    Some(materials.add(SpheroidNormalMaterial {
        base: base.clone(),
        extension: SpheroidNormalExtension::default(),
    }))
}

pub struct SpheroidNormalMaterialPlugin;

impl Plugin for SpheroidNormalMaterialPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<SpheroidNormalExtension>()
            .add_plugins(MaterialPlugin::<SpheroidNormalMaterial>::default());
        log::info!(
            "[SPHEROID NORMAL] material bindings: {}={}, {}={}, {}={}, {}={}",
            BONE_INDICES_BINDING,
            BONE_INDICES_BINDING_INDEX,
            BONE_WEIGHTS_BINDING,
            BONE_WEIGHTS_BINDING_INDEX,
            BONE_POSITIONS_BINDING,
            BONE_POSITIONS_BINDING_INDEX,
            MEAN_BONE_POSITIONS_BINDING,
            MEAN_BONE_POSITIONS_BINDING_INDEX
        );
    }
}
