pub mod spheroid_normal_extension;
pub use spheroid_normal_extension::{
    instantiate_material, SpheroidNormalBuffers, SpheroidNormalExtension,
    SpheroidNormalMaterial, SpheroidNormalMaterialPlugin, SpheroidNormalParams,
    BONE_INDICES_BINDING, BONE_INDICES_BINDING_INDEX, BONE_POSITIONS_BINDING,
    BONE_POSITIONS_BINDING_INDEX, BONE_WEIGHTS_BINDING, BONE_WEIGHTS_BINDING_INDEX,
    MEAN_BONE_POSITIONS_BINDING, MEAN_BONE_POSITIONS_BINDING_INDEX,
    SPHEROID_NORMAL_PARAMS_BINDING_INDEX,
};
