use thiserror::Error;

/// Configuration defects detected while binding a skinned mesh to the pipeline.
///
/// These are fatal for the instance that raised them: the pipeline stays
/// unallocated and no frame is scheduled until the source is fixed and the
/// controller goes through a disable/enable cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpheroidNormalError {
    #[error("skinned mesh source is missing or failed to load")]
    MissingSkinSource,

    #[error("mesh has no {0} attribute")]
    MissingJointAttribute(&'static str),

    #[error("mesh attribute {0} has an unsupported vertex format")]
    UnsupportedJointFormat(&'static str),

    #[error("{attribute} has {actual} entries, expected {expected}")]
    VertexCountMismatch {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("skeleton has {actual} joints, expected {expected}")]
    BoneCountMismatch { expected: usize, actual: usize },

    #[error("vertex {vertex} references bone {bone_index} but the skeleton has {bone_count} bones")]
    BoneIndexOutOfRange {
        vertex: usize,
        bone_index: u32,
        bone_count: usize,
    },
}

pub type Result<T> = std::result::Result<T, SpheroidNormalError>;
