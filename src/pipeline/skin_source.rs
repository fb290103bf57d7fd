use std::sync::Arc;

use bevy::{
    math::{UVec4, Vec4},
    render::mesh::{Mesh, VertexAttributeValues},
};

use crate::error::{Result, SpheroidNormalError};

/// Per-vertex skin data copied once from the source mesh.
///
/// Bone indices and weights are stored exactly as authored; weights are not
/// renormalized. The arrays are shared read-only with in-flight frame jobs,
/// so they are never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SkinSource {
    bone_indices: Arc<[UVec4]>,
    bone_weights: Arc<[Vec4]>,
    bone_count: usize,
}

impl SkinSource {
    /// Builds a skin source from raw per-vertex arrays, checking that both
    /// arrays describe the same vertices and that every index addresses a bone.
    pub fn from_parts(
        bone_indices: Vec<UVec4>,
        bone_weights: Vec<Vec4>,
        bone_count: usize,
    ) -> Result<Self> {
        if bone_weights.len() != bone_indices.len() {
            return Err(SpheroidNormalError::VertexCountMismatch {
                attribute: "bone weights",
                expected: bone_indices.len(),
                actual: bone_weights.len(),
            });
        }

        for (vertex, bone_index) in bone_indices.iter().enumerate() {
            for component in bone_index.to_array() {
                if component as usize >= bone_count {
                    return Err(SpheroidNormalError::BoneIndexOutOfRange {
                        vertex,
                        bone_index: component,
                        bone_count,
                    });
                }
            }
        }

        Ok(Self {
            bone_indices: bone_indices.into(),
            bone_weights: bone_weights.into(),
            bone_count,
        })
    }

    /// Reads the joint index and joint weight attributes of a skinned mesh.
    pub fn from_mesh(mesh: &Mesh, bone_count: usize) -> Result<Self> {
        let vertex_count = mesh.count_vertices();

        let index_attribute = Mesh::ATTRIBUTE_JOINT_INDEX.name;
        let bone_indices: Vec<UVec4> = match mesh.attribute(Mesh::ATTRIBUTE_JOINT_INDEX) {
            Some(VertexAttributeValues::Uint16x4(values)) => values
                .iter()
                .map(|v| UVec4::new(v[0] as u32, v[1] as u32, v[2] as u32, v[3] as u32))
                .collect(),
            Some(VertexAttributeValues::Uint32x4(values)) => {
                values.iter().map(|v| UVec4::from_array(*v)).collect()
            }
            Some(_) => return Err(SpheroidNormalError::UnsupportedJointFormat(index_attribute)),
            None => return Err(SpheroidNormalError::MissingJointAttribute(index_attribute)),
        };

        let weight_attribute = Mesh::ATTRIBUTE_JOINT_WEIGHT.name;
        let bone_weights: Vec<Vec4> = match mesh.attribute(Mesh::ATTRIBUTE_JOINT_WEIGHT) {
            Some(VertexAttributeValues::Float32x4(values)) => {
                values.iter().map(|v| Vec4::from_array(*v)).collect()
            }
            Some(_) => return Err(SpheroidNormalError::UnsupportedJointFormat(weight_attribute)),
            None => return Err(SpheroidNormalError::MissingJointAttribute(weight_attribute)),
        };

        if bone_indices.len() != vertex_count {
            return Err(SpheroidNormalError::VertexCountMismatch {
                attribute: index_attribute,
                expected: vertex_count,
                actual: bone_indices.len(),
            });
        }

        Self::from_parts(bone_indices, bone_weights, bone_count)
    }

    pub fn vertex_count(&self) -> usize {
        self.bone_indices.len()
    }

    pub fn bone_count(&self) -> usize {
        self.bone_count
    }

    pub fn bone_indices(&self) -> &[UVec4] {
        &self.bone_indices
    }

    pub fn bone_weights(&self) -> &[Vec4] {
        &self.bone_weights
    }
}
