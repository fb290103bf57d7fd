use bevy::math::{Mat4, Vec3};
use rayon::prelude::*;

/// Maps one bone's world position into the object space of the skinned mesh.
#[inline]
pub fn resolve_bone_position(world_to_object: &Mat4, bone_world_position: Vec3) -> Vec3 {
    world_to_object.transform_point3(bone_world_position)
}

/// Resolves every bone of a skeleton snapshot into object space.
///
/// Each output depends only on its own bone and the shared `world_to_object`
/// matrix, so bones are processed in independent batches.
pub fn resolve_bone_positions(
    world_to_object: Mat4,
    bone_world_positions: &[Vec3],
    bone_positions: &mut [Vec3],
    batch_size: usize,
) {
    debug_assert_eq!(bone_world_positions.len(), bone_positions.len());

    let batch_size = batch_size.max(1);
    bone_positions
        .par_chunks_mut(batch_size)
        .zip(bone_world_positions.par_chunks(batch_size))
        .for_each(|(out, world)| {
            for (bone_position, bone_world_position) in out.iter_mut().zip(world) {
                *bone_position = resolve_bone_position(&world_to_object, *bone_world_position);
            }
        });
}
