use bevy::math::{UVec4, Vec3, Vec4};
use rayon::prelude::*;

/// Default number of vertices handled by one aggregation batch.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Blends the four bones referenced by a vertex using its skin weights as-is.
#[inline]
pub fn mean_bone_position(bone_positions: &[Vec3], bone_index: UVec4, bone_weight: Vec4) -> Vec3 {
    debug_assert!((bone_index.x as usize) < bone_positions.len());
    debug_assert!((bone_index.y as usize) < bone_positions.len());
    debug_assert!((bone_index.z as usize) < bone_positions.len());
    debug_assert!((bone_index.w as usize) < bone_positions.len());

    bone_positions[bone_index.x as usize] * bone_weight.x
        + bone_positions[bone_index.y as usize] * bone_weight.y
        + bone_positions[bone_index.z as usize] * bone_weight.z
        + bone_positions[bone_index.w as usize] * bone_weight.w
}

/// Computes the mean bone position of every vertex in batches of `batch_size`.
///
/// `bone_positions` must hold the fully resolved positions for the current
/// frame; it is only read here.
pub fn aggregate_mean_bone_positions(
    bone_positions: &[Vec3],
    bone_indices: &[UVec4],
    bone_weights: &[Vec4],
    mean_bone_positions: &mut [Vec3],
    batch_size: usize,
) {
    debug_assert_eq!(bone_indices.len(), mean_bone_positions.len());
    debug_assert_eq!(bone_weights.len(), mean_bone_positions.len());

    let batch_size = batch_size.max(1);
    mean_bone_positions
        .par_chunks_mut(batch_size)
        .zip(bone_indices.par_chunks(batch_size))
        .zip(bone_weights.par_chunks(batch_size))
        .for_each(|((out, indices), weights)| {
            for ((mean, bone_index), bone_weight) in out.iter_mut().zip(indices).zip(weights) {
                *mean = mean_bone_position(bone_positions, *bone_index, *bone_weight);
            }
        });
}
