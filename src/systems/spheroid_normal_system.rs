use bevy::{
    asset::LoadState,
    pbr::MeshMaterial3d,
    prelude::*,
    render::{mesh::skinning::SkinnedMesh, storage::ShaderStorageBuffer},
};

use crate::{
    components::{SpheroidNormalController, SpheroidNormalState},
    error::SpheroidNormalError,
    pipeline::{PipelineSource, SkinSource},
    render::{instantiate_material, SpheroidNormalBuffers, SpheroidNormalMaterial, SpheroidNormalParams},
    resources::SpheroidNormalSettings,
};

/// Releases the state left behind when a controller is removed from a live entity.
pub fn spheroid_normal_removed_system(
    mut commands: Commands,
    mut query: Query<(Entity, &mut SpheroidNormalState), Without<SpheroidNormalController>>,
    mut spheroid_materials: Option<ResMut<Assets<SpheroidNormalMaterial>>>,
) {
    for (entity, mut state) in query.iter_mut() {
        if state.is_allocated() {
            log::info!("[SPHEROID NORMAL] controller removed from {:?}, releasing", entity);
            state.release();
            unbind_material(&state, spheroid_materials.as_deref_mut());
        }
        commands.entity(entity).remove::<SpheroidNormalState>();
    }
}

/// Maps controller activation onto initialize/release.
pub fn spheroid_normal_lifecycle_system(
    mut commands: Commands,
    mut query: Query<(
        Entity,
        &SpheroidNormalController,
        &mut SpheroidNormalState,
        Option<&Mesh3d>,
        Option<&SkinnedMesh>,
        Option<&MeshMaterial3d<SpheroidNormalMaterial>>,
        Option<&MeshMaterial3d<StandardMaterial>>,
    )>,
    meshes: Res<Assets<Mesh>>,
    asset_server: Option<Res<AssetServer>>,
    mut storage_buffers: ResMut<Assets<ShaderStorageBuffer>>,
    mut spheroid_materials: Option<ResMut<Assets<SpheroidNormalMaterial>>>,
    standard_materials: Option<Res<Assets<StandardMaterial>>>,
) {
    for (entity, controller, mut state, mesh3d, skinned_mesh, spheroid_material, standard_material) in
        query.iter_mut()
    {
        let state: &mut SpheroidNormalState = &mut state;

        if !controller.enabled {
            if state.is_allocated() {
                log::info!("[SPHEROID NORMAL] {:?} disabled, releasing", entity);
                state.release();
                unbind_material(state, spheroid_materials.as_deref_mut());
            }
            // A disable/enable cycle is what clears a configuration fault.
            state.fault = None;
            continue;
        }

        if state.fault.is_some() {
            continue;
        }

        if state.is_allocated() {
            state.assert_internal_state(true);
            continue;
        }

        let (Some(mesh3d), Some(skinned_mesh)) = (mesh3d, skinned_mesh) else {
            continue;
        };

        let Some(mesh) = meshes.get(&mesh3d.0) else {
            let failed = asset_server
                .as_deref()
                .and_then(|asset_server| asset_server.get_load_state(&mesh3d.0))
                .is_some_and(|load_state| matches!(load_state, LoadState::Failed(_)));
            if failed {
                log::error!(
                    "[SPHEROID NORMAL] mesh for {:?} failed to load, controller disabled",
                    entity
                );
                state.fault = Some(SpheroidNormalError::MissingSkinSource);
            }
            continue;
        };

        let result = state.pipeline.initialize(|| {
            let skin = SkinSource::from_mesh(mesh, skinned_mesh.joints.len())?;
            PipelineSource::new(skin, skinned_mesh.joints.clone())
        });

        match result {
            Ok(true) => {
                let (Some(skin), Some(initial)) =
                    (state.pipeline.skin_source(), state.pipeline.latest_results())
                else {
                    continue;
                };
                state.buffers = Some(SpheroidNormalBuffers::create(&mut storage_buffers, skin, initial));

                if state.material.is_none() {
                    if let Some(materials) = spheroid_materials.as_deref_mut() {
                        state.material = instantiate_material(
                            materials,
                            standard_materials.as_deref(),
                            spheroid_material.map(|material| &material.0),
                            standard_material.map(|material| &material.0),
                        );
                        if let Some(material) = &state.material {
                            commands
                                .entity(entity)
                                .remove::<MeshMaterial3d<StandardMaterial>>()
                                .insert(MeshMaterial3d(material.clone()));
                        }
                    }
                }
                sync_material(state, controller, spheroid_materials.as_deref_mut(), true);

                state.assert_internal_state(true);
                log::info!(
                    "[SPHEROID NORMAL] {:?} initialized with {} bones, {} vertices",
                    entity,
                    skinned_mesh.joints.len(),
                    mesh.count_vertices()
                );
            }
            Ok(false) => {}
            Err(error) => {
                log::error!("[SPHEROID NORMAL] {:?} cannot be initialized: {}", entity, error);
                state.fault = Some(error);
            }
        }
    }
}

/// Samples the skeleton and schedules this frame's jobs. Runs after transform propagation.
pub fn spheroid_normal_schedule_system(
    settings: Res<SpheroidNormalSettings>,
    mut query: Query<(
        Entity,
        &SpheroidNormalController,
        &mut SpheroidNormalState,
        Option<&GlobalTransform>,
    )>,
    joints: Query<&GlobalTransform>,
) {
    for (entity, controller, mut state, root_transform) in query.iter_mut() {
        if !controller.enabled || !state.is_allocated() {
            continue;
        }

        let Some(root_transform) = root_transform else {
            report_skipped_frame(&mut state, entity, "has no GlobalTransform");
            continue;
        };

        let world_to_object = root_transform.compute_matrix().inverse();
        let config = settings.frame_job_config(controller.mean_bone_positions);

        let scheduled = state
            .pipeline
            .schedule_frame(config, world_to_object, |joint_entities, bone_world_positions| {
                for (joint, bone_world_position) in joint_entities.iter().zip(bone_world_positions.iter_mut()) {
                    let Ok(joint_transform) = joints.get(*joint) else {
                        return false;
                    };
                    *bone_world_position = joint_transform.translation();
                }
                true
            });

        if scheduled {
            state.skip_reported = false;
        } else {
            report_skipped_frame(&mut state, entity, "has a joint without a transform");
        }
    }
}

/// Warns on the first skipped frame of a run, later ones only at debug level.
fn report_skipped_frame(state: &mut SpheroidNormalState, entity: Entity, reason: &str) {
    state.skipped_frames += 1;
    if std::mem::replace(&mut state.skip_reported, true) {
        log::debug!("[SPHEROID NORMAL] {:?} {}, frame skipped", entity, reason);
    } else {
        log::warn!("[SPHEROID NORMAL] {:?} {}, skipping frames until it is resolved", entity, reason);
    }
}

/// The join point: completes every job scheduled this frame.
pub fn spheroid_normal_join_system(mut query: Query<&mut SpheroidNormalState>) {
    for mut state in query.iter_mut() {
        state.join_frame();
    }
}

/// Copies the joined results into the device buffers and forwards the shader toggles.
pub fn spheroid_normal_publish_system(
    mut query: Query<(&SpheroidNormalController, &mut SpheroidNormalState)>,
    mut storage_buffers: ResMut<Assets<ShaderStorageBuffer>>,
    mut spheroid_materials: Option<ResMut<Assets<SpheroidNormalMaterial>>>,
) {
    for (controller, mut state) in query.iter_mut() {
        let state: &mut SpheroidNormalState = &mut state;

        let mut published = false;
        if std::mem::take(&mut state.pending_publish) {
            if let (Some(buffers), Some(results)) = (state.buffers.as_mut(), state.pipeline.latest_results()) {
                buffers.publish(&mut storage_buffers, results);
                published = true;
            }
        }

        if state.is_allocated() {
            // New buffer contents only reach the shader once the material is marked modified.
            sync_material(state, controller, spheroid_materials.as_deref_mut(), published);
        }
    }
}

fn sync_material(
    state: &SpheroidNormalState,
    controller: &SpheroidNormalController,
    materials: Option<&mut Assets<SpheroidNormalMaterial>>,
    refresh: bool,
) {
    let (Some(materials), Some(handle), Some(buffers)) = (materials, &state.material, &state.buffers) else {
        return;
    };

    let params = SpheroidNormalParams::from_controller(controller, state.is_allocated());
    let up_to_date = materials
        .get(handle)
        .is_some_and(|material| material.extension.params == params && material.extension.is_bound_to(buffers));
    if up_to_date && !refresh {
        return;
    }

    if let Some(material) = materials.get_mut(handle) {
        material.extension.params = params;
        material.extension.bind(buffers);
    }
}

fn unbind_material(state: &SpheroidNormalState, materials: Option<&mut Assets<SpheroidNormalMaterial>>) {
    let (Some(materials), Some(handle)) = (materials, &state.material) else {
        return;
    };
    if let Some(material) = materials.get_mut(handle) {
        material.extension.params.enable_spheroid_normals = 0;
    }
}
