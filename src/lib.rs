#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

use bevy::{
    prelude::{App, IntoScheduleConfigs, Last, Plugin, PostUpdate, SystemSet},
    transform::TransformSystem,
};

pub mod components;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod resources;
pub mod systems;

pub use components::{SpheroidNormalController, SpheroidNormalState};
pub use error::SpheroidNormalError;
pub use render::{SpheroidNormalMaterial, SpheroidNormalMaterialPlugin};
pub use resources::SpheroidNormalSettings;

use systems::{
    spheroid_normal_join_system, spheroid_normal_lifecycle_system, spheroid_normal_publish_system,
    spheroid_normal_removed_system, spheroid_normal_schedule_system,
};

/// Frame phases of the mean bone position pipeline.
///
/// `Lifecycle` and `Schedule` run in [`PostUpdate`] once transforms are final,
/// `Join` and `Publish` run in [`Last`] so the jobs overlap everything in between.
#[derive(Debug, Clone, PartialEq, Eq, Hash, SystemSet)]
pub enum SpheroidNormalSystems {
    Lifecycle,
    Schedule,
    Join,
    Publish,
}

/// Drives [`SpheroidNormalController`] entities. Rendering is added separately
/// with [`SpheroidNormalMaterialPlugin`].
#[derive(Default)]
pub struct SpheroidNormalPlugin;

impl Plugin for SpheroidNormalPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<SpheroidNormalController>()
            .register_type::<SpheroidNormalSettings>()
            .init_resource::<SpheroidNormalSettings>();

        app.configure_sets(
            PostUpdate,
            (SpheroidNormalSystems::Lifecycle, SpheroidNormalSystems::Schedule)
                .chain()
                .after(TransformSystem::TransformPropagate),
        )
        .configure_sets(
            Last,
            (SpheroidNormalSystems::Join, SpheroidNormalSystems::Publish).chain(),
        );

        app.add_systems(
            PostUpdate,
            (
                (spheroid_normal_removed_system, spheroid_normal_lifecycle_system)
                    .chain()
                    .in_set(SpheroidNormalSystems::Lifecycle),
                spheroid_normal_schedule_system.in_set(SpheroidNormalSystems::Schedule),
            ),
        )
        .add_systems(
            Last,
            (
                spheroid_normal_join_system.in_set(SpheroidNormalSystems::Join),
                spheroid_normal_publish_system.in_set(SpheroidNormalSystems::Publish),
            ),
        );

        log::info!("[SPHEROID NORMAL] plugin registered");
    }
}
