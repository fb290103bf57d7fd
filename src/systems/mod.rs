mod spheroid_normal_system;

pub use spheroid_normal_system::{
    spheroid_normal_join_system, spheroid_normal_lifecycle_system, spheroid_normal_publish_system,
    spheroid_normal_removed_system, spheroid_normal_schedule_system,
};
