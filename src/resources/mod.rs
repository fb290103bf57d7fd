mod spheroid_normal_settings;

pub use spheroid_normal_settings::{
    load_settings, read_settings, ControllerDefaults, SpheroidNormalSettings,
};
