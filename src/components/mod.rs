mod spheroid_normal_controller;

pub use spheroid_normal_controller::{SpheroidNormalController, SpheroidNormalState};
