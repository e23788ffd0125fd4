pub mod backend;
pub mod detector;
pub mod keypoint;
pub mod preprocess;

pub use detector::{resolve_model, ModelFamily, PoseDetector};
pub use keypoint::{Keypoint, KeypointIndex, Pose};
