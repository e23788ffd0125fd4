pub mod capture;

pub use capture::{FrameSource, OpenCvCamera, VideoFile};
