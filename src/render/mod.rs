pub mod panel;
pub mod skeleton;
pub mod window;

pub use minifb::Key;
pub use panel::{FpsPanel, StatusPanel};
pub use skeleton::SKELETON_CONNECTIONS;
pub use window::MinifbRenderer;
