mod centers;
mod downsample;
mod error;
mod smooth;
pub mod wire;

pub use centers::voxel_debug_centers;
pub use downsample::voxel_downsample;
pub use error::ToolError;
pub use smooth::{brute_force_smooth, smooth};
