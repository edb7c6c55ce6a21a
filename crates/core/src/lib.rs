pub mod bounds;
pub mod cloud;
pub mod config;
pub mod error;
pub mod ops;

pub use bounds::{CellKey, GlobalBounds};
pub use cloud::{PointAttributes, PointCloud};
pub use config::{PointserveConfig, PoolsConfig, ServerConfig, WorkersConfig};
pub use error::CoreError;
pub use ops::{Algorithm, Variant};
