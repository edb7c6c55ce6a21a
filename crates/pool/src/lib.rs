pub mod command;
pub mod error;
pub mod handle;
pub mod pool;
pub mod registry;

pub use command::{WireForm, WorkerCommand, worker_command};
pub use error::PoolError;
pub use handle::{HandleStatus, WorkerHandle};
pub use pool::ProcessPool;
pub use registry::PoolRegistry;
