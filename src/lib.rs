pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::{SyncConfig, TaskRefresh};
pub use core::{run, SyncEngine, SyncReport};
pub use error::{ApiError, SyncError};
pub use logging::LogLevel;
pub use storage::{OpenListClient, RemoteFs};
