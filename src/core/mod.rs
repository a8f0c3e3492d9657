pub mod comparator;
pub mod dirs;
pub mod engine;
pub mod filter;
pub mod path;
pub mod scanner;
pub mod task;

pub use comparator::{build_plan, CopyPlanItem, CopyReason};
pub use dirs::{ensure_dir, KnownDirs};
pub use engine::{run, SyncEngine, SyncReport};
pub use filter::PathFilter;
pub use scanner::{TreeScanner, TreeSnapshot};
pub use task::{build_task_key, parse_copy_task_key, PendingCopyTasks, TaskKey, TaskMatcher};
