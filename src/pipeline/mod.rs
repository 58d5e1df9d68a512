//! Tree walker: context, pending-work counter, exclusion rules and file filters, entry
//! classification, worker pool, error classification, and the build strategies that drive it.

pub mod context;
pub mod error_handler;
pub mod exclude;
pub mod filter;
pub mod metadata;
pub mod orchestrator;
pub mod pending;
pub mod walk;

pub use context::{ScanTask, WalkConfig, WalkReport};
pub use error_handler::{ScanErrorKind, classify_io_error};
pub use exclude::{ExcludeRules, is_denied};
pub use filter::{FileFilter, parse_size};
pub use metadata::{FileId, IdentitySet};
pub use orchestrator::{
    BuildJob, BuildStrategy, HelperScan, StrategyResult, TreeWalk, run_strategies,
    select_strategies,
};
pub use pending::PendingWork;
pub use walk::{WalkHandle, start_walk};
