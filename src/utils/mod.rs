pub mod config;
pub mod fd_limit;
pub mod logger;
pub mod prompt;
pub mod settings;
pub mod tempfiles;

pub use config::*;
pub use fd_limit::{FDS_PER_WORKER, cap_workers_by_fd_limit, max_open_fds};
pub use logger::setup_logging;
pub use prompt::prompt_credential;
pub use tempfiles::HelperScratch;
