//! Engine: catalog store, search, progress, maintenance worker, path tools and the CLI.

pub mod arg_parser;
pub mod cli;
pub mod db_ops;
pub mod handlers;
pub mod maintenance;
pub mod progress;
pub mod search;
pub mod tools;

// Re-export commonly used functions
pub use arg_parser::{Cli, Commands};
pub use cli::handle_run;
pub use db_ops::{Catalog, ConfigKey};
pub use search::{search, search_advanced};
pub use tools::{path_to_db_string, running_as_root};
