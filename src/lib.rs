//! filecat: local file catalog. Walks a tree concurrently, stores every file and directory in
//! SQLite, and answers wildcard, regex and advanced queries with stable pagination.
//!
//! ```ignore
//! let indexer = filecat::Indexer::open(Path::new("/tmp/catalog.db"), filecat::Opts::default())?;
//! indexer.build_index(Path::new("/home/me/projects"))?;
//! for rec in indexer.search("*.rs", false, 0, 20)? {
//!     println!("{}", rec.path);
//! }
//! ```

pub mod disk_detect;
pub mod engine;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod privileged;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use error::IndexError;
pub use index::Indexer;

/// Result alias used by the public filecat API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
