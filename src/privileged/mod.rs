//! Privileged scan fallback: credential cache, elevated runner, per-directory listing,
//! bulk helper and its import.

pub mod credential;
pub mod helper;
pub mod import;
pub mod listing;

pub use credential::{CredentialCache, Elevation, is_auth_failure};
pub use helper::{HelperJob, HelperProgress, HelperRun, locate_helper, read_progress_file, run_helper};
pub use import::{ImportTotals, import_ndjson};
pub use listing::{DirLister, ElevatedLister, ListedEntry, parse_ls_output};
