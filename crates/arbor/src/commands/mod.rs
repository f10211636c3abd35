//! CLI command implementations

pub mod cleanup;
pub mod create;
pub mod list;
pub mod merge;
pub mod record;
pub mod remove;

pub use cleanup::run_cleanup;
pub use create::run_create;
pub use list::run_list;
pub use merge::run_merge;
pub use record::run_record;
pub use remove::run_remove;

use arbor_core::{find_project_root, ArborError, Config};
use std::path::PathBuf;
use tracing::debug;

/// Locate the project root and load its configuration
pub(crate) fn load_project() -> Result<(PathBuf, Config), ArborError> {
    let root = find_project_root()?;
    debug!(root = %root.display(), "project root located");
    let config = Config::load_from_project(&root)?;
    Ok((root, config))
}
