mod build;
mod clean;
mod locate;
mod status;

pub use build::{BuildOptions, cmd_build};
pub use clean::cmd_clean;
pub use locate::cmd_locate;
pub use status::cmd_status;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use contentpipe_lib::content::ContentProject;
use contentpipe_lib::record::{RecordCache, RecordStore};

use crate::output::print_warning;

/// A project together with its records and where they are cached.
pub(crate) struct LoadedProject {
  pub project: Arc<ContentProject>,
  pub records: Arc<RecordStore>,
  pub cache: RecordCache,
}

/// Load the project at `path` and seed its records from the cache.
///
/// An unreadable cache is reported and ignored: every record is then
/// snapshotted from disk.
pub(crate) fn load_project(path: &Path) -> Result<LoadedProject> {
  let project = ContentProject::load(path).with_context(|| format!("Failed to load project {}", path.display()))?;
  let cache = RecordCache::for_project(&project.dir);

  let cached = match cache.load() {
    Ok(cached) => cached,
    Err(e) => {
      warn!(path = ?cache.path(), error = %e, "ignoring record cache");
      print_warning(&format!("Ignoring record cache: {}", e));
      Default::default()
    }
  };

  let records = project.records(&cached);
  Ok(LoadedProject {
    project: Arc::new(project),
    records: Arc::new(records),
    cache,
  })
}
