//! Crate-wide names and defaults.

/// Directory (relative to the project) holding pipeline state such as the record cache.
pub const STATE_DIR: &str = ".contentpipe";

/// Default project description file name.
pub const PROJECT_FILENAME: &str = "content.json";

/// Default converter executable name.
pub const DEFAULT_TOOL_NAME: &str = "ffmpeg";

/// Default environment variable consulted for an explicit converter path (Windows only).
pub const DEFAULT_TOOL_ENV_VAR: &str = "FFMPEG";

/// Default argument template handed to the converter for each file.
pub const DEFAULT_ARGUMENTS: &str = "-y -i {input} {output}";
