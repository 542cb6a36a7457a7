use anyhow::Result;

use contentpipe_lib::consts::DEFAULT_TOOL_NAME;
use contentpipe_lib::platform::current_os;
use contentpipe_lib::tool::{ToolLocator, ToolSource, ToolSpec};

use crate::output::{OutputFormat, print_json, print_stat, print_success, print_warning};

/// Show where the converter would be launched from and why.
pub fn cmd_locate(tool_name: &str, format: OutputFormat) -> Result<bool> {
  let spec = if tool_name == DEFAULT_TOOL_NAME {
    ToolSpec::default()
  } else {
    ToolSpec::new(tool_name)
  };
  let locator = ToolLocator::new(spec);
  let resolution = locator.resolve();

  if format.is_json() {
    print_json(&resolution)?;
    return Ok(true);
  }

  print_success(&format!("{}", resolution.path.display()));
  print_stat("Source", &resolution.source.to_string());
  print_stat("Platform", current_os().as_str());
  print_stat("Override file", &locator.override_file().path().display().to_string());
  if resolution.source == ToolSource::SearchPath {
    print_warning(&format!(
      "{} was not found in any known location; relying on the search path",
      locator.exe_name()
    ));
  }
  Ok(true)
}
